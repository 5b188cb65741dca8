// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sink trait for handing dated events to the proactive subsystem.

use async_trait::async_trait;

use crate::error::MnemosError;
use crate::types::ScheduledEvent;

/// Scheduler-like collaborator that receives events found by extraction.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Registers a dated event (reminder, anticipated event).
    async fn add_event(&self, event: ScheduledEvent) -> Result<(), MnemosError>;
}

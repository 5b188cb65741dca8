// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sink that records everything it receives.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mnemos_core::types::ScheduledEvent;
use mnemos_core::{EventSink, MnemosError};

/// Collects scheduled events for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<ScheduledEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, oldest first.
    pub async fn events(&self) -> Vec<ScheduledEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn add_event(&self, event: ScheduledEvent) -> Result<(), MnemosError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

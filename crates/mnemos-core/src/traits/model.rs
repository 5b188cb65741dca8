// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-model adapter trait for extraction, reconciliation, and
//! capsule summarization calls.

use async_trait::async_trait;

use crate::error::MnemosError;
use crate::types::{ModelRequest, ModelResponse};

/// Adapter for the external language model.
///
/// The caller owns timeouts; implementations should not block
/// indefinitely but need not enforce a deadline themselves.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, MnemosError>;
}

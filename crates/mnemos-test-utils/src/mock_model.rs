// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock language-model adapter for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mnemos_core::types::{ModelRequest, ModelResponse, TokenUsage};
use mnemos_core::{MnemosError, ModelAdapter};

/// A mock model that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty,
/// a default "mock response" text is returned. Every request is
/// recorded for prompt assertions.
pub struct MockModel {
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockModel {
    /// Create a new mock model with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock model pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: String) {
        self.responses.lock().await.push_back(text);
    }

    /// Requests seen so far, oldest first.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_response(&self) -> String {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string())
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelAdapter for MockModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, MnemosError> {
        self.requests.lock().await.push(request);
        let content = self.next_response().await;
        Ok(ModelResponse {
            content,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_pop_in_order_then_default() {
        let model = MockModel::with_responses(vec!["one".into(), "two".into()]);
        let request = ModelRequest {
            system_prompt: None,
            prompt: "hi".into(),
            max_tokens: 16,
        };

        assert_eq!(model.complete(request.clone()).await.unwrap().content, "one");
        assert_eq!(model.complete(request.clone()).await.unwrap().content, "two");
        assert_eq!(
            model.complete(request).await.unwrap().content,
            "mock response"
        );
    }

    #[tokio::test]
    async fn records_requests() {
        let model = MockModel::new();
        let request = ModelRequest {
            system_prompt: Some("sys".into()),
            prompt: "extract".into(),
            max_tokens: 16,
        };
        model.complete(request).await.unwrap();

        let seen = model.requests().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "extract");
    }
}

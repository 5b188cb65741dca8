// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the Mnemos adapter traits.
//!
//! `MockModel` returns pre-configured responses, `HashEmbedder`
//! produces deterministic embeddings; both enable fast, CI-runnable
//! tests without external APIs or local inference models.

pub mod hash_embedder;
pub mod mock_model;
pub mod recording_sink;

pub use hash_embedder::HashEmbedder;
pub use mock_model::MockModel;
pub use recording_sink::RecordingEventSink;

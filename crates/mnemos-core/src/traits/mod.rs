// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits consumed by the memory subsystem.
//!
//! Implementations live with the host application; the subsystem only
//! sees these narrow seams.

pub mod embedding;
pub mod events;
pub mod model;

pub use embedding::EmbeddingAdapter;
pub use events::EventSink;
pub use model::ModelAdapter;

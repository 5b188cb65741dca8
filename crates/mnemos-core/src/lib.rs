// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the Mnemos memory subsystem.
//!
//! Defines the shared error type, domain enums, the narrow adapter
//! traits through which the host application is consumed, the config
//! model, and token estimation helpers.

pub mod config;
pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;

pub use config::{ConsolidationConfig, ExtractionConfig, MemoryConfig, MnemosConfig};
pub use error::MnemosError;
pub use traits::{EmbeddingAdapter, EventSink, ModelAdapter};

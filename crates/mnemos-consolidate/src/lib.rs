// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background consolidation for the Mnemos memory subsystem.
//!
//! Runs off the turn's critical path on a fixed interval (plus an
//! explicit run-once entry point): retires duplicate facts, resolves
//! simple contradictions by recency, catches up episodes that were
//! never extracted, and regenerates capsules for lease-claimed dirty
//! persons and groups. Task failures log loudly and retry on the next
//! tick; nothing here can fail a conversational turn.

pub mod capsules;
pub mod runner;
pub mod tasks;

pub use runner::{ConsolidationReport, Consolidator};

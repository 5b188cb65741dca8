// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory context assembly for the Mnemos subsystem.
//!
//! Turns a store handle and a query into a single fenced
//! `MEMORY CONTEXT (DATA)` block under a hard token ceiling:
//! - **Skip gate**: low-signal turns retrieve nothing
//! - **Trust gating**: sensitive fact categories require familiarity
//! - **Staleness pruning**: concerns/goals absent from the recent
//!   episode window are held back
//! - **Proportional budgets**: facts/episodes/lessons split the
//!   remaining budget by top relevance
//! - **Insights cache**: per-store, TTL-bounded, single-flighted

pub mod assembler;
pub mod insights;
pub mod relevance;
pub mod render;

pub use assembler::{AssembleRequest, AssembledMemory, ContextAssembler};
pub use insights::InsightsCache;

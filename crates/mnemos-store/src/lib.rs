// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Mnemos memory subsystem.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, typed CRUD
//! for persons, facts, episodes, lessons, and capsules, and hybrid
//! retrieval (FTS5 BM25 + vector cosine, RRF-fused).

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod search;
pub mod store;

pub use database::Database;
pub use models::*;
pub use store::MemoryStore;

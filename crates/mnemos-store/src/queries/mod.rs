// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per entity family.

pub mod capsules;
pub mod episodes;
pub mod facts;
pub mod lessons;
pub mod persons;

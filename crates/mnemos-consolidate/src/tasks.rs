// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic consolidation tasks: duplicate retirement and
//! contradiction resolution.

use std::collections::HashMap;

use mnemos_core::MnemosError;
use mnemos_store::models::Fact;
use mnemos_store::queries::facts;
use mnemos_store::MemoryStore;
use tracing::debug;

/// Content prefixes that are mutually exclusive per person: two
/// current facts sharing one of these shapes contradict each other.
const EXCLUSIVE_SHAPES: &[&str] = &[
    "works at ",
    "lives in ",
    "is married to ",
    "is dating ",
    "is named ",
];

/// Retire byte-identical duplicate facts per person, keeping the most
/// recent. Returns the number retired.
pub async fn retire_exact_duplicates(store: &MemoryStore) -> Result<usize, MnemosError> {
    let current = facts::list_all_current(store.db()).await?;
    let mut groups: HashMap<(Option<String>, String), Vec<&Fact>> = HashMap::new();
    for fact in &current {
        groups
            .entry((fact.person_id.clone(), fact.content.clone()))
            .or_default()
            .push(fact);
    }

    let mut retired = 0;
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|f| std::cmp::Reverse(f.created_at_ms));
        for stale in &group[1..] {
            facts::retire(store.db(), &stale.id).await?;
            retired += 1;
        }
    }
    if retired > 0 {
        debug!(retired, "retired exact-duplicate facts");
    }
    Ok(retired)
}

/// Resolve simple contradictions: facts for one person matching the
/// same mutually-exclusive shape keep only the most recent. Returns
/// the number retired.
pub async fn resolve_contradictions(store: &MemoryStore) -> Result<usize, MnemosError> {
    let current = facts::list_all_current(store.db()).await?;
    let mut groups: HashMap<(Option<String>, &'static str), Vec<&Fact>> = HashMap::new();
    for fact in &current {
        let lower = fact.content.to_lowercase();
        for shape in EXCLUSIVE_SHAPES {
            if lower.starts_with(shape) {
                groups
                    .entry((fact.person_id.clone(), shape))
                    .or_default()
                    .push(fact);
                break;
            }
        }
    }

    let mut retired = 0;
    for ((_, shape), mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|f| std::cmp::Reverse(f.created_at_ms));
        for stale in &group[1..] {
            debug!(shape, content = stale.content.as_str(), "retiring contradicted fact");
            facts::retire(store.db(), &stale.id).await?;
            retired += 1;
        }
    }
    Ok(retired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_are_lowercase_prefixes() {
        for shape in EXCLUSIVE_SHAPES {
            assert_eq!(*shape, shape.to_lowercase());
            assert!(shape.ends_with(' '), "shape {shape:?} should end with a space");
        }
    }
}

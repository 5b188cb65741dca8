// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model for the memory subsystem.
//!
//! The host application loads and validates its config file; these
//! structs only define the `[memory]`, `[extraction]`, and
//! `[consolidation]` sections with serde defaults.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the memory subsystem, one field per
/// section the host application's config file carries.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemosConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

/// Retrieval and context assembly settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory system. When false, no memory operations occur.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Token sub-budget for the person capsule inside the context block.
    #[serde(default = "default_capsule_budget")]
    pub capsule_budget: u32,

    /// Maximum number of candidate results per search method (pre-fusion).
    #[serde(default = "default_max_retrieval_results")]
    pub max_retrieval_results: usize,

    /// Minimum cosine similarity for the vector half of hybrid
    /// search. Candidates below this never enter fusion.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Behavior-insights cache TTL in seconds.
    #[serde(default = "default_insights_ttl_secs")]
    pub insights_ttl_secs: u64,

    /// Maximum behavior insights rendered per turn.
    #[serde(default = "default_insights_cap")]
    pub insights_cap: usize,

    /// Window, in days, of episode history used to prune stale
    /// structured fields (concerns, goals).
    #[serde(default = "default_staleness_window_days")]
    pub staleness_window_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            capsule_budget: default_capsule_budget(),
            max_retrieval_results: default_max_retrieval_results(),
            similarity_threshold: default_similarity_threshold(),
            insights_ttl_secs: default_insights_ttl_secs(),
            insights_cap: default_insights_cap(),
            staleness_window_days: default_staleness_window_days(),
        }
    }
}

/// Extraction and reconciliation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Run the second-pass verification call when a turn yields more
    /// than one candidate fact.
    #[serde(default = "default_verify_facts")]
    pub verify_facts: bool,

    /// Evidence quotes longer than this are dropped outright.
    #[serde(default = "default_max_quote_chars")]
    pub max_quote_chars: usize,

    /// Max tokens for extraction model responses.
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            verify_facts: default_verify_facts(),
            max_quote_chars: default_max_quote_chars(),
            max_tokens: default_extraction_max_tokens(),
        }
    }
}

/// Background consolidation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolidationConfig {
    /// Seconds between consolidation passes.
    #[serde(default = "default_consolidation_interval_secs")]
    pub interval_secs: u64,

    /// Retire byte-identical duplicate facts.
    #[serde(default = "default_task_enabled")]
    pub dedupe_enabled: bool,

    /// Resolve simple mutually-exclusive contradictions by recency.
    #[serde(default = "default_task_enabled")]
    pub contradictions_enabled: bool,

    /// Run catch-up extraction over never-extracted episodes.
    #[serde(default = "default_task_enabled")]
    pub catchup_enabled: bool,

    /// Regenerate capsules for dirty persons and groups.
    #[serde(default = "default_task_enabled")]
    pub capsules_enabled: bool,

    /// Episodes fed through catch-up extraction per pass.
    #[serde(default = "default_catchup_batch")]
    pub catchup_batch: usize,

    /// A dirty-marker claim older than this is considered abandoned
    /// and may be re-claimed.
    #[serde(default = "default_claim_stale_secs")]
    pub claim_stale_secs: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_consolidation_interval_secs(),
            dedupe_enabled: default_task_enabled(),
            contradictions_enabled: default_task_enabled(),
            catchup_enabled: default_task_enabled(),
            capsules_enabled: default_task_enabled(),
            catchup_batch: default_catchup_batch(),
            claim_stale_secs: default_claim_stale_secs(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_capsule_budget() -> u32 {
    150
}

fn default_max_retrieval_results() -> usize {
    12
}

fn default_similarity_threshold() -> f64 {
    0.25
}

fn default_insights_ttl_secs() -> u64 {
    60
}

fn default_insights_cap() -> usize {
    6
}

fn default_staleness_window_days() -> i64 {
    14
}

fn default_verify_facts() -> bool {
    true
}

fn default_max_quote_chars() -> usize {
    200
}

fn default_extraction_max_tokens() -> u32 {
    2048
}

fn default_consolidation_interval_secs() -> u64 {
    900
}

fn default_task_enabled() -> bool {
    true
}

fn default_catchup_batch() -> usize {
    8
}

fn default_claim_stale_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_config_defaults() {
        let config = MemoryConfig::default();
        assert!(config.enabled);
        assert_eq!(config.insights_ttl_secs, 60);
        assert_eq!(config.insights_cap, 6);
        assert_eq!(config.staleness_window_days, 14);
    }

    #[test]
    fn extraction_config_defaults() {
        let config = ExtractionConfig::default();
        assert!(config.verify_facts);
        assert_eq!(config.max_quote_chars, 200);
    }

    #[test]
    fn consolidation_toggles_default_on() {
        let config = ConsolidationConfig::default();
        assert!(config.dedupe_enabled);
        assert!(config.contradictions_enabled);
        assert!(config.catchup_enabled);
        assert!(config.capsules_enabled);
    }

    #[test]
    fn deserializes_partial_section() {
        let config: ConsolidationConfig =
            serde_json::from_str(r#"{"interval_secs": 60, "capsules_enabled": false}"#)
                .unwrap();
        assert_eq!(config.interval_secs, 60);
        assert!(!config.capsules_enabled);
        assert!(config.dedupe_enabled);
    }
}

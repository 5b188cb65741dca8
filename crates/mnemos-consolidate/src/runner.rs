// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The consolidation loop: interval runner plus run-once entry point.

use std::sync::Arc;
use std::time::Duration;

use mnemos_core::{ConsolidationConfig, MnemosError, ModelAdapter};
use mnemos_extract::ExtractionPipeline;
use mnemos_store::queries::episodes;
use mnemos_store::MemoryStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capsules::{regenerate_group_capsules, regenerate_person_capsules};
use crate::tasks::{resolve_contradictions, retire_exact_duplicates};

/// Dirty markers claimed per table per pass.
const CLAIM_BATCH: usize = 8;

/// What one consolidation pass accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolidationReport {
    pub duplicates_retired: usize,
    pub contradictions_resolved: usize,
    pub episodes_caught_up: usize,
    pub person_capsules_regenerated: usize,
    pub group_capsules_regenerated: usize,
}

/// Periodic background consolidation over the shared store.
pub struct Consolidator {
    store: Arc<MemoryStore>,
    model: Arc<dyn ModelAdapter>,
    pipeline: Arc<ExtractionPipeline>,
    config: ConsolidationConfig,
    cancel: CancellationToken,
}

impl Consolidator {
    pub fn new(
        store: Arc<MemoryStore>,
        model: Arc<dyn ModelAdapter>,
        pipeline: Arc<ExtractionPipeline>,
        config: ConsolidationConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            model,
            pipeline,
            config,
            cancel,
        }
    }

    /// Run until the cancellation token fires, one pass per interval.
    pub async fn run_loop(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        // The first tick fires immediately; skip it so a freshly
        // started agent does not consolidate mid-boot.
        interval.tick().await;
        info!(interval_secs = self.config.interval_secs, "consolidation loop running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let report = self.run_once(now_ms).await;
                    info!(
                        duplicates = report.duplicates_retired,
                        contradictions = report.contradictions_resolved,
                        caught_up = report.episodes_caught_up,
                        capsules = report.person_capsules_regenerated
                            + report.group_capsules_regenerated,
                        "consolidation pass finished"
                    );
                }
                _ = self.cancel.cancelled() => {
                    info!("consolidation loop stopped");
                    break;
                }
            }
        }
    }

    /// One consolidation pass. Task failures are logged and retried
    /// on the next pass; a pass never aborts the process.
    pub async fn run_once(&self, now_ms: i64) -> ConsolidationReport {
        metrics::counter!("mnemos_consolidation_passes_total").increment(1);
        let mut report = ConsolidationReport::default();

        if self.config.dedupe_enabled {
            match retire_exact_duplicates(&self.store).await {
                Ok(n) => report.duplicates_retired = n,
                Err(e) => warn!(error = %e, "duplicate retirement failed"),
            }
        }

        if self.config.contradictions_enabled {
            match resolve_contradictions(&self.store).await {
                Ok(n) => report.contradictions_resolved = n,
                Err(e) => warn!(error = %e, "contradiction resolution failed"),
            }
        }

        if self.config.catchup_enabled && !self.cancel.is_cancelled() {
            report.episodes_caught_up = self.catch_up_extraction(now_ms).await;
        }

        if self.config.capsules_enabled && !self.cancel.is_cancelled() {
            let stale_before_ms = now_ms - self.config.claim_stale_secs as i64 * 1000;
            match regenerate_person_capsules(
                &self.store,
                &self.model,
                now_ms,
                stale_before_ms,
                CLAIM_BATCH,
            )
            .await
            {
                Ok(n) => report.person_capsules_regenerated = n,
                Err(e) => warn!(error = %e, "person capsule regeneration failed"),
            }
            match regenerate_group_capsules(
                &self.store,
                &self.model,
                now_ms,
                stale_before_ms,
                CLAIM_BATCH,
            )
            .await
            {
                Ok(n) => report.group_capsules_regenerated = n,
                Err(e) => warn!(error = %e, "group capsule regeneration failed"),
            }
        }

        report
    }

    /// Feed never-extracted episodes back through the pipeline.
    async fn catch_up_extraction(&self, now_ms: i64) -> usize {
        let pending =
            match episodes::list_needing_extraction(self.store.db(), self.config.catchup_batch)
                .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(error = %e, "catch-up listing failed");
                    return 0;
                }
            };

        let mut caught_up = 0;
        for episode in pending {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.pipeline.process_episode(&episode, now_ms).await {
                Ok(_) => caught_up += 1,
                Err(MnemosError::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, episode_id = episode.id.as_str(), "catch-up extraction failed");
                }
            }
        }
        caught_up
    }
}

// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging candidate facts into the store against a person's existing
//! facts.
//!
//! The model proposes per-candidate add/update/delete/none decisions
//! against indexed existing facts; an unusable response falls back to
//! a deterministic exact-content dedupe. One batch applies as one
//! store transaction.

use std::sync::Arc;

use mnemos_core::types::ModelRequest;
use mnemos_core::{ExtractionConfig, MnemosError, ModelAdapter};
use mnemos_store::models::{Fact, Person};
use mnemos_store::queries::facts;
use mnemos_store::MemoryStore;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::extractor::{verify_facts, CandidateFact};
use crate::parse::{parse_array, ModelParse};

const RECONCILE_PROMPT: &str = r#"You maintain a fact store about one person. Merge the new candidate facts into the existing facts.

Existing facts:
{existing}

New candidates:
{candidates}

For each candidate, in order, decide one of:
- {"action": "add"} -- genuinely new information
- {"action": "update", "index": N, "content": "..."} -- corrects or refines existing fact N
- {"action": "delete", "index": N} -- candidate proves existing fact N wrong and replaces nothing
- {"action": "none"} -- duplicate or not worth storing

Respond with a single JSON array, one entry per candidate, nothing else."#;

/// One per-candidate merge decision from the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ReconcileDecision {
    Add,
    Update {
        index: usize,
        #[serde(default)]
        content: Option<String>,
    },
    Delete {
        index: usize,
    },
    #[serde(rename = "none")]
    Skip,
}

/// A resolved batch ready to apply transactionally.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub inserts: Vec<CandidateFact>,
    /// (existing fact id, new content)
    pub updates: Vec<(String, String)>,
    /// existing fact ids
    pub deletes: Vec<String>,
}

impl ReconcilePlan {
    fn mutates_existing(&self) -> bool {
        !self.updates.is_empty() || !self.deletes.is_empty()
    }
}

/// Turn model decisions into a plan. Returns None when the decision
/// list does not line up with the candidates (fallback territory).
pub fn plan_from_decisions(
    existing: &[Fact],
    candidates: &[CandidateFact],
    decisions: &[ReconcileDecision],
) -> Option<ReconcilePlan> {
    if decisions.len() != candidates.len() {
        return None;
    }
    let mut plan = ReconcilePlan::default();
    for (candidate, decision) in candidates.iter().zip(decisions) {
        match decision {
            ReconcileDecision::Add => plan.inserts.push(candidate.clone()),
            ReconcileDecision::Update { index, content } => match existing.get(*index) {
                Some(target) => {
                    let content = content.clone().unwrap_or_else(|| candidate.content.clone());
                    plan.updates.push((target.id.clone(), content));
                }
                None => {
                    warn!(index, "update decision references missing fact, skipping");
                }
            },
            ReconcileDecision::Delete { index } => match existing.get(*index) {
                Some(target) => plan.deletes.push(target.id.clone()),
                None => {
                    warn!(index, "delete decision references missing fact, skipping");
                }
            },
            ReconcileDecision::Skip => {}
        }
    }
    Some(plan)
}

/// Deterministic fallback: case-insensitive exact-content dedupe,
/// adding only genuinely new content.
pub fn heuristic_plan(existing: &[Fact], candidates: &[CandidateFact]) -> ReconcilePlan {
    let mut seen: std::collections::HashSet<String> = existing
        .iter()
        .map(|f| f.content.trim().to_lowercase())
        .collect();
    let mut plan = ReconcilePlan::default();
    for candidate in candidates {
        if seen.insert(candidate.content.trim().to_lowercase()) {
            plan.inserts.push(candidate.clone());
        }
    }
    plan
}

/// Result of one reconciliation batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Merges candidate facts into the store for one person (or the
/// person-independent pool).
pub struct Reconciler {
    store: Arc<MemoryStore>,
    model: Arc<dyn ModelAdapter>,
    config: ExtractionConfig,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(
        store: Arc<MemoryStore>,
        model: Arc<dyn ModelAdapter>,
        config: ExtractionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            model,
            config,
            cancel,
        }
    }

    /// Reconcile one batch of candidates and apply the result in a
    /// single transaction. Returns what changed.
    #[allow(clippy::too_many_arguments)]
    pub async fn reconcile(
        &self,
        person: Option<&Person>,
        subject: &str,
        candidates: Vec<CandidateFact>,
        user_text: &str,
        assistant_text: &str,
        already_verified: bool,
        now_ms: i64,
    ) -> Result<ReconcileOutcome, MnemosError> {
        if candidates.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let existing = match person {
            Some(person) => {
                facts::list_current_for_person(self.store.db(), &person.id).await?
            }
            None => facts::list_current_unowned(self.store.db()).await?,
        };

        let mut plan = if existing.is_empty() {
            ReconcilePlan {
                inserts: candidates.clone(),
                ..ReconcilePlan::default()
            }
        } else {
            if self.cancel.is_cancelled() {
                return Err(MnemosError::Cancelled);
            }
            let request = ModelRequest {
                system_prompt: None,
                prompt: RECONCILE_PROMPT
                    .replace("{existing}", &render_indexed(&existing))
                    .replace("{candidates}", &render_candidates(&candidates)),
                max_tokens: self.config.max_tokens,
            };
            match self.model.complete(request).await {
                Ok(response) => match parse_array::<Vec<ReconcileDecision>>(&response.content) {
                    ModelParse::Parsed(decisions) => {
                        plan_from_decisions(&existing, &candidates, &decisions)
                            .unwrap_or_else(|| {
                                debug!("decision count mismatch, using heuristic dedupe");
                                heuristic_plan(&existing, &candidates)
                            })
                    }
                    ModelParse::Unparsable => heuristic_plan(&existing, &candidates),
                },
                Err(e) => {
                    warn!(error = %e, "reconcile call failed, using heuristic dedupe");
                    heuristic_plan(&existing, &candidates)
                }
            }
        };

        // A batch that mutates existing facts, or carries several
        // candidates, gets a verification pass before its adds land.
        let needs_verify = self.config.verify_facts
            && !already_verified
            && (plan.mutates_existing() || candidates.len() > 1);
        if needs_verify && !plan.inserts.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(MnemosError::Cancelled);
            }
            match verify_facts(
                self.model.as_ref(),
                user_text,
                assistant_text,
                plan.inserts.clone(),
            )
            .await
            {
                Ok(kept) => plan.inserts = kept,
                Err(e) => {
                    // Grounding already held for every insert; a dead
                    // verifier keeps the batch rather than losing it.
                    warn!(error = %e, "verification call failed, keeping batch");
                }
            }
        }

        let outcome = ReconcileOutcome {
            added: plan.inserts.len(),
            updated: plan.updates.len(),
            deleted: plan.deletes.len(),
        };

        let mut inserts = Vec::with_capacity(plan.inserts.len());
        for candidate in &plan.inserts {
            let embedding = self.store.embed_text(&candidate.content).await;
            inserts.push((
                Fact {
                    id: Uuid::new_v4().to_string(),
                    person_id: person.map(|p| p.id.clone()),
                    subject: subject.to_string(),
                    content: candidate.content.clone(),
                    category: candidate.category(),
                    evidence_quote: candidate.evidence_quote.clone(),
                    is_current: true,
                    last_accessed_at_ms: now_ms,
                    created_at_ms: now_ms,
                },
                embedding,
            ));
        }

        facts::apply_reconciliation(self.store.db(), inserts, plan.updates, plan.deletes)
            .await?;
        Ok(outcome)
    }
}

fn render_indexed(existing: &[Fact]) -> String {
    existing
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{i}. [{}] {}", f.category.as_str(), f.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_candidates(candidates: &[CandidateFact]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{i}. [{}] {}", c.category, c.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-turn extraction pipeline.
//!
//! Runs after a turn completes: one model call proposes facts, events,
//! and structured-field changes; deterministic filters enforce the
//! grounding invariant; reconciliation merges surviving facts into the
//! store. The event and field paths proceed independently of the fact
//! path. Fact-insert failures propagate; everything else degrades.

use std::sync::Arc;

use mnemos_core::types::ScheduledEvent;
use mnemos_core::{EventSink, ExtractionConfig, MnemosError, ModelAdapter};
use mnemos_store::models::{Person, PersonFields, MAX_CONCERNS};
use mnemos_store::queries::{capsules, episodes, persons};
use mnemos_store::queries::capsules::DirtyKind;
use mnemos_store::MemoryStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::extractor::{
    extraction_request, filter_grounded, parse_extraction, verify_facts, CandidateEvent,
    FieldsDelta,
};
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Relationship bump applied per recorded turn.
const RELATIONSHIP_BUMP_PER_TURN: f64 = 0.1;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// What one pipeline run changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnOutcome {
    pub facts_added: usize,
    pub facts_updated: usize,
    pub facts_deleted: usize,
    pub events_scheduled: usize,
    pub fields_updated: bool,
}

impl TurnOutcome {
    fn with_reconcile(mut self, outcome: ReconcileOutcome) -> Self {
        self.facts_added = outcome.added;
        self.facts_updated = outcome.updated;
        self.facts_deleted = outcome.deleted;
        self
    }

    /// Whether any fact row changed (drives dirty marking).
    pub fn changed_facts(&self) -> bool {
        self.facts_added + self.facts_updated + self.facts_deleted > 0
    }
}

/// Extracts and reconciles memory from finished turns.
pub struct ExtractionPipeline {
    store: Arc<MemoryStore>,
    model: Arc<dyn ModelAdapter>,
    events: Option<Arc<dyn EventSink>>,
    reconciler: Reconciler,
    config: ExtractionConfig,
    cancel: CancellationToken,
}

impl ExtractionPipeline {
    pub fn new(
        store: Arc<MemoryStore>,
        model: Arc<dyn ModelAdapter>,
        events: Option<Arc<dyn EventSink>>,
        config: ExtractionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let reconciler = Reconciler::new(
            store.clone(),
            model.clone(),
            config.clone(),
            cancel.clone(),
        );
        Self {
            store,
            model,
            events,
            reconciler,
            config,
            cancel,
        }
    }

    /// Process one completed turn for a channel identity. Registers
    /// the person on first contact and bumps the relationship score.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_turn(
        &self,
        channel: &str,
        channel_user_id: &str,
        display_name: &str,
        user_text: &str,
        assistant_text: &str,
        episode_id: Option<&str>,
        now_ms: i64,
    ) -> Result<TurnOutcome, MnemosError> {
        let person =
            persons::get_or_create(self.store.db(), channel, channel_user_id, display_name, now_ms)
                .await?;
        if let Err(e) =
            persons::bump_relationship(self.store.db(), &person.id, RELATIONSHIP_BUMP_PER_TURN)
                .await
        {
            warn!(error = %e, "relationship bump failed");
        }

        self.extract_and_reconcile(Some(&person), user_text, assistant_text, episode_id, now_ms)
            .await
    }

    /// Process a stored episode during catch-up extraction. The
    /// episode content plays the role of the user text.
    pub async fn process_episode(
        &self,
        episode: &mnemos_store::models::Episode,
        now_ms: i64,
    ) -> Result<TurnOutcome, MnemosError> {
        let person = match &episode.person_id {
            Some(person_id) => persons::get(self.store.db(), person_id).await?,
            None => None,
        };
        self.extract_and_reconcile(
            person.as_ref(),
            &episode.content,
            "",
            Some(&episode.id),
            now_ms,
        )
        .await
    }

    async fn extract_and_reconcile(
        &self,
        person: Option<&Person>,
        user_text: &str,
        assistant_text: &str,
        episode_id: Option<&str>,
        now_ms: i64,
    ) -> Result<TurnOutcome, MnemosError> {
        if self.cancel.is_cancelled() {
            return Err(MnemosError::Cancelled);
        }

        let request = extraction_request(user_text, assistant_text, &self.config);
        let response = match self.model.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                // Leave the episode unstamped so catch-up retries it.
                warn!(error = %e, "extraction call failed, turn proceeds without memory");
                return Ok(TurnOutcome::default());
            }
        };

        let payload = parse_extraction(&response.content);
        let grounded = filter_grounded(payload.facts, user_text, &self.config);

        let mut verified = false;
        let survivors = if grounded.len() > 1 && self.config.verify_facts {
            if self.cancel.is_cancelled() {
                return Err(MnemosError::Cancelled);
            }
            match verify_facts(self.model.as_ref(), user_text, assistant_text, grounded.clone())
                .await
            {
                Ok(kept) => {
                    verified = true;
                    kept
                }
                Err(e) => {
                    warn!(error = %e, "verification call failed, keeping grounded batch");
                    grounded
                }
            }
        } else {
            grounded
        };

        let subject = person.map(|p| p.display_name.as_str()).unwrap_or("unknown");
        let outcome = self
            .reconciler
            .reconcile(
                person,
                subject,
                survivors,
                user_text,
                assistant_text,
                verified,
                now_ms,
            )
            .await?;
        let mut turn = TurnOutcome::default().with_reconcile(outcome);

        if turn.changed_facts() {
            if let Some(person) = person {
                if let Err(e) =
                    capsules::mark_dirty(self.store.db(), DirtyKind::PublicStyle, &person.id, now_ms)
                        .await
                {
                    warn!(error = %e, "public-style dirty marking failed");
                }
            }
        }

        turn.events_scheduled = self
            .schedule_events(&payload.events, person, now_ms)
            .await;

        if let (Some(delta), Some(person)) = (&payload.fields, person) {
            if !delta.is_empty() {
                let merged = merge_fields(&person.fields, delta);
                match persons::replace_fields(self.store.db(), &person.id, &merged).await {
                    Ok(()) => turn.fields_updated = true,
                    Err(e) => warn!(error = %e, "person-field update failed"),
                }
            }
        }

        if let Some(id) = episode_id {
            if let Err(e) = episodes::mark_extracted(self.store.db(), id, now_ms).await {
                warn!(error = %e, episode_id = id, "episode stamp failed");
            }
        }

        debug!(
            facts_added = turn.facts_added,
            events = turn.events_scheduled,
            "extraction pipeline finished"
        );
        Ok(turn)
    }

    /// Hand dated events to the proactive subsystem, best-effort.
    async fn schedule_events(
        &self,
        events: &[CandidateEvent],
        person: Option<&Person>,
        now_ms: i64,
    ) -> usize {
        let Some(sink) = &self.events else {
            return 0;
        };
        let mut scheduled = 0;
        for event in events {
            if event.title.trim().is_empty() || event.days_from_now < 0.0 {
                continue;
            }
            let at_ms = now_ms + (event.days_from_now * DAY_MS as f64) as i64;
            let scheduled_event = ScheduledEvent {
                title: event.title.clone(),
                at_ms,
                category: event.category.clone(),
                person_id: person.map(|p| p.id.clone()),
                follow_up_at_ms: follow_up_days(&event.category).map(|d| at_ms + d * DAY_MS),
            };
            match sink.add_event(scheduled_event).await {
                Ok(()) => scheduled += 1,
                Err(e) => warn!(error = %e, "event scheduling failed"),
            }
        }
        scheduled
    }
}

/// Automatic follow-up offset by event category, in days.
fn follow_up_days(category: &str) -> Option<i64> {
    match category {
        "appointment" | "interview" | "deadline" => Some(1),
        "trip" | "travel" | "event" => Some(2),
        _ => None,
    }
}

/// Merge a delta into the stored fields; the result replaces the
/// whole record. Concerns keep the newest items up to the cap.
pub fn merge_fields(current: &PersonFields, delta: &FieldsDelta) -> PersonFields {
    let mut concerns = delta.concerns.clone();
    for concern in &current.concerns {
        if !concerns.iter().any(|c| c.eq_ignore_ascii_case(concern)) {
            concerns.push(concern.clone());
        }
    }
    concerns.truncate(MAX_CONCERNS);

    PersonFields {
        concerns,
        goals: merge_list(&current.goals, &delta.goals),
        preferences: merge_list(&current.preferences, &delta.preferences),
        last_mood: delta.mood.clone().or_else(|| current.last_mood.clone()),
        curiosity: merge_list(&current.curiosity, &delta.curiosity),
    }
}

fn merge_list(current: &[String], additions: &[String]) -> Vec<String> {
    let mut merged = current.to_vec();
    for item in additions {
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(item)) {
            merged.push(item.clone());
        }
    }
    merged
}

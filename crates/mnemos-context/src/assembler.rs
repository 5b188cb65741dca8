// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn memory context assembly.
//!
//! Consumes the store and a query, produces a bounded fenced block:
//! skip gate, trust-tier gating, staleness pruning, relevance
//! scoring, and proportional budget allocation, in that order. Every
//! store read here is best-effort; a failure degrades the block, it
//! never fails the turn.

use std::collections::HashSet;
use std::sync::Arc;

use mnemos_core::tokens::{estimate_tokens, truncate_chars, truncate_to_tokens};
use mnemos_core::types::MemoryScope;
use mnemos_core::MemoryConfig;
use mnemos_store::models::Person;
use mnemos_store::queries::{capsules, episodes, lessons, persons};
use mnemos_store::MemoryStore;
use tracing::{debug, warn};

use crate::insights::InsightsCache;
use crate::relevance::{
    overlaps_recent, relevance_score, should_skip_retrieval, tokenize, DEFAULT_RELEVANCE_FLOOR,
};
use crate::render::{
    allocate_budget, format_age, render_section, BLOCK_CLOSE, BLOCK_OPEN, PREAMBLE,
};

/// Per-bullet character caps.
const FACT_BULLET_CHARS: usize = 80;
const EPISODE_BULLET_CHARS: usize = 90;
const LESSON_BULLET_CHARS: usize = 80;
const INSIGHT_BULLET_CHARS: usize = 80;

/// Recent episodes consulted for staleness pruning.
const STALENESS_EPISODE_LIMIT: usize = 200;

/// One context-assembly request from the turn orchestrator.
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    /// The user's message text for this turn.
    pub query: String,
    /// Opaque chat identifier.
    pub chat_id: String,
    /// Channel the sender arrived on.
    pub channel: String,
    /// Channel-scoped sender id.
    pub channel_user_id: String,
    /// Hard token ceiling for the rendered block.
    pub budget_tokens: u32,
    /// DM or group turn.
    pub scope: MemoryScope,
    /// Render the person capsule (DM).
    pub include_capsule: bool,
    /// Render the group capsule (group).
    pub include_group_capsule: bool,
}

/// The assembled block, its estimated cost, and the skip flag.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMemory {
    pub text: String,
    pub tokens_used: u32,
    pub skipped: bool,
}

impl AssembledMemory {
    fn empty(skipped: bool) -> Self {
        Self {
            text: String::new(),
            tokens_used: 0,
            skipped,
        }
    }
}

/// Assembles the memory context block once per turn.
pub struct ContextAssembler {
    store: Arc<MemoryStore>,
    insights: InsightsCache,
    config: MemoryConfig,
}

impl ContextAssembler {
    pub fn new(store: Arc<MemoryStore>, config: MemoryConfig) -> Self {
        let insights = InsightsCache::new(
            config.insights_ttl_secs as i64 * 1000,
            config.insights_cap,
        );
        Self {
            store,
            insights,
            config,
        }
    }

    /// Assemble the context block for one turn.
    pub async fn assemble(&self, req: &AssembleRequest, now_ms: i64) -> AssembledMemory {
        if !self.config.enabled {
            return AssembledMemory::empty(true);
        }
        if should_skip_retrieval(&req.query) {
            metrics::counter!("mnemos_context_skips_total").increment(1);
            debug!(chat_id = req.chat_id.as_str(), "retrieval skipped for low-signal turn");
            return AssembledMemory::empty(true);
        }
        metrics::counter!("mnemos_context_assemblies_total").increment(1);

        let budget_bytes = req.budget_tokens as usize * 4;
        let overhead = BLOCK_OPEN.len() + PREAMBLE.len() + BLOCK_CLOSE.len();
        if overhead >= budget_bytes {
            return AssembledMemory::empty(false);
        }
        let mut remaining = budget_bytes - overhead;
        let mut body = String::new();

        let person = match persons::find_by_channel_user(
            self.store.db(),
            &req.channel,
            &req.channel_user_id,
        )
        .await
        {
            Ok(person) => person,
            Err(e) => {
                warn!(error = %e, "person lookup failed, assembling without frame");
                None
            }
        };

        match req.scope {
            MemoryScope::Dm => {
                if let Some(person) = &person {
                    self.push_dm_frame(&mut body, &mut remaining, person, req, now_ms)
                        .await;
                }
            }
            MemoryScope::Group => {
                self.push_group_frame(&mut body, &mut remaining, person.as_ref(), req)
                    .await;
            }
        }

        self.push_insights(&mut body, &mut remaining, now_ms).await;

        let surfaced_fact_ids = self
            .push_relevance_sections(&mut body, &mut remaining, person.as_ref(), req, now_ms)
            .await;

        if body.is_empty() {
            return AssembledMemory::empty(false);
        }

        if !surfaced_fact_ids.is_empty() {
            if let Err(e) = self.store.touch_facts(&surfaced_fact_ids, now_ms).await {
                warn!(error = %e, "touch_facts failed, continuing turn");
            }
        }

        let text = format!("{BLOCK_OPEN}{PREAMBLE}{body}{BLOCK_CLOSE}");
        let tokens_used = estimate_tokens(&text);
        AssembledMemory {
            text,
            tokens_used,
            skipped: false,
        }
    }

    /// DM relationship frame: person line, capsule, structured fields.
    async fn push_dm_frame(
        &self,
        body: &mut String,
        remaining: &mut usize,
        person: &Person,
        req: &AssembleRequest,
        now_ms: i64,
    ) {
        push_line(
            body,
            remaining,
            format!(
                "Person: {} ({})",
                person.display_name,
                person.trust_tier().as_str()
            ),
        );

        if req.include_capsule {
            if let Some(capsule) = &person.capsule {
                let capsule_tokens =
                    (self.config.capsule_budget as usize).min(*remaining / 4) as u32;
                let capsule = truncate_to_tokens(capsule, capsule_tokens);
                if !capsule.is_empty() {
                    push_line(body, remaining, format!("About them: {capsule}"));
                }
            }
        }

        let recent_tokens = self.recent_chat_tokens(&req.chat_id, now_ms).await;
        let fields = &person.fields;

        let concerns: Vec<&String> = fields
            .concerns
            .iter()
            .filter(|c| overlaps_recent(c, &recent_tokens))
            .collect();
        if !concerns.is_empty() {
            push_line(
                body,
                remaining,
                format!("On their mind lately: {}", join_refs(&concerns)),
            );
        }

        let goals: Vec<&String> = fields
            .goals
            .iter()
            .filter(|g| overlaps_recent(g, &recent_tokens))
            .collect();
        if !goals.is_empty() {
            push_line(body, remaining, format!("Working toward: {}", join_refs(&goals)));
        }

        if !fields.preferences.is_empty() {
            let prefs: Vec<&String> = fields.preferences.iter().collect();
            push_line(body, remaining, format!("Prefers: {}", join_refs(&prefs)));
        }
        if let Some(mood) = &fields.last_mood {
            push_line(body, remaining, format!("Mood signal: {mood}"));
        }
        if !fields.curiosity.is_empty() {
            let qs: Vec<&String> = fields.curiosity.iter().collect();
            push_line(body, remaining, format!("Curious about: {}", join_refs(&qs)));
        }
    }

    /// Group-safe frame: group capsule and the person's public style.
    /// The private capsule and structured fields never render here;
    /// DM-only sections are excluded by scope, not content filtering.
    async fn push_group_frame(
        &self,
        body: &mut String,
        remaining: &mut usize,
        person: Option<&Person>,
        req: &AssembleRequest,
    ) {
        if req.include_group_capsule {
            match capsules::get_group(self.store.db(), &req.chat_id).await {
                Ok(Some(group)) => {
                    let capsule_tokens =
                        (self.config.capsule_budget as usize).min(*remaining / 4) as u32;
                    let capsule = truncate_to_tokens(&group.capsule, capsule_tokens);
                    if !capsule.is_empty() {
                        push_line(body, remaining, format!("Group vibe: {capsule}"));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "group capsule read failed"),
            }
        }

        if let Some(style) = person.and_then(|p| p.public_style.as_deref()) {
            let style = truncate_chars(style, 160);
            push_line(body, remaining, format!("Their style here: {style}"));
        }
    }

    /// Behavior insights, from the single-flight TTL cache.
    async fn push_insights(&self, body: &mut String, remaining: &mut usize, now_ms: i64) {
        let rules = self.insights.get(self.store.clone(), now_ms).await;
        if rules.is_empty() {
            return;
        }
        let bullets: Vec<String> = rules
            .iter()
            .map(|r| truncate_chars(r, INSIGHT_BULLET_CHARS))
            .collect();
        if let Some((text, _)) = render_section("Behavior insights:", &bullets, *remaining) {
            *remaining -= text.len();
            body.push_str(&text);
        }
    }

    /// Facts, recent context, and lessons under proportional budgets.
    /// Returns the ids of facts actually rendered, for touch.
    async fn push_relevance_sections(
        &self,
        body: &mut String,
        remaining: &mut usize,
        person: Option<&Person>,
        req: &AssembleRequest,
        now_ms: i64,
    ) -> Vec<String> {
        let query_tokens = tokenize(&req.query);
        let limit = self.config.max_retrieval_results;

        // Facts are DM-only: they originate in private conversation
        // and must not leak into group turns.
        let mut fact_bullets: Vec<(String, String, f32)> = Vec::new();
        if req.scope == MemoryScope::Dm {
            if let Some(person) = person {
                let tier = person.trust_tier();
                match self.store.hybrid_search_facts(&req.query, limit).await {
                    Ok(found) => {
                        for (rank, fact) in found.iter().enumerate() {
                            let owned = fact
                                .person_id
                                .as_deref()
                                .map(|pid| pid == person.id)
                                .unwrap_or(true);
                            if !owned || !tier.allows(fact.category) {
                                continue;
                            }
                            let score = relevance_score(&query_tokens, &fact.content, rank);
                            if score < fact.category.relevance_floor() {
                                continue;
                            }
                            let bullet = format!(
                                "[{}] {}",
                                format_age(now_ms, fact.created_at_ms),
                                truncate_chars(&fact.content, FACT_BULLET_CHARS)
                            );
                            fact_bullets.push((fact.id.clone(), bullet, score));
                        }
                    }
                    Err(e) => warn!(error = %e, "fact search failed, section dropped"),
                }
            }
        }

        let mut episode_bullets: Vec<(String, f32)> = Vec::new();
        match self.store.hybrid_search_episodes(&req.query, limit).await {
            Ok(found) => {
                for (rank, episode) in found.iter().enumerate() {
                    if episode.chat_id != req.chat_id {
                        continue;
                    }
                    let score = relevance_score(&query_tokens, &episode.content, rank);
                    if score < DEFAULT_RELEVANCE_FLOOR {
                        continue;
                    }
                    let bullet = format!(
                        "[{}] {}",
                        format_age(now_ms, episode.created_at_ms),
                        truncate_chars(&episode.content, EPISODE_BULLET_CHARS)
                    );
                    episode_bullets.push((bullet, score));
                }
            }
            Err(e) => warn!(error = %e, "episode search failed, section dropped"),
        }

        // Person lessons are DM-only like facts.
        let mut lesson_bullets: Vec<(String, f32)> = Vec::new();
        if req.scope == MemoryScope::Dm {
            if let Some(person) = person {
                match lessons::list_for_person(self.store.db(), &person.id).await {
                    Ok(found) => {
                        for (rank, lesson) in found.iter().enumerate() {
                            let score = relevance_score(&query_tokens, &lesson.rule, rank);
                            if score < DEFAULT_RELEVANCE_FLOOR {
                                continue;
                            }
                            lesson_bullets.push((
                                truncate_chars(&lesson.rule, LESSON_BULLET_CHARS),
                                score,
                            ));
                        }
                    }
                    Err(e) => warn!(error = %e, "lesson read failed, section dropped"),
                }
            }
        }

        fact_bullets.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        episode_bullets
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        lesson_bullets
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let weight = |top: Option<f32>| -> f32 {
            (top.unwrap_or(0.0) - DEFAULT_RELEVANCE_FLOOR).max(0.0)
        };
        let weights = [
            weight(fact_bullets.first().map(|(_, _, s)| *s)),
            weight(episode_bullets.first().map(|(_, s)| *s)),
            weight(lesson_bullets.first().map(|(_, s)| *s)),
        ];
        let shares = allocate_budget((*remaining / 4) as u32, &weights);

        let mut surfaced_ids = Vec::new();

        let fact_lines: Vec<String> =
            fact_bullets.iter().map(|(_, line, _)| line.clone()).collect();
        if let Some((text, included)) =
            render_section("Facts:", &fact_lines, (shares[0] as usize * 4).min(*remaining))
        {
            *remaining -= text.len();
            body.push_str(&text);
            surfaced_ids.extend(fact_bullets.iter().take(included).map(|(id, _, _)| id.clone()));
        }

        let episode_lines: Vec<String> =
            episode_bullets.iter().map(|(line, _)| line.clone()).collect();
        if let Some((text, _)) = render_section(
            "Recent context:",
            &episode_lines,
            (shares[1] as usize * 4).min(*remaining),
        ) {
            *remaining -= text.len();
            body.push_str(&text);
        }

        let lesson_lines: Vec<String> =
            lesson_bullets.iter().map(|(line, _)| line.clone()).collect();
        if let Some((text, _)) = render_section(
            "Lessons:",
            &lesson_lines,
            (shares[2] as usize * 4).min(*remaining),
        ) {
            *remaining -= text.len();
            body.push_str(&text);
        }

        surfaced_ids
    }

    /// Token set drawn from this chat's recent episode window. A
    /// failed read returns the empty set, which prunes everything:
    /// better to hold a concern back than to resurface one unvetted.
    async fn recent_chat_tokens(&self, chat_id: &str, now_ms: i64) -> HashSet<String> {
        let window_ms = self.config.staleness_window_days * 24 * 60 * 60 * 1000;
        let since_ms = now_ms - window_ms;
        match episodes::recent_for_chat(
            self.store.db(),
            chat_id,
            since_ms,
            STALENESS_EPISODE_LIMIT,
        )
        .await
        {
            Ok(found) => {
                let mut tokens = HashSet::new();
                for episode in &found {
                    tokens.extend(tokenize(&episode.content));
                }
                tokens
            }
            Err(e) => {
                warn!(error = %e, "recent-episode read failed, pruning all structured fields");
                HashSet::new()
            }
        }
    }
}

/// Append one line if it fits in the remaining byte budget.
fn push_line(body: &mut String, remaining: &mut usize, line: String) {
    let line = format!("{line}\n");
    if line.len() <= *remaining {
        *remaining -= line.len();
        body.push_str(&line);
    }
}

fn join_refs(items: &[&String]) -> String {
    items
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

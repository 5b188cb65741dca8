// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory store: entity persistence plus hybrid retrieval.
//!
//! Lexical (FTS5 BM25) and vector (cosine over BLOB embeddings)
//! results are fused with reciprocal rank fusion, ties broken by
//! recency. Embedding failures degrade retrieval to lexical-only;
//! storage failures on write paths propagate.

use std::collections::HashMap;
use std::sync::Arc;

use mnemos_core::types::EmbeddingInput;
use mnemos_core::{EmbeddingAdapter, MemoryConfig, MnemosError};
use tracing::{debug, warn};

use crate::database::Database;
use crate::models::{Episode, ExportBundle, Fact, EXPORT_VERSION};
use crate::queries::{capsules, episodes, facts, lessons, persons};
use crate::search::{cosine_similarity, reciprocal_rank_fusion};

/// Durable entity storage with hybrid ranked retrieval.
pub struct MemoryStore {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
    config: MemoryConfig,
}

impl MemoryStore {
    /// Wrap an opened database and an injected embedding function.
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingAdapter>, config: MemoryConfig) -> Self {
        Self {
            db,
            embedder,
            config,
        }
    }

    /// The underlying database handle, for the query modules.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Embed one text, degrading to None on failure. Used by callers
    /// that batch rows into one transaction and need vectors up front.
    pub async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_one(text).await
    }

    /// Embed one text, degrading to None on failure.
    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        match self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await
        {
            Ok(output) => output.embeddings.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "embedding failed, falling back to lexical-only");
                None
            }
        }
    }

    /// Insert a fact with its embedding. Insert failures propagate:
    /// silently losing a fact write is worse than failing the turn.
    pub async fn record_fact(&self, fact: &Fact) -> Result<(), MnemosError> {
        let embedding = self.embed_one(&fact.content).await;
        facts::insert(&self.db, fact, embedding).await?;
        metrics::counter!("mnemos_facts_stored_total").increment(1);
        Ok(())
    }

    /// Insert an episode with its embedding.
    pub async fn record_episode(&self, episode: &Episode) -> Result<(), MnemosError> {
        let embedding = self.embed_one(&episode.content).await;
        episodes::insert(&self.db, episode, embedding).await
    }

    /// Hybrid ranked fact search: BM25 + cosine, RRF-fused, ties by
    /// recency, capped at `limit`.
    pub async fn hybrid_search_facts(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Fact>, MnemosError> {
        let lexical =
            facts::search_lexical(&self.db, query, self.config.max_retrieval_results).await?;

        let vector = match self.embed_one(query).await {
            Some(query_embedding) => {
                let stored = facts::current_vectors(&self.db).await?;
                rank_by_similarity(
                    &query_embedding,
                    stored,
                    self.config.similarity_threshold as f32,
                    self.config.max_retrieval_results,
                )
            }
            None => vec![],
        };

        let fused = reciprocal_rank_fusion(&lexical, &vector);
        if fused.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let created = facts::created_at_map(&self.db, &ids).await?;
        let ordered_ids = order_with_recency(fused, &created, limit);

        let mut results = facts::by_ids(&self.db, &ordered_ids).await?;
        sort_by_id_order(&mut results, &ordered_ids, |f| f.id.as_str());
        debug!(query_len = query.len(), results = results.len(), "hybrid fact search");
        Ok(results)
    }

    /// Hybrid ranked episode search, same fusion as facts.
    pub async fn hybrid_search_episodes(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Episode>, MnemosError> {
        let lexical =
            episodes::search_lexical(&self.db, query, self.config.max_retrieval_results).await?;

        let vector = match self.embed_one(query).await {
            Some(query_embedding) => {
                let stored = episodes::all_vectors(&self.db).await?;
                rank_by_similarity(
                    &query_embedding,
                    stored,
                    self.config.similarity_threshold as f32,
                    self.config.max_retrieval_results,
                )
            }
            None => vec![],
        };

        let fused = reciprocal_rank_fusion(&lexical, &vector);
        if fused.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let created = episodes::created_at_map(&self.db, &ids).await?;
        let ordered_ids = order_with_recency(fused, &created, limit);

        let mut results = episodes::by_ids(&self.db, &ordered_ids).await?;
        sort_by_id_order(&mut results, &ordered_ids, |e| e.id.as_str());
        Ok(results)
    }

    /// Stamp last-accessed on surfaced facts. Callers treat this as
    /// best-effort; the turn proceeds whatever happens here.
    pub async fn touch_facts(&self, ids: &[String], now_ms: i64) -> Result<(), MnemosError> {
        facts::touch(&self.db, ids, now_ms).await
    }

    /// Forget a person: one transaction, zero orphaned rows.
    pub async fn delete_person(&self, id: &str) -> Result<(), MnemosError> {
        persons::delete_cascade(&self.db, id).await
    }

    /// Export every entity as plain records.
    pub async fn export_all(&self) -> Result<ExportBundle, MnemosError> {
        Ok(ExportBundle {
            version: EXPORT_VERSION,
            persons: persons::list_all(&self.db).await?,
            facts: facts::list_all(&self.db).await?,
            episodes: episodes::list_all(&self.db).await?,
            lessons: lessons::list_all(&self.db).await?,
            group_capsules: capsules::list_groups(&self.db).await?,
        })
    }

    /// Restore an export bundle. Embeddings are regenerated
    /// best-effort; entities land even when the embedder is down.
    pub async fn import_bundle(&self, bundle: ExportBundle) -> Result<(), MnemosError> {
        if bundle.version > EXPORT_VERSION {
            return Err(MnemosError::Config(format!(
                "export bundle version {} is newer than supported {EXPORT_VERSION}",
                bundle.version
            )));
        }
        for person in &bundle.persons {
            persons::insert(&self.db, person).await?;
        }
        for fact in &bundle.facts {
            let embedding = self.embed_one(&fact.content).await;
            facts::insert(&self.db, fact, embedding).await?;
        }
        for episode in &bundle.episodes {
            let embedding = self.embed_one(&episode.content).await;
            episodes::insert(&self.db, episode, embedding).await?;
        }
        for lesson in &bundle.lessons {
            lessons::insert(&self.db, lesson).await?;
        }
        for capsule in &bundle.group_capsules {
            capsules::set_group(&self.db, &capsule.chat_id, &capsule.capsule, capsule.updated_at_ms)
                .await?;
        }
        Ok(())
    }
}

/// Cosine-rank stored vectors against a query embedding, dropping
/// candidates under the similarity threshold.
fn rank_by_similarity(
    query: &[f32],
    stored: Vec<(String, Vec<f32>)>,
    threshold: f32,
    limit: usize,
) -> Vec<(String, f32)> {
    let mut results: Vec<(String, f32)> = stored
        .into_iter()
        .filter(|(_, emb)| emb.len() == query.len())
        .filter_map(|(id, emb)| {
            let sim = cosine_similarity(query, &emb);
            (sim >= threshold).then_some((id, sim))
        })
        .collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

/// Order fused ids by score descending, breaking ties by recency.
fn order_with_recency(
    fused: Vec<(String, f32)>,
    created: &[(String, i64)],
    limit: usize,
) -> Vec<String> {
    let created: HashMap<&str, i64> =
        created.iter().map(|(id, at)| (id.as_str(), *at)).collect();
    let mut fused = fused;
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let at_a = created.get(a.0.as_str()).copied().unwrap_or(0);
                let at_b = created.get(b.0.as_str()).copied().unwrap_or(0);
                at_b.cmp(&at_a)
            })
    });
    fused.into_iter().take(limit).map(|(id, _)| id).collect()
}

/// Reorder fetched entities to match the fused ranking.
fn sort_by_id_order<T>(items: &mut [T], ids: &[String], id_of: impl Fn(&T) -> &str) {
    let index: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    items.sort_by_key(|item| index.get(id_of(item)).copied().unwrap_or(usize::MAX));
}

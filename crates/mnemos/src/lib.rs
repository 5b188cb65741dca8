// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable per-person memory for long-running conversational agents.
//!
//! [`MemorySubsystem`] is the narrow surface the turn orchestrator
//! consumes: one call per turn to assemble a token-budgeted context
//! block, one call per completed turn to extract and reconcile, plus
//! the operational tooling surface (export, import, forget) and the
//! background consolidation loop.
//!
//! Read-path failures degrade to less personalization; they never
//! produce a user-facing memory error. Write-path failures on fact
//! and person rows propagate, because silently losing a write is
//! worse than failing the turn.

use std::sync::Arc;

use mnemos_consolidate::Consolidator;
use mnemos_context::{AssembleRequest, AssembledMemory, ContextAssembler};
use mnemos_core::types::MemoryScope;
use mnemos_core::{EmbeddingAdapter, EventSink, MnemosConfig, MnemosError, ModelAdapter};
use mnemos_extract::{ExtractionPipeline, TurnOutcome};
use mnemos_store::models::{Episode, ExportBundle};
use mnemos_store::queries::capsules::{self, DirtyKind};
use mnemos_store::queries::{episodes, persons};
use mnemos_store::{Database, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

pub use mnemos_context::AssembleRequest as ContextRequest;
pub use mnemos_core::config;
pub use mnemos_core::error;

/// One completed turn handed in by the orchestrator.
#[derive(Debug, Clone)]
pub struct RecordTurnRequest {
    pub channel: String,
    pub channel_user_id: String,
    pub display_name: String,
    pub chat_id: String,
    pub scope: MemoryScope,
    pub user_text: String,
    pub assistant_text: String,
}

/// The memory subsystem behind a conversational agent.
pub struct MemorySubsystem {
    store: Arc<MemoryStore>,
    assembler: ContextAssembler,
    pipeline: Arc<ExtractionPipeline>,
    model: Arc<dyn ModelAdapter>,
    config: MnemosConfig,
    cancel: CancellationToken,
}

impl MemorySubsystem {
    /// Open the subsystem over a database path.
    pub async fn open(
        path: &str,
        embedder: Arc<dyn EmbeddingAdapter>,
        model: Arc<dyn ModelAdapter>,
        events: Option<Arc<dyn EventSink>>,
        config: MnemosConfig,
        cancel: CancellationToken,
    ) -> Result<Self, MnemosError> {
        let db = Database::open(path).await?;
        Ok(Self::with_database(db, embedder, model, events, config, cancel))
    }

    /// Wrap an already opened database.
    pub fn with_database(
        db: Database,
        embedder: Arc<dyn EmbeddingAdapter>,
        model: Arc<dyn ModelAdapter>,
        events: Option<Arc<dyn EventSink>>,
        config: MnemosConfig,
        cancel: CancellationToken,
    ) -> Self {
        let store = Arc::new(MemoryStore::new(db, embedder, config.memory.clone()));
        let assembler = ContextAssembler::new(store.clone(), config.memory.clone());
        let pipeline = Arc::new(ExtractionPipeline::new(
            store.clone(),
            model.clone(),
            events,
            config.extraction.clone(),
            cancel.clone(),
        ));
        Self {
            store,
            assembler,
            pipeline,
            model,
            config,
            cancel,
        }
    }

    /// The underlying store, for operational tooling.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Assemble the memory context block for one turn. Never fails;
    /// at worst the agent answers with less personalization.
    pub async fn assemble_context(&self, request: &AssembleRequest) -> AssembledMemory {
        self.assembler.assemble(request, now_ms()).await
    }

    /// Record a completed turn: log the episode, extract and
    /// reconcile, stamp the episode, and mark derived content dirty.
    pub async fn record_turn(
        &self,
        request: &RecordTurnRequest,
    ) -> Result<TurnOutcome, MnemosError> {
        let now = now_ms();

        let person_id = match request.scope {
            MemoryScope::Dm => Some(
                persons::get_or_create(
                    self.store.db(),
                    &request.channel,
                    &request.channel_user_id,
                    &request.display_name,
                    now,
                )
                .await?
                .id,
            ),
            MemoryScope::Group => None,
        };

        let episode = Episode {
            id: Uuid::new_v4().to_string(),
            chat_id: request.chat_id.clone(),
            person_id,
            content: format!(
                "User: {}\nAssistant: {}",
                request.user_text, request.assistant_text
            ),
            created_at_ms: now,
            last_extracted_at_ms: None,
        };
        let episode_id = match self.store.record_episode(&episode).await {
            Ok(()) => Some(episode.id.clone()),
            Err(e) => {
                // Extraction still runs; the turn just loses its
                // episode log entry.
                warn!(error = %e, "episode logging failed");
                None
            }
        };

        if request.scope == MemoryScope::Group {
            if let Err(e) =
                capsules::mark_dirty(self.store.db(), DirtyKind::GroupCapsule, &request.chat_id, now)
                    .await
            {
                warn!(error = %e, "group dirty marking failed");
            }
        }

        self.pipeline
            .process_turn(
                &request.channel,
                &request.channel_user_id,
                &request.display_name,
                &request.user_text,
                &request.assistant_text,
                episode_id.as_deref(),
                now,
            )
            .await
    }

    /// Forget a person entirely: one transaction, zero orphans.
    pub async fn forget_person(&self, person_id: &str) -> Result<(), MnemosError> {
        self.store.delete_person(person_id).await
    }

    /// Export every entity as plain records.
    pub async fn export(&self) -> Result<ExportBundle, MnemosError> {
        self.store.export_all().await
    }

    /// Restore an export bundle.
    pub async fn import(&self, bundle: ExportBundle) -> Result<(), MnemosError> {
        self.store.import_bundle(bundle).await
    }

    /// Episodes still owed an extraction pass (operational visibility).
    pub async fn list_episodes_needing_extraction(
        &self,
        limit: usize,
    ) -> Result<Vec<Episode>, MnemosError> {
        episodes::list_needing_extraction(self.store.db(), limit).await
    }

    /// Spawn the consolidation loop; it stops when the subsystem's
    /// cancellation token fires.
    pub fn spawn_consolidation(&self) -> tokio::task::JoinHandle<()> {
        let consolidator = Consolidator::new(
            self.store.clone(),
            self.model.clone(),
            self.pipeline.clone(),
            self.config.consolidation.clone(),
            self.cancel.clone(),
        );
        tokio::spawn(async move { consolidator.run_loop().await })
    }

    /// Build a consolidator for explicit run-once control.
    pub fn consolidator(&self) -> Consolidator {
        Consolidator::new(
            self.store.clone(),
            self.model.clone(),
            self.pipeline.clone(),
            self.config.consolidation.clone(),
            self.cancel.clone(),
        )
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

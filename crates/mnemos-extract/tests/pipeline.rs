// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline scenarios: extraction, grounding, verification, and
//! reconciliation against a real in-memory store and a mock model.

use std::sync::Arc;

use mnemos_core::{ExtractionConfig, MemoryConfig};
use mnemos_extract::ExtractionPipeline;
use mnemos_store::models::{Episode, Fact};
use mnemos_store::queries::{episodes, facts, persons};
use mnemos_store::{Database, MemoryStore};
use mnemos_test_utils::{HashEmbedder, MockModel, RecordingEventSink};
use mnemos_core::types::FactCategory;
use tokio_util::sync::CancellationToken;

const NOW_MS: i64 = 1_700_000_000_000;

async fn setup(responses: Vec<&str>) -> (Arc<MemoryStore>, Arc<MockModel>, Arc<RecordingEventSink>, ExtractionPipeline) {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(MemoryStore::new(
        db,
        Arc::new(HashEmbedder::new()),
        MemoryConfig::default(),
    ));
    let model = Arc::new(MockModel::with_responses(
        responses.into_iter().map(String::from).collect(),
    ));
    let sink = Arc::new(RecordingEventSink::new());
    let pipeline = ExtractionPipeline::new(
        store.clone(),
        model.clone(),
        Some(sink.clone()),
        ExtractionConfig::default(),
        CancellationToken::new(),
    );
    (store, model, sink, pipeline)
}

#[tokio::test]
async fn grounded_fact_is_stored_with_quote_invariant() {
    let user_text = "I started a new job at Initech last week";
    let extraction = r#"{
        "facts": [{"content": "Works at Initech", "category": "professional",
                   "evidenceQuote": "a new job at Initech"}]
    }"#;
    let (store, _model, _sink, pipeline) = setup(vec![extraction]).await;

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", user_text, "Congrats!", None, NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_added, 1);

    let person = persons::find_by_channel_user(store.db(), "signal", "u1")
        .await
        .unwrap()
        .unwrap();
    let stored = facts::list_current_for_person(store.db(), &person.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "Works at Initech");
    assert_eq!(stored[0].category, FactCategory::Professional);
    assert!(
        user_text.contains(&stored[0].evidence_quote),
        "stored quote must be verbatim in the source"
    );
}

#[tokio::test]
async fn ungrounded_fact_is_dropped() {
    let extraction = r#"{
        "facts": [{"content": "Lives in Lisbon", "category": "personal",
                   "evidenceQuote": "I moved to Lisbon"}]
    }"#;
    let (store, _model, _sink, pipeline) = setup(vec![extraction]).await;

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", "The weather is nice today", "", None, NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_added, 0);

    let person = persons::find_by_channel_user(store.db(), "signal", "u1")
        .await
        .unwrap()
        .unwrap();
    let stored = facts::list_current_for_person(store.db(), &person.id).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn unparsable_extraction_stores_nothing_but_stamps_episode() {
    let (store, _model, _sink, pipeline) = setup(vec!["I refuse to answer in JSON."]).await;

    let episode = Episode {
        id: "e1".into(),
        chat_id: "dm-1".into(),
        person_id: None,
        content: "hello there".into(),
        created_at_ms: NOW_MS - 1000,
        last_extracted_at_ms: None,
    };
    episodes::insert(store.db(), &episode, None).await.unwrap();

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", "hello there", "", Some("e1"), NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_added, 0);

    let pending = episodes::list_needing_extraction(store.db(), 10).await.unwrap();
    assert!(pending.is_empty(), "episode must be stamped even when output is garbage");
}

#[tokio::test]
async fn verification_drops_unsupported_facts() {
    let user_text = "I play violin and I guess I once said I like opera";
    let extraction = r#"{
        "facts": [
            {"content": "Plays violin", "category": "personal", "evidenceQuote": "I play violin"},
            {"content": "Loves opera", "category": "preference", "evidenceQuote": "I like opera"}
        ]
    }"#;
    let verify = r#"{"supported": [0]}"#;
    let (store, _model, _sink, pipeline) = setup(vec![extraction, verify]).await;

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", user_text, "", None, NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_added, 1);

    let person = persons::find_by_channel_user(store.db(), "signal", "u1")
        .await
        .unwrap()
        .unwrap();
    let stored = facts::list_current_for_person(store.db(), &person.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "Plays violin");
}

#[tokio::test]
async fn reconcile_updates_existing_fact_in_place() {
    let extraction = r#"{
        "facts": [{"content": "Works at Globex now", "category": "professional",
                   "evidenceQuote": "I moved to Globex"}]
    }"#;
    let decisions = r#"[{"action": "update", "index": 0, "content": "Works at Globex"}]"#;
    let (store, _model, _sink, pipeline) = setup(vec![extraction, decisions]).await;

    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    store
        .record_fact(&Fact {
            id: "f-old".into(),
            person_id: Some(person.id.clone()),
            subject: "Ada".into(),
            content: "Works at Initech".into(),
            category: FactCategory::Professional,
            evidence_quote: "I work at Initech".into(),
            is_current: true,
            last_accessed_at_ms: NOW_MS - 1000,
            created_at_ms: NOW_MS - 1000,
        })
        .await
        .unwrap();

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", "I moved to Globex", "", None, NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_updated, 1);
    assert_eq!(outcome.facts_added, 0);

    let stored = facts::list_current_for_person(store.db(), &person.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "f-old", "update rewrites in place");
    assert_eq!(stored[0].content, "Works at Globex");
}

#[tokio::test]
async fn reconcile_falls_back_to_heuristic_on_garbage() {
    let extraction = r#"{
        "facts": [
            {"content": "Has a cat", "category": "personal", "evidenceQuote": "my cat"},
            {"content": "Works at Initech", "category": "professional", "evidenceQuote": "at Initech"}
        ]
    }"#;
    // Verification passes everything, reconciliation output is garbage.
    let verify = r#"{"supported": [0, 1]}"#;
    let reconcile_garbage = "cannot comply";
    let (store, _model, _sink, pipeline) = setup(vec![extraction, verify, reconcile_garbage]).await;

    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    store
        .record_fact(&Fact {
            id: "f-old".into(),
            person_id: Some(person.id.clone()),
            subject: "Ada".into(),
            content: "works at initech".into(),
            category: FactCategory::Professional,
            evidence_quote: "at Initech".into(),
            is_current: true,
            last_accessed_at_ms: NOW_MS - 1000,
            created_at_ms: NOW_MS - 1000,
        })
        .await
        .unwrap();

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", "my cat sits with me at Initech", "", None, NOW_MS)
        .await
        .unwrap();

    // Heuristic dedupe: "Works at Initech" matches existing content
    // case-insensitively, only the cat fact lands.
    assert_eq!(outcome.facts_added, 1);
    let stored = facts::list_current_for_person(store.db(), &person.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|f| f.content == "Has a cat"));
}

#[tokio::test]
async fn events_and_fields_proceed_without_facts() {
    let extraction = r#"{
        "facts": [],
        "events": [{"title": "dentist appointment", "category": "appointment", "daysFromNow": 2}],
        "fields": {"concerns": ["tooth pain"], "mood": "tense"}
    }"#;
    let (store, _model, sink, pipeline) = setup(vec![extraction]).await;

    let outcome = pipeline
        .process_turn("signal", "u1", "Ada", "dentist on thursday, tooth hurts", "", None, NOW_MS)
        .await
        .unwrap();
    assert_eq!(outcome.facts_added, 0);
    assert_eq!(outcome.events_scheduled, 1);
    assert!(outcome.fields_updated);

    let events = sink.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "dentist appointment");
    assert_eq!(events[0].at_ms, NOW_MS + 2 * 24 * 60 * 60 * 1000);
    // Appointments get a one-day automatic follow-up.
    assert_eq!(events[0].follow_up_at_ms, Some(events[0].at_ms + 24 * 60 * 60 * 1000));

    let person = persons::find_by_channel_user(store.db(), "signal", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(person.fields.concerns, vec!["tooth pain".to_string()]);
    assert_eq!(person.fields.last_mood.as_deref(), Some("tense"));
}

#[tokio::test]
async fn turn_bumps_relationship_score() {
    let (store, _model, _sink, pipeline) = setup(vec![r#"{"facts": []}"#, r#"{"facts": []}"#]).await;

    pipeline
        .process_turn("signal", "u1", "Ada", "hello hello", "", None, NOW_MS)
        .await
        .unwrap();
    pipeline
        .process_turn("signal", "u1", "Ada", "hello again", "", None, NOW_MS + 1)
        .await
        .unwrap();

    let person = persons::find_by_channel_user(store.db(), "signal", "u1")
        .await
        .unwrap()
        .unwrap();
    assert!((person.relationship_score - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn cancelled_pipeline_makes_no_model_call() {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(MemoryStore::new(
        db,
        Arc::new(HashEmbedder::new()),
        MemoryConfig::default(),
    ));
    let model = Arc::new(MockModel::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = ExtractionPipeline::new(
        store,
        model.clone(),
        None,
        ExtractionConfig::default(),
        cancel,
    );

    let result = pipeline
        .process_turn("signal", "u1", "Ada", "some text", "", None, NOW_MS)
        .await;
    assert!(matches!(result, Err(mnemos_core::MnemosError::Cancelled)));
    assert!(model.requests().await.is_empty());
}

// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store integration tests against an in-memory database with the
//! real schema and a deterministic embedder.

use std::sync::Arc;

use mnemos_core::types::FactCategory;
use mnemos_core::MemoryConfig;
use mnemos_store::models::{Episode, Fact, Lesson};
use mnemos_store::queries::capsules::{self, DirtyKind};
use mnemos_store::queries::{episodes, facts, lessons, persons};
use mnemos_store::{Database, MemoryStore};
use mnemos_test_utils::HashEmbedder;

async fn setup_store() -> MemoryStore {
    let db = Database::open_in_memory().await.unwrap();
    MemoryStore::new(db, Arc::new(HashEmbedder::new()), MemoryConfig::default())
}

fn make_fact(id: &str, person_id: &str, content: &str, created_at_ms: i64) -> Fact {
    Fact {
        id: id.to_string(),
        person_id: Some(person_id.to_string()),
        subject: "Ada".to_string(),
        content: content.to_string(),
        category: FactCategory::Misc,
        evidence_quote: content.to_string(),
        is_current: true,
        last_accessed_at_ms: created_at_ms,
        created_at_ms,
    }
}

fn make_episode(id: &str, chat_id: &str, person_id: Option<&str>, content: &str) -> Episode {
    Episode {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        person_id: person_id.map(|p| p.to_string()),
        content: content.to_string(),
        created_at_ms: 1_000,
        last_extracted_at_ms: None,
    }
}

async fn count(store: &MemoryStore, sql: &str) -> i64 {
    let sql = sql.to_string();
    store
        .db()
        .connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok::<i64, rusqlite::Error>(n)
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn person_get_or_create_is_idempotent() {
    let store = setup_store().await;
    let a = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();
    let b = persons::get_or_create(store.db(), "signal", "u1", "Ada Again", 2).await.unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(b.display_name, "Ada", "first registration wins");
}

#[tokio::test]
async fn relationship_score_never_decreases() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();

    persons::bump_relationship(store.db(), &person.id, 0.5).await.unwrap();
    persons::bump_relationship(store.db(), &person.id, -3.0).await.unwrap();

    let person = persons::get(store.db(), &person.id).await.unwrap().unwrap();
    assert!((person.relationship_score - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn hybrid_search_finds_lexical_match() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();

    store
        .record_fact(&make_fact("f1", &person.id, "Has a golden retriever named Max", 10))
        .await
        .unwrap();
    store
        .record_fact(&make_fact("f2", &person.id, "Prefers tea over coffee", 20))
        .await
        .unwrap();

    let results = store.hybrid_search_facts("golden retriever", 5).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].id, "f1");
}

#[tokio::test]
async fn hybrid_search_skips_retired_facts() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();

    store
        .record_fact(&make_fact("f1", &person.id, "Works at Initech", 10))
        .await
        .unwrap();
    facts::retire(store.db(), "f1").await.unwrap();

    let results = store.hybrid_search_facts("Initech", 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn fts_operators_in_query_do_not_error() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();
    store
        .record_fact(&make_fact("f1", &person.id, "Likes climbing", 10))
        .await
        .unwrap();

    // Raw FTS syntax would be a MATCH parse error without sanitization.
    let results = store.hybrid_search_facts("\"likes AND (climbing", 5).await.unwrap();
    assert!(!results.is_empty());
}

#[tokio::test]
async fn touch_facts_updates_last_accessed_only() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();
    store
        .record_fact(&make_fact("f1", &person.id, "Plays violin", 10))
        .await
        .unwrap();

    store.touch_facts(&["f1".to_string()], 9_999).await.unwrap();

    let fact = &facts::list_current_for_person(store.db(), &person.id).await.unwrap()[0];
    assert_eq!(fact.last_accessed_at_ms, 9_999);
    assert_eq!(fact.content, "Plays violin");
    assert_eq!(fact.created_at_ms, 10);
}

#[tokio::test]
async fn delete_person_leaves_zero_orphans() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();
    let keeper = persons::get_or_create(store.db(), "signal", "u2", "Bob", 1).await.unwrap();

    store
        .record_fact(&make_fact("f1", &person.id, "Works at Initech", 10))
        .await
        .unwrap();
    store
        .record_fact(&make_fact("f2", &keeper.id, "Works at Globex", 10))
        .await
        .unwrap();
    store
        .record_episode(&make_episode("e1", "chat-1", Some(&person.id), "talked about work"))
        .await
        .unwrap();
    lessons::insert(
        store.db(),
        &Lesson {
            id: "l1".into(),
            person_id: Some(person.id.clone()),
            category: "style".into(),
            rule: "keep replies short".into(),
            confidence: 0.8,
            validation_count: 0,
            violation_count: 0,
            promoted: false,
            created_at_ms: 1,
        },
    )
    .await
    .unwrap();
    capsules::mark_dirty(store.db(), DirtyKind::PublicStyle, &person.id, 5).await.unwrap();

    store.delete_person(&person.id).await.unwrap();

    let pid = person.id.clone();
    for table_and_filter in [
        format!("SELECT COUNT(*) FROM facts WHERE person_id = '{pid}'"),
        format!("SELECT COUNT(*) FROM episodes WHERE person_id = '{pid}'"),
        format!("SELECT COUNT(*) FROM lessons WHERE person_id = '{pid}'"),
        format!("SELECT COUNT(*) FROM dirty_public_styles WHERE person_id = '{pid}'"),
        "SELECT COUNT(*) FROM fact_vectors WHERE fact_id NOT IN (SELECT id FROM facts)"
            .to_string(),
        "SELECT COUNT(*) FROM episode_vectors \
         WHERE episode_id NOT IN (SELECT id FROM episodes)"
            .to_string(),
        "SELECT COUNT(*) FROM facts_fts WHERE rowid NOT IN (SELECT rowid FROM facts)"
            .to_string(),
        "SELECT COUNT(*) FROM episodes_fts WHERE rowid NOT IN (SELECT rowid FROM episodes)"
            .to_string(),
    ] {
        assert_eq!(count(&store, &table_and_filter).await, 0, "{table_and_filter}");
    }

    // The other person is untouched.
    assert_eq!(
        facts::list_current_for_person(store.db(), &keeper.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn episodes_needing_extraction_lifecycle() {
    let store = setup_store().await;
    store
        .record_episode(&make_episode("e1", "chat-1", None, "first turn"))
        .await
        .unwrap();

    let pending = episodes::list_needing_extraction(store.db(), 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "e1");

    episodes::mark_extracted(store.db(), "e1", 2_000).await.unwrap();
    let pending = episodes::list_needing_extraction(store.db(), 10).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn dirty_claim_is_exclusive() {
    let store = setup_store().await;
    capsules::mark_dirty(store.db(), DirtyKind::GroupCapsule, "chat-1", 100).await.unwrap();

    let first = capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, 200, 150, 10)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    // A second worker with the same stale horizon sees nothing.
    let second = capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, 210, 150, 10)
        .await
        .unwrap();
    assert!(second.is_empty());

    // A worker far in the future treats the claim as abandoned.
    let takeover = capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, 9_000, 8_000, 10)
        .await
        .unwrap();
    assert_eq!(takeover.len(), 1);
}

#[tokio::test]
async fn dirty_clear_if_clean_compares_last_at() {
    let store = setup_store().await;
    capsules::mark_dirty(store.db(), DirtyKind::GroupCapsule, "chat-1", 100).await.unwrap();
    let claimed = capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, 200, 150, 10)
        .await
        .unwrap();
    let seen = claimed[0].dirty_last_at_ms;

    // New dirt arrives after the claim.
    capsules::mark_dirty(store.db(), DirtyKind::GroupCapsule, "chat-1", 300).await.unwrap();

    let cleared = capsules::clear_if_clean(store.db(), DirtyKind::GroupCapsule, "chat-1", seen)
        .await
        .unwrap();
    assert!(!cleared, "new dirt must survive the clear");

    // The claim was released, so the row is immediately claimable.
    let reclaimed = capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, 400, 350, 10)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].dirty_last_at_ms, 300);

    let cleared =
        capsules::clear_if_clean(store.db(), DirtyKind::GroupCapsule, "chat-1", 300)
            .await
            .unwrap();
    assert!(cleared);
}

#[tokio::test]
async fn export_import_round_trip() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();
    store
        .record_fact(&make_fact("f1", &person.id, "Works at Initech", 10))
        .await
        .unwrap();
    store
        .record_episode(&make_episode("e1", "chat-1", Some(&person.id), "hello"))
        .await
        .unwrap();
    capsules::set_group(store.db(), "chat-1", "a friendly group", 50).await.unwrap();

    let bundle = store.export_all().await.unwrap();
    assert_eq!(bundle.persons.len(), 1);
    assert_eq!(bundle.facts.len(), 1);

    let restored = setup_store().await;
    restored.import_bundle(bundle).await.unwrap();

    let people = persons::list_all(restored.db()).await.unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].display_name, "Ada");

    // Imported facts are searchable again (vectors regenerated).
    let results = restored.hybrid_search_facts("Initech", 5).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn import_rejects_newer_bundle_version() {
    let store = setup_store().await;
    let mut bundle = store.export_all().await.unwrap();
    bundle.version = 99;

    let restored = setup_store().await;
    assert!(restored.import_bundle(bundle).await.is_err());
}

#[tokio::test]
async fn person_fields_replace_whole_record() {
    let store = setup_store().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", 1).await.unwrap();

    let mut fields = person.fields.clone();
    fields.concerns = vec!["big deadline".into()];
    fields.goals = vec!["learn rust".into()];
    fields.last_mood = Some("upbeat".into());
    persons::replace_fields(store.db(), &person.id, &fields).await.unwrap();

    let person = persons::get(store.db(), &person.id).await.unwrap().unwrap();
    assert_eq!(person.fields, fields);
}

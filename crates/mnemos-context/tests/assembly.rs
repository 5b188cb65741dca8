// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end assembly scenarios against an in-memory store.

use std::sync::Arc;

use mnemos_context::{AssembleRequest, ContextAssembler};
use mnemos_core::tokens::estimate_tokens;
use mnemos_core::types::{FactCategory, MemoryScope};
use mnemos_core::MemoryConfig;
use mnemos_store::models::{Episode, Fact, Lesson, PersonFields};
use mnemos_store::queries::{capsules, lessons, persons};
use mnemos_store::{Database, MemoryStore};
use mnemos_test_utils::HashEmbedder;

const NOW_MS: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

async fn setup() -> (Arc<MemoryStore>, ContextAssembler) {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(MemoryStore::new(
        db,
        Arc::new(HashEmbedder::new()),
        MemoryConfig::default(),
    ));
    let assembler = ContextAssembler::new(store.clone(), MemoryConfig::default());
    (store, assembler)
}

fn dm_request(query: &str, budget: u32) -> AssembleRequest {
    AssembleRequest {
        query: query.to_string(),
        chat_id: "dm-1".to_string(),
        channel: "signal".to_string(),
        channel_user_id: "u1".to_string(),
        budget_tokens: budget,
        scope: MemoryScope::Dm,
        include_capsule: true,
        include_group_capsule: true,
    }
}

fn group_request(query: &str, budget: u32) -> AssembleRequest {
    AssembleRequest {
        chat_id: "group-1".to_string(),
        scope: MemoryScope::Group,
        ..dm_request(query, budget)
    }
}

fn fact(id: &str, person_id: &str, content: &str, category: FactCategory, age_ms: i64) -> Fact {
    Fact {
        id: id.to_string(),
        person_id: Some(person_id.to_string()),
        subject: "Ada".to_string(),
        content: content.to_string(),
        category,
        evidence_quote: content.to_string(),
        is_current: true,
        last_accessed_at_ms: NOW_MS - age_ms,
        created_at_ms: NOW_MS - age_ms,
    }
}

fn episode(id: &str, chat_id: &str, content: &str, age_ms: i64) -> Episode {
    Episode {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        person_id: None,
        content: content.to_string(),
        created_at_ms: NOW_MS - age_ms,
        last_extracted_at_ms: Some(NOW_MS - age_ms),
    }
}

#[tokio::test]
async fn skip_gate_phatic_turn() {
    let (_store, assembler) = setup().await;
    let result = assembler.assemble(&dm_request("lol", 500), NOW_MS).await;
    assert_eq!(result.text, "");
    assert!(result.skipped);
    assert_eq!(result.tokens_used, 0);
}

#[tokio::test]
async fn skip_gate_lets_event_shaped_text_through() {
    let (_store, assembler) = setup().await;
    let result = assembler
        .assemble(&dm_request("remind me tomorrow", 500), NOW_MS)
        .await;
    assert!(!result.skipped, "event-shaped text must attempt retrieval");
}

#[tokio::test]
async fn empty_store_returns_empty_not_hollow_block() {
    let (_store, assembler) = setup().await;
    let result = assembler
        .assemble(&dm_request("what was that restaurant called?", 500), NOW_MS)
        .await;
    assert_eq!(result.text, "");
    assert!(!result.skipped);
}

#[tokio::test]
async fn dm_block_renders_frame_and_facts() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    persons::bump_relationship(store.db(), &person.id, 8.0).await.unwrap();
    store
        .record_fact(&fact("f1", &person.id, "Has a golden retriever named Max", FactCategory::Personal, 3 * HOUR_MS))
        .await
        .unwrap();

    let result = assembler
        .assemble(&dm_request("tell me about the retriever", 500), NOW_MS)
        .await;

    assert!(result.text.starts_with("```\nMEMORY CONTEXT (DATA)\n"));
    assert!(result.text.ends_with("```"));
    assert!(result.text.contains("Person: Ada (close_friend)"));
    assert!(result.text.contains("Facts:"));
    assert!(result.text.contains("[3h] Has a golden retriever named Max"));
    assert!(result.tokens_used > 0);
}

#[tokio::test]
async fn budget_law_never_exceeded() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    persons::bump_relationship(store.db(), &person.id, 8.0).await.unwrap();
    persons::set_capsule(store.db(), &person.id, &"long capsule text ".repeat(40), NOW_MS)
        .await
        .unwrap();
    for i in 0..20 {
        store
            .record_fact(&fact(
                &format!("f{i}"),
                &person.id,
                &format!("Fact number {i} about the big deadline project"),
                FactCategory::Misc,
                i * HOUR_MS,
            ))
            .await
            .unwrap();
        store
            .record_episode(&episode(
                &format!("e{i}"),
                "dm-1",
                &format!("episode {i} discussing the deadline project"),
                i * HOUR_MS,
            ))
            .await
            .unwrap();
    }

    for budget in [40_u32, 80, 150, 400] {
        let result = assembler
            .assemble(&dm_request("how is the deadline project going", budget), NOW_MS)
            .await;
        assert!(
            result.tokens_used <= budget,
            "budget {budget} exceeded: {} tokens",
            result.tokens_used
        );
        assert!(estimate_tokens(&result.text) <= budget);
    }
}

#[tokio::test]
async fn staleness_pruning_on_structured_fields() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    let fields = PersonFields {
        concerns: vec!["big deadline".into(), "wedding planning".into()],
        goals: vec!["run a marathon".into(), "learn rust".into()],
        preferences: vec![],
        last_mood: None,
        curiosity: vec![],
    };
    persons::replace_fields(store.db(), &person.id, &fields).await.unwrap();

    // Only "deadline" and "rust" appear in the recent window.
    store
        .record_episode(&episode("e1", "dm-1", "we talked about the deadline at length", 2 * DAY_MS))
        .await
        .unwrap();
    store
        .record_episode(&episode("e2", "dm-1", "rust borrow checker frustration again", 5 * DAY_MS))
        .await
        .unwrap();
    // Outside the 14-day window; contributes nothing.
    store
        .record_episode(&episode("e3", "dm-1", "venue tours and long training sessions", 20 * DAY_MS))
        .await
        .unwrap();

    let result = assembler
        .assemble(&dm_request("how are things going lately", 500), NOW_MS)
        .await;

    assert!(result.text.contains("On their mind lately: big deadline"));
    assert!(result.text.contains("Working toward: learn rust"));
    assert!(!result.text.contains("wedding planning"));
    assert!(!result.text.contains("run a marathon"));
}

#[tokio::test]
async fn trust_tier_gates_sensitive_categories() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    // relationship_score stays 0.0: new_contact.
    store
        .record_fact(&fact("f1", &person.id, "Is going through a divorce", FactCategory::Personal, HOUR_MS))
        .await
        .unwrap();
    store
        .record_fact(&fact("f2", &person.id, "Their sister is in a divorce fight", FactCategory::Relationship, HOUR_MS))
        .await
        .unwrap();
    store
        .record_fact(&fact("f3", &person.id, "Prefers tea during divorce talks", FactCategory::Preference, HOUR_MS))
        .await
        .unwrap();

    let result = assembler
        .assemble(&dm_request("what do I know about the divorce", 500), NOW_MS)
        .await;

    assert!(!result.text.contains("going through a divorce"));
    assert!(!result.text.contains("sister"));
    assert!(result.text.contains("Prefers tea"), "{}", result.text);
}

#[tokio::test]
async fn group_scope_never_leaks_dm_content() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    persons::bump_relationship(store.db(), &person.id, 9.0).await.unwrap();
    persons::set_capsule(store.db(), &person.id, "Privately negotiating a 9000 dollar car purchase", NOW_MS)
        .await
        .unwrap();
    persons::set_public_style(store.db(), &person.id, "Dry humor, short messages").await.unwrap();
    store
        .record_fact(&fact("f1", &person.id, "Budgeted 9000 dollars for the car", FactCategory::Personal, HOUR_MS))
        .await
        .unwrap();
    capsules::set_group(store.db(), "group-1", "Weekend hiking crew, mostly memes", NOW_MS)
        .await
        .unwrap();

    let result = assembler
        .assemble(&group_request("what about the 9000 dollar car", 500), NOW_MS)
        .await;

    assert!(!result.text.contains("9000"), "DM-only content leaked: {}", result.text);
    assert!(result.text.contains("Group vibe: Weekend hiking crew"));
    assert!(result.text.contains("Their style here: Dry humor"));
}

#[tokio::test]
async fn behavior_insights_render_deduped() {
    let (store, assembler) = setup().await;
    for (i, rule) in ["Answer before asking questions", "Answer before asking questions", "No emoji"]
        .iter()
        .enumerate()
    {
        lessons::insert(
            store.db(),
            &Lesson {
                id: format!("l{i}"),
                person_id: None,
                category: "style".into(),
                rule: rule.to_string(),
                confidence: 0.9 - i as f64 * 0.05,
                validation_count: 0,
                violation_count: 0,
                promoted: false,
                created_at_ms: NOW_MS,
            },
        )
        .await
        .unwrap();
    }

    let result = assembler
        .assemble(&dm_request("can you help me plan the week", 500), NOW_MS)
        .await;

    assert!(result.text.contains("Behavior insights:"));
    assert_eq!(result.text.matches("Answer before asking questions").count(), 1);
    assert!(result.text.contains("No emoji"));
}

#[tokio::test]
async fn surfaced_facts_are_touched() {
    let (store, assembler) = setup().await;
    let person = persons::get_or_create(store.db(), "signal", "u1", "Ada", NOW_MS).await.unwrap();
    store
        .record_fact(&fact("f1", &person.id, "Keeps bees on the roof", FactCategory::Misc, 30 * DAY_MS))
        .await
        .unwrap();

    let result = assembler
        .assemble(&dm_request("how are the bees doing", 500), NOW_MS)
        .await;
    assert!(result.text.contains("Keeps bees"));

    let facts = mnemos_store::queries::facts::list_current_for_person(store.db(), &person.id)
        .await
        .unwrap();
    assert_eq!(facts[0].last_accessed_at_ms, NOW_MS);
}

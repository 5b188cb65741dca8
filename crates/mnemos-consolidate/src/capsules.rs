// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capsule regeneration for lease-claimed dirty persons and groups.
//!
//! Claim → summarize via the model → compare-and-clear on
//! `dirty_last_at_ms`; the claim is released when the summarization
//! fails so the next pass retries.

use std::sync::Arc;

use mnemos_core::types::ModelRequest;
use mnemos_core::{MnemosError, ModelAdapter};
use mnemos_extract::parse::{parse_object, ModelParse};
use mnemos_store::models::Person;
use mnemos_store::queries::capsules::{self, DirtyKind};
use mnemos_store::queries::{episodes, facts, persons};
use mnemos_store::MemoryStore;
use serde::Deserialize;
use tracing::{debug, warn};

/// Episodes fed into a group capsule summarization.
const GROUP_EPISODE_LIMIT: usize = 50;

const PERSON_CAPSULE_PROMPT: &str = r#"Write a compact durable summary of one person from their stored facts and fields. Respond with one JSON object:

{"capsule": "...", "publicStyle": "..."}

- capsule: 2-4 sentences capturing who they are, what matters to them now, and how to be useful to them. Private details belong here.
- publicStyle: 1-2 sentences describing only their communication style, safe to use in group chats. Never include private facts, plans, numbers, or relationships.

Person: {name}
Facts:
{facts}

Current concerns: {concerns}
Goals: {goals}
"#;

const GROUP_CAPSULE_PROMPT: &str = r#"Write a compact durable summary of one group chat from its recent messages. 2-3 sentences: the group's purpose, tone, and recurring topics. Use only the messages below; never include anything from direct messages. Respond with one JSON object:

{"capsule": "..."}

Recent messages:
{episodes}
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonCapsulePayload {
    capsule: String,
    #[serde(default)]
    public_style: String,
}

#[derive(Debug, Deserialize)]
struct GroupCapsulePayload {
    capsule: String,
}

/// Regenerate capsules for claimed dirty persons. Returns how many
/// markers were processed to completion (cleared).
pub async fn regenerate_person_capsules(
    store: &Arc<MemoryStore>,
    model: &Arc<dyn ModelAdapter>,
    now_ms: i64,
    stale_before_ms: i64,
    limit: usize,
) -> Result<usize, MnemosError> {
    let claimed =
        capsules::claim_dirty(store.db(), DirtyKind::PublicStyle, now_ms, stale_before_ms, limit)
            .await?;

    let mut regenerated = 0;
    for marker in claimed {
        let Some(person) = persons::get(store.db(), &marker.key).await? else {
            // Person vanished between marking and claiming.
            capsules::clear_if_clean(store.db(), DirtyKind::PublicStyle, &marker.key, i64::MAX)
                .await?;
            continue;
        };

        match summarize_person(store, model, &person).await {
            Ok(payload) => {
                persons::set_capsule(store.db(), &person.id, &payload.capsule, now_ms).await?;
                if !payload.public_style.trim().is_empty() {
                    persons::set_public_style(store.db(), &person.id, &payload.public_style)
                        .await?;
                }
                let cleared = capsules::clear_if_clean(
                    store.db(),
                    DirtyKind::PublicStyle,
                    &marker.key,
                    marker.dirty_last_at_ms,
                )
                .await?;
                if cleared {
                    regenerated += 1;
                } else {
                    debug!(person_id = person.id.as_str(), "new dirt arrived during regeneration");
                }
            }
            Err(e) => {
                warn!(error = %e, person_id = person.id.as_str(), "capsule regeneration failed");
                capsules::release_claim(store.db(), DirtyKind::PublicStyle, &marker.key).await?;
            }
        }
    }
    Ok(regenerated)
}

/// Regenerate capsules for claimed dirty groups.
pub async fn regenerate_group_capsules(
    store: &Arc<MemoryStore>,
    model: &Arc<dyn ModelAdapter>,
    now_ms: i64,
    stale_before_ms: i64,
    limit: usize,
) -> Result<usize, MnemosError> {
    let claimed =
        capsules::claim_dirty(store.db(), DirtyKind::GroupCapsule, now_ms, stale_before_ms, limit)
            .await?;

    let mut regenerated = 0;
    for marker in claimed {
        match summarize_group(store, model, &marker.key).await {
            Ok(capsule) => {
                capsules::set_group(store.db(), &marker.key, &capsule, now_ms).await?;
                let cleared = capsules::clear_if_clean(
                    store.db(),
                    DirtyKind::GroupCapsule,
                    &marker.key,
                    marker.dirty_last_at_ms,
                )
                .await?;
                if cleared {
                    regenerated += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, chat_id = marker.key.as_str(), "group capsule regeneration failed");
                capsules::release_claim(store.db(), DirtyKind::GroupCapsule, &marker.key).await?;
            }
        }
    }
    Ok(regenerated)
}

async fn summarize_person(
    store: &Arc<MemoryStore>,
    model: &Arc<dyn ModelAdapter>,
    person: &Person,
) -> Result<PersonCapsulePayload, MnemosError> {
    let current = facts::list_current_for_person(store.db(), &person.id).await?;
    let facts_text = if current.is_empty() {
        "(none)".to_string()
    } else {
        current
            .iter()
            .map(|f| format!("- [{}] {}", f.category.as_str(), f.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let request = ModelRequest {
        system_prompt: None,
        prompt: PERSON_CAPSULE_PROMPT
            .replace("{name}", &person.display_name)
            .replace("{facts}", &facts_text)
            .replace("{concerns}", &person.fields.concerns.join("; "))
            .replace("{goals}", &person.fields.goals.join("; ")),
        max_tokens: 512,
    };
    let response = model.complete(request).await?;
    match parse_object::<PersonCapsulePayload>(&response.content) {
        ModelParse::Parsed(payload) if !payload.capsule.trim().is_empty() => Ok(payload),
        _ => Err(MnemosError::Model {
            message: "capsule summarization returned no usable capsule".to_string(),
            source: None,
        }),
    }
}

async fn summarize_group(
    store: &Arc<MemoryStore>,
    model: &Arc<dyn ModelAdapter>,
    chat_id: &str,
) -> Result<String, MnemosError> {
    let recent = episodes::recent_for_chat(store.db(), chat_id, 0, GROUP_EPISODE_LIMIT).await?;
    let episodes_text = if recent.is_empty() {
        "(none)".to_string()
    } else {
        recent
            .iter()
            .map(|e| format!("- {}", e.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let request = ModelRequest {
        system_prompt: None,
        prompt: GROUP_CAPSULE_PROMPT.replace("{episodes}", &episodes_text),
        max_tokens: 256,
    };
    let response = model.complete(request).await?;
    match parse_object::<GroupCapsulePayload>(&response.content) {
        ModelParse::Parsed(payload) if !payload.capsule.trim().is_empty() => Ok(payload.capsule),
        _ => Err(MnemosError::Model {
            message: "group capsule summarization returned no usable capsule".to_string(),
            source: None,
        }),
    }
}

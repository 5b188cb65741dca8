// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Person CRUD and the cascading forget path.

use mnemos_core::types::TrustTier;
use mnemos_core::MnemosError;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::{map_tr_err, Database};
use crate::models::{Person, PersonFields};

const PERSON_COLUMNS: &str = "id, channel, channel_user_id, display_name, relationship_score, \
     trust_override, capsule, capsule_updated_at_ms, public_style, \
     concerns, goals, preferences, last_mood, curiosity, created_at_ms";

fn row_to_person(row: &rusqlite::Row) -> Person {
    let trust_str: Option<String> = row.get(5).unwrap_or(None);
    Person {
        id: row.get(0).unwrap_or_default(),
        channel: row.get(1).unwrap_or_default(),
        channel_user_id: row.get(2).unwrap_or_default(),
        display_name: row.get(3).unwrap_or_default(),
        relationship_score: row.get(4).unwrap_or(0.0),
        trust_override: trust_str.as_deref().and_then(TrustTier::from_str_value),
        capsule: row.get(6).unwrap_or(None),
        capsule_updated_at_ms: row.get(7).unwrap_or(None),
        public_style: row.get(8).unwrap_or(None),
        fields: PersonFields {
            concerns: json_list(row, 9),
            goals: json_list(row, 10),
            preferences: json_list(row, 11),
            last_mood: row.get(12).unwrap_or(None),
            curiosity: json_list(row, 13),
        },
        created_at_ms: row.get(14).unwrap_or(0),
    }
}

fn json_list(row: &rusqlite::Row, idx: usize) -> Vec<String> {
    let raw: String = row.get(idx).unwrap_or_default();
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Fetch the person registered for a (channel, channel-user-id) pair,
/// creating one on first contact.
pub async fn get_or_create(
    db: &Database,
    channel: &str,
    channel_user_id: &str,
    display_name: &str,
    now_ms: i64,
) -> Result<Person, MnemosError> {
    let channel = channel.to_string();
    let channel_user_id = channel_user_id.to_string();
    let display_name = display_name.to_string();
    db.connection()
        .call(move |conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {PERSON_COLUMNS} FROM persons \
                         WHERE channel = ?1 AND channel_user_id = ?2"
                    ),
                    params![channel, channel_user_id],
                    |row| Ok(row_to_person(row)),
                )
                .optional()?;
            if let Some(person) = existing {
                return Ok(person);
            }

            let person = Person {
                id: Uuid::new_v4().to_string(),
                channel,
                channel_user_id,
                display_name,
                relationship_score: 0.0,
                trust_override: None,
                capsule: None,
                capsule_updated_at_ms: None,
                public_style: None,
                fields: PersonFields::default(),
                created_at_ms: now_ms,
            };
            conn.execute(
                "INSERT INTO persons \
                 (id, channel, channel_user_id, display_name, relationship_score, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    person.id,
                    person.channel,
                    person.channel_user_id,
                    person.display_name,
                    person.relationship_score,
                    person.created_at_ms
                ],
            )?;
            Ok(person)
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a person by channel identity without creating one.
pub async fn find_by_channel_user(
    db: &Database,
    channel: &str,
    channel_user_id: &str,
) -> Result<Option<Person>, MnemosError> {
    let channel = channel.to_string();
    let channel_user_id = channel_user_id.to_string();
    db.connection()
        .call(move |conn| {
            let person = conn
                .query_row(
                    &format!(
                        "SELECT {PERSON_COLUMNS} FROM persons \
                         WHERE channel = ?1 AND channel_user_id = ?2"
                    ),
                    params![channel, channel_user_id],
                    |row| Ok(row_to_person(row)),
                )
                .optional()?;
            Ok(person)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a person by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Person>, MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let person = conn
                .query_row(
                    &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1"),
                    params![id],
                    |row| Ok(row_to_person(row)),
                )
                .optional()?;
            Ok(person)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a full person record (import path).
pub async fn insert(db: &Database, person: &Person) -> Result<(), MnemosError> {
    let p = person.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO persons \
                 (id, channel, channel_user_id, display_name, relationship_score, \
                  trust_override, capsule, capsule_updated_at_ms, public_style, \
                  concerns, goals, preferences, last_mood, curiosity, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    p.id,
                    p.channel,
                    p.channel_user_id,
                    p.display_name,
                    p.relationship_score,
                    p.trust_override.map(|t| t.as_str()),
                    p.capsule,
                    p.capsule_updated_at_ms,
                    p.public_style,
                    serde_json::to_string(&p.fields.concerns).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&p.fields.goals).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&p.fields.preferences).unwrap_or_else(|_| "[]".into()),
                    p.fields.last_mood,
                    serde_json::to_string(&p.fields.curiosity).unwrap_or_else(|_| "[]".into()),
                    p.created_at_ms
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Raise the relationship score. Negative deltas are ignored so the
/// score never decreases.
pub async fn bump_relationship(
    db: &Database,
    id: &str,
    delta: f64,
) -> Result<(), MnemosError> {
    if delta <= 0.0 {
        return Ok(());
    }
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE persons SET relationship_score = relationship_score + ?1 WHERE id = ?2",
                params![delta, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set or clear the manual trust-tier override.
pub async fn set_trust_override(
    db: &Database,
    id: &str,
    tier: Option<TrustTier>,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE persons SET trust_override = ?1 WHERE id = ?2",
                params![tier.map(|t| t.as_str()), id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the person capsule and stamp its update time.
pub async fn set_capsule(
    db: &Database,
    id: &str,
    capsule: &str,
    now_ms: i64,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    let capsule = capsule.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE persons SET capsule = ?1, capsule_updated_at_ms = ?2 WHERE id = ?3",
                params![capsule, now_ms, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the group-safe public style capsule.
pub async fn set_public_style(
    db: &Database,
    id: &str,
    style: &str,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    let style = style.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE persons SET public_style = ?1 WHERE id = ?2",
                params![style, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace all structured fields in one statement.
///
/// Whole-record replacement avoids lost-update races between turns
/// patching individual fields.
pub async fn replace_fields(
    db: &Database,
    id: &str,
    fields: &PersonFields,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    let fields = fields.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE persons SET concerns = ?1, goals = ?2, preferences = ?3, \
                 last_mood = ?4, curiosity = ?5 WHERE id = ?6",
                params![
                    serde_json::to_string(&fields.concerns).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&fields.goals).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&fields.preferences).unwrap_or_else(|_| "[]".into()),
                    fields.last_mood,
                    serde_json::to_string(&fields.curiosity).unwrap_or_else(|_| "[]".into()),
                    id
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List every person (export path).
pub async fn list_all(db: &Database) -> Result<Vec<Person>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PERSON_COLUMNS} FROM persons ORDER BY created_at_ms"
            ))?;
            let persons = stmt
                .query_map([], |row| Ok(row_to_person(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(persons)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a person and every dependent row in one transaction.
///
/// Vector rows and FTS entries go with the entities: vectors are
/// removed explicitly before their parent rows, and the FTS delete
/// triggers fire on the explicit fact/episode deletes. No orphaned
/// index rows may survive this call.
pub async fn delete_cascade(db: &Database, id: &str) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM fact_vectors WHERE fact_id IN \
                 (SELECT id FROM facts WHERE person_id = ?1)",
                params![id],
            )?;
            tx.execute("DELETE FROM facts WHERE person_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM episode_vectors WHERE episode_id IN \
                 (SELECT id FROM episodes WHERE person_id = ?1)",
                params![id],
            )?;
            tx.execute("DELETE FROM episodes WHERE person_id = ?1", params![id])?;
            tx.execute("DELETE FROM lessons WHERE person_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM dirty_public_styles WHERE person_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM persons WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

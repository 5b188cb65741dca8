// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group capsules and the dirty-marker lease tables.
//!
//! Dirty markers follow a claim/do-work/compare-and-clear lease:
//! claiming stamps eligible rows in one transaction so concurrent
//! workers cannot claim the same row, and clearing only succeeds when
//! no new dirt arrived after the claim was taken.

use mnemos_core::MnemosError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{DirtyMarker, GroupCapsule};

/// Which derived-content table a dirty marker lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyKind {
    /// Person public-style capsules, keyed by person id.
    PublicStyle,
    /// Group capsules, keyed by chat id.
    GroupCapsule,
}

impl DirtyKind {
    fn table(&self) -> &'static str {
        match self {
            DirtyKind::PublicStyle => "dirty_public_styles",
            DirtyKind::GroupCapsule => "dirty_group_capsules",
        }
    }

    fn key_column(&self) -> &'static str {
        match self {
            DirtyKind::PublicStyle => "person_id",
            DirtyKind::GroupCapsule => "chat_id",
        }
    }
}

/// Get the capsule for a group chat.
pub async fn get_group(
    db: &Database,
    chat_id: &str,
) -> Result<Option<GroupCapsule>, MnemosError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let capsule = conn
                .query_row(
                    "SELECT chat_id, capsule, updated_at_ms FROM group_capsules \
                     WHERE chat_id = ?1",
                    params![chat_id],
                    |row| {
                        Ok(GroupCapsule {
                            chat_id: row.get(0)?,
                            capsule: row.get(1)?,
                            updated_at_ms: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(capsule)
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert the capsule for a group chat.
pub async fn set_group(
    db: &Database,
    chat_id: &str,
    capsule: &str,
    now_ms: i64,
) -> Result<(), MnemosError> {
    let chat_id = chat_id.to_string();
    let capsule = capsule.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO group_capsules (chat_id, capsule, updated_at_ms) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(chat_id) DO UPDATE SET \
                     capsule = excluded.capsule, updated_at_ms = excluded.updated_at_ms",
                params![chat_id, capsule, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Every group capsule (export path).
pub async fn list_groups(db: &Database) -> Result<Vec<GroupCapsule>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare("SELECT chat_id, capsule, updated_at_ms FROM group_capsules")?;
            let capsules = stmt
                .query_map([], |row| {
                    Ok(GroupCapsule {
                        chat_id: row.get(0)?,
                        capsule: row.get(1)?,
                        updated_at_ms: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(capsules)
        })
        .await
        .map_err(map_tr_err)
}

/// Record that derived content for `key` is stale. First-dirty is kept
/// from the earliest report; last-dirty always advances.
pub async fn mark_dirty(
    db: &Database,
    kind: DirtyKind,
    key: &str,
    now_ms: i64,
) -> Result<(), MnemosError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} ({key_col}, dirty_first_at_ms, dirty_last_at_ms) \
                     VALUES (?1, ?2, ?2) \
                     ON CONFLICT({key_col}) DO UPDATE SET \
                         dirty_last_at_ms = excluded.dirty_last_at_ms",
                    table = kind.table(),
                    key_col = kind.key_column(),
                ),
                params![key, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` dirty rows for background processing.
///
/// Eligible rows are unclaimed, or carry a claim older than
/// `stale_before_ms` (an abandoned worker). Selection and stamping
/// happen in one transaction so two workers cannot claim the same row.
pub async fn claim_dirty(
    db: &Database,
    kind: DirtyKind,
    now_ms: i64,
    stale_before_ms: i64,
    limit: usize,
) -> Result<Vec<DirtyMarker>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let markers = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {key_col}, dirty_first_at_ms, dirty_last_at_ms, claimed_at_ms \
                     FROM {table} \
                     WHERE claimed_at_ms IS NULL OR claimed_at_ms < ?1 \
                     ORDER BY dirty_first_at_ms ASC LIMIT ?2",
                    table = kind.table(),
                    key_col = kind.key_column(),
                ))?;
                stmt.query_map(params![stale_before_ms, limit as i64], |row| {
                    Ok(DirtyMarker {
                        key: row.get(0)?,
                        dirty_first_at_ms: row.get(1)?,
                        dirty_last_at_ms: row.get(2)?,
                        claimed_at_ms: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            };
            for marker in &markers {
                tx.execute(
                    &format!(
                        "UPDATE {table} SET claimed_at_ms = ?1 WHERE {key_col} = ?2",
                        table = kind.table(),
                        key_col = kind.key_column(),
                    ),
                    params![now_ms, marker.key],
                )?;
            }
            tx.commit()?;
            Ok(markers
                .into_iter()
                .map(|m| DirtyMarker {
                    claimed_at_ms: Some(now_ms),
                    ..m
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-clear: delete the marker only if no new dirt arrived
/// after `seen_last_at_ms`. Returns true when the marker was cleared;
/// false means the row stayed dirty and its claim was released for the
/// next pass.
pub async fn clear_if_clean(
    db: &Database,
    kind: DirtyKind,
    key: &str,
    seen_last_at_ms: i64,
) -> Result<bool, MnemosError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let cleared = conn.execute(
                &format!(
                    "DELETE FROM {table} WHERE {key_col} = ?1 AND dirty_last_at_ms <= ?2",
                    table = kind.table(),
                    key_col = kind.key_column(),
                ),
                params![key, seen_last_at_ms],
            )?;
            if cleared == 0 {
                conn.execute(
                    &format!(
                        "UPDATE {table} SET claimed_at_ms = NULL WHERE {key_col} = ?1",
                        table = kind.table(),
                        key_col = kind.key_column(),
                    ),
                    params![key],
                )?;
            }
            Ok(cleared > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Release a claim without clearing (worker failed mid-regeneration).
pub async fn release_claim(
    db: &Database,
    kind: DirtyKind,
    key: &str,
) -> Result<(), MnemosError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE {table} SET claimed_at_ms = NULL WHERE {key_col} = ?1",
                    table = kind.table(),
                    key_col = kind.key_column(),
                ),
                params![key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episode logging, extraction bookkeeping, and lexical search.

use mnemos_core::MnemosError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Episode;
use crate::search::{blob_to_vec, fts_query, vec_to_blob};

const EPISODE_COLUMNS: &str =
    "id, chat_id, person_id, content, created_at_ms, last_extracted_at_ms";

fn row_to_episode(row: &rusqlite::Row) -> Episode {
    Episode {
        id: row.get(0).unwrap_or_default(),
        chat_id: row.get(1).unwrap_or_default(),
        person_id: row.get(2).unwrap_or(None),
        content: row.get(3).unwrap_or_default(),
        created_at_ms: row.get(4).unwrap_or(0),
        last_extracted_at_ms: row.get(5).unwrap_or(None),
    }
}

/// Insert an episode, optionally with its embedding vector, atomically.
pub async fn insert(
    db: &Database,
    episode: &Episode,
    embedding: Option<Vec<f32>>,
) -> Result<(), MnemosError> {
    let episode = episode.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO episodes \
                 (id, chat_id, person_id, content, created_at_ms, last_extracted_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    episode.id,
                    episode.chat_id,
                    episode.person_id,
                    episode.content,
                    episode.created_at_ms,
                    episode.last_extracted_at_ms
                ],
            )?;
            if let Some(vec) = embedding {
                tx.execute(
                    "INSERT OR REPLACE INTO episode_vectors (episode_id, embedding) \
                     VALUES (?1, ?2)",
                    params![episode.id, vec_to_blob(&vec)],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp an episode as extracted. The only mutation episodes see.
pub async fn mark_extracted(
    db: &Database,
    id: &str,
    now_ms: i64,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE episodes SET last_extracted_at_ms = ?1 WHERE id = ?2",
                params![now_ms, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Episodes the extraction pipeline still owes a pass: never stamped,
/// or stamped before their own creation (re-imported rows).
pub async fn list_needing_extraction(
    db: &Database,
    limit: usize,
) -> Result<Vec<Episode>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EPISODE_COLUMNS} FROM episodes \
                 WHERE last_extracted_at_ms IS NULL \
                    OR last_extracted_at_ms < created_at_ms \
                 ORDER BY created_at_ms ASC LIMIT ?1"
            ))?;
            let episodes = stmt
                .query_map(params![limit as i64], |row| Ok(row_to_episode(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(episodes)
        })
        .await
        .map_err(map_tr_err)
}

/// Episodes for one chat newer than `since_ms`, newest first.
pub async fn recent_for_chat(
    db: &Database,
    chat_id: &str,
    since_ms: i64,
    limit: usize,
) -> Result<Vec<Episode>, MnemosError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EPISODE_COLUMNS} FROM episodes \
                 WHERE chat_id = ?1 AND created_at_ms >= ?2 \
                 ORDER BY created_at_ms DESC LIMIT ?3"
            ))?;
            let episodes = stmt
                .query_map(params![chat_id, since_ms, limit as i64], |row| {
                    Ok(row_to_episode(row))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(episodes)
        })
        .await
        .map_err(map_tr_err)
}

/// Every episode (export path).
pub async fn list_all(db: &Database) -> Result<Vec<Episode>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EPISODE_COLUMNS} FROM episodes ORDER BY created_at_ms"
            ))?;
            let episodes = stmt
                .query_map([], |row| Ok(row_to_episode(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(episodes)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch retrieval of episodes by id (post-fusion).
pub async fn by_ids(db: &Database, ids: &[String]) -> Result<Vec<Episode>, MnemosError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {EPISODE_COLUMNS} FROM episodes WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let episodes = stmt
                .query_map(params.as_slice(), |row| Ok(row_to_episode(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(episodes)
        })
        .await
        .map_err(map_tr_err)
}

/// BM25 keyword search over episodes via FTS5.
pub async fn search_lexical(
    db: &Database,
    query: &str,
    limit: usize,
) -> Result<Vec<(String, f64)>, MnemosError> {
    let Some(match_expr) = fts_query(query) else {
        return Ok(vec![]);
    };
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, bm25(episodes_fts) AS score \
                 FROM episodes_fts JOIN episodes e ON e.rowid = episodes_fts.rowid \
                 WHERE episodes_fts MATCH ?1 \
                 ORDER BY bm25(episodes_fts) LIMIT ?2",
            )?;
            let results = stmt
                .query_map(params![match_expr, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await
        .map_err(map_tr_err)
}

/// All episode embeddings for in-process vector search.
pub async fn all_vectors(db: &Database) -> Result<Vec<(String, Vec<f32>)>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT episode_id, embedding FROM episode_vectors")?;
            let results = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((id, blob_to_vec(&blob)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await
        .map_err(map_tr_err)
}

/// Created-at timestamps for a set of episodes (recency tie-breaks).
pub async fn created_at_map(
    db: &Database,
    ids: &[String],
) -> Result<Vec<(String, i64)>, MnemosError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT id, created_at_ms FROM episodes WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

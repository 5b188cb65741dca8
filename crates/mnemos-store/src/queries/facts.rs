// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fact CRUD, lexical search, vector rows, and transactional
//! reconciliation apply.

use mnemos_core::types::FactCategory;
use mnemos_core::MnemosError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Fact;
use crate::search::{blob_to_vec, fts_query, vec_to_blob};

const FACT_COLUMNS: &str = "id, person_id, subject, content, category, evidence_quote, \
     is_current, last_accessed_at_ms, created_at_ms";

fn row_to_fact(row: &rusqlite::Row) -> Fact {
    let category: String = row.get(4).unwrap_or_default();
    Fact {
        id: row.get(0).unwrap_or_default(),
        person_id: row.get(1).unwrap_or(None),
        subject: row.get(2).unwrap_or_default(),
        content: row.get(3).unwrap_or_default(),
        category: FactCategory::from_str_value(&category),
        evidence_quote: row.get(5).unwrap_or_default(),
        is_current: row.get::<_, i64>(6).unwrap_or(1) != 0,
        last_accessed_at_ms: row.get(7).unwrap_or(0),
        created_at_ms: row.get(8).unwrap_or(0),
    }
}

fn insert_fact_stmt(conn: &rusqlite::Connection, fact: &Fact) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO facts \
         (id, person_id, subject, content, category, evidence_quote, \
          is_current, last_accessed_at_ms, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            fact.id,
            fact.person_id,
            fact.subject,
            fact.content,
            fact.category.as_str(),
            fact.evidence_quote,
            fact.is_current as i64,
            fact.last_accessed_at_ms,
            fact.created_at_ms
        ],
    )?;
    Ok(())
}

/// Insert a fact, optionally with its embedding vector, atomically.
pub async fn insert(
    db: &Database,
    fact: &Fact,
    embedding: Option<Vec<f32>>,
) -> Result<(), MnemosError> {
    let fact = fact.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            insert_fact_stmt(&tx, &fact)?;
            if let Some(vec) = embedding {
                tx.execute(
                    "INSERT OR REPLACE INTO fact_vectors (fact_id, embedding) VALUES (?1, ?2)",
                    params![fact.id, vec_to_blob(&vec)],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Rewrite a fact's content in place (direct correction path).
pub async fn update_content(
    db: &Database,
    id: &str,
    content: &str,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE facts SET content = ?1 WHERE id = ?2",
                params![content, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Retire a fact: mark not-current rather than mutating it.
pub async fn retire(db: &Database, id: &str) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE facts SET is_current = 0 WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Hard-delete a fact and its vector row (reconciliation delete).
pub async fn remove(db: &Database, id: &str) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM fact_vectors WHERE fact_id = ?1", params![id])?;
            tx.execute("DELETE FROM facts WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Current facts for one person, newest first.
pub async fn list_current_for_person(
    db: &Database,
    person_id: &str,
) -> Result<Vec<Fact>, MnemosError> {
    let person_id = person_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts \
                 WHERE person_id = ?1 AND is_current = 1 \
                 ORDER BY created_at_ms DESC"
            ))?;
            let facts = stmt
                .query_map(params![person_id], |row| Ok(row_to_fact(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(facts)
        })
        .await
        .map_err(map_tr_err)
}

/// Every current fact (consolidation scans).
pub async fn list_all_current(db: &Database) -> Result<Vec<Fact>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE is_current = 1 \
                 ORDER BY created_at_ms DESC"
            ))?;
            let facts = stmt
                .query_map([], |row| Ok(row_to_fact(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(facts)
        })
        .await
        .map_err(map_tr_err)
}

/// Current person-independent facts, newest first.
pub async fn list_current_unowned(db: &Database) -> Result<Vec<Fact>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts \
                 WHERE person_id IS NULL AND is_current = 1 \
                 ORDER BY created_at_ms DESC"
            ))?;
            let facts = stmt
                .query_map([], |row| Ok(row_to_fact(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(facts)
        })
        .await
        .map_err(map_tr_err)
}

/// Every fact, current or retired (export path).
pub async fn list_all(db: &Database) -> Result<Vec<Fact>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FACT_COLUMNS} FROM facts ORDER BY created_at_ms"
            ))?;
            let facts = stmt
                .query_map([], |row| Ok(row_to_fact(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(facts)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch retrieval of current facts by id (post-fusion).
pub async fn by_ids(db: &Database, ids: &[String]) -> Result<Vec<Fact>, MnemosError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE id IN ({}) AND is_current = 1",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let facts = stmt
                .query_map(params.as_slice(), |row| Ok(row_to_fact(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(facts)
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp last-accessed on the given facts without altering content.
pub async fn touch(db: &Database, ids: &[String], now_ms: i64) -> Result<(), MnemosError> {
    if ids.is_empty() {
        return Ok(());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for id in &ids {
                tx.execute(
                    "UPDATE facts SET last_accessed_at_ms = ?1 WHERE id = ?2",
                    params![now_ms, id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// BM25 keyword search over current facts via FTS5.
///
/// Returns (fact_id, bm25_score) most-relevant first. Free text is
/// sanitized into a quoted OR query; text with no searchable tokens
/// yields no results.
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
                "SELECT f.id, bm25(facts_fts) AS score \
                 FROM facts_fts JOIN facts f ON f.rowid = facts_fts.rowid \
                 WHERE facts_fts MATCH ?1 AND f.is_current = 1 \
                 ORDER BY bm25(facts_fts) LIMIT ?2",
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

/// All current fact embeddings for in-process vector search.
pub async fn current_vectors(db: &Database) -> Result<Vec<(String, Vec<f32>)>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT v.fact_id, v.embedding FROM fact_vectors v \
                 JOIN facts f ON f.id = v.fact_id WHERE f.is_current = 1",
            )?;
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

/// Created-at timestamps for a set of facts (recency tie-breaks).
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
                "SELECT id, created_at_ms FROM facts WHERE id IN ({})",
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

/// Apply one reconciliation batch in a single transaction: inserts
/// (with optional vectors), in-place content updates, and deletes.
/// Either every row-level change commits or none do.
pub async fn apply_reconciliation(
    db: &Database,
    inserts: Vec<(Fact, Option<Vec<f32>>)>,
    updates: Vec<(String, String)>,
    deletes: Vec<String>,
) -> Result<(), MnemosError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for id in &deletes {
                tx.execute("DELETE FROM fact_vectors WHERE fact_id = ?1", params![id])?;
                tx.execute("DELETE FROM facts WHERE id = ?1", params![id])?;
            }
            for (id, content) in &updates {
                tx.execute(
                    "UPDATE facts SET content = ?1 WHERE id = ?2",
                    params![content, id],
                )?;
            }
            for (fact, embedding) in &inserts {
                insert_fact_stmt(&tx, fact)?;
                if let Some(vec) = embedding {
                    tx.execute(
                        "INSERT OR REPLACE INTO fact_vectors (fact_id, embedding) \
                         VALUES (?1, ?2)",
                        params![fact.id, vec_to_blob(vec)],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

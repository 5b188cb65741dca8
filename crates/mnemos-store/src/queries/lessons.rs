// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lesson reads and the promotion flag, the one mutation this
//! subsystem performs on lessons.

use mnemos_core::MnemosError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Lesson;

const LESSON_COLUMNS: &str = "id, person_id, category, rule, confidence, \
     validation_count, violation_count, promoted, created_at_ms";

fn row_to_lesson(row: &rusqlite::Row) -> Lesson {
    Lesson {
        id: row.get(0).unwrap_or_default(),
        person_id: row.get(1).unwrap_or(None),
        category: row.get(2).unwrap_or_default(),
        rule: row.get(3).unwrap_or_default(),
        confidence: row.get(4).unwrap_or(0.5),
        validation_count: row.get(5).unwrap_or(0),
        violation_count: row.get(6).unwrap_or(0),
        promoted: row.get::<_, i64>(7).unwrap_or(0) != 0,
        created_at_ms: row.get(8).unwrap_or(0),
    }
}

/// Insert a lesson (import path and feedback producers).
pub async fn insert(db: &Database, lesson: &Lesson) -> Result<(), MnemosError> {
    let lesson = lesson.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO lessons \
                 (id, person_id, category, rule, confidence, validation_count, \
                  violation_count, promoted, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    lesson.id,
                    lesson.person_id,
                    lesson.category,
                    lesson.rule,
                    lesson.confidence,
                    lesson.validation_count,
                    lesson.violation_count,
                    lesson.promoted as i64,
                    lesson.created_at_ms
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Person-independent operating rules, highest confidence first.
/// These feed the behavior-insights section.
pub async fn list_global(db: &Database, limit: usize) -> Result<Vec<Lesson>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LESSON_COLUMNS} FROM lessons WHERE person_id IS NULL \
                 ORDER BY confidence DESC, created_at_ms DESC LIMIT ?1"
            ))?;
            let lessons = stmt
                .query_map(params![limit as i64], |row| Ok(row_to_lesson(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lessons)
        })
        .await
        .map_err(map_tr_err)
}

/// Lessons owned by one person, highest confidence first.
pub async fn list_for_person(
    db: &Database,
    person_id: &str,
) -> Result<Vec<Lesson>, MnemosError> {
    let person_id = person_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LESSON_COLUMNS} FROM lessons WHERE person_id = ?1 \
                 ORDER BY confidence DESC, created_at_ms DESC"
            ))?;
            let lessons = stmt
                .query_map(params![person_id], |row| Ok(row_to_lesson(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lessons)
        })
        .await
        .map_err(map_tr_err)
}

/// Every lesson (export path).
pub async fn list_all(db: &Database) -> Result<Vec<Lesson>, MnemosError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LESSON_COLUMNS} FROM lessons ORDER BY created_at_ms"
            ))?;
            let lessons = stmt
                .query_map([], |row| Ok(row_to_lesson(row)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lessons)
        })
        .await
        .map_err(map_tr_err)
}

/// Flip the promotion flag once a lesson has proven itself.
pub async fn set_promoted(
    db: &Database,
    id: &str,
    promoted: bool,
) -> Result<(), MnemosError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE lessons SET promoted = ?1 WHERE id = ?2",
                params![promoted as i64, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

use async_trait::async_trait;
use chrono::Utc;
use learn_core::SubjectRef;
use learn_core::model::{LessonId, ProgressPatch, ProgressRecord, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    db_err, id_i64, lesson_id_from_i64, map_progress_row, parse_confidence, ser,
    subject_id_from_i64, u32_from_i64,
};
use crate::repository::{CompletedProgressRow, ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn fetch_completed_progress(
        &self,
        user: UserId,
    ) -> Result<Vec<CompletedProgressRow>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                p.lesson_id, p.completed, p.note, p.confidence,
                l.xp_value, s.id AS subject_id, s.name AS subject_name
            FROM lesson_progress p
            LEFT JOIN lessons l ON l.id = p.lesson_id
            LEFT JOIN units u ON u.id = l.unit_id
            LEFT JOIN subjects s ON s.id = u.subject_id
            WHERE p.user_id = ?1 AND p.completed = 1
            ORDER BY p.lesson_id ASC
            ",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let subject_id: Option<i64> = row.try_get("subject_id").map_err(ser)?;
            let subject_name: Option<String> = row.try_get("subject_name").map_err(ser)?;
            let subject = match (subject_id, subject_name) {
                (Some(id), Some(name)) => Some(SubjectRef::new(subject_id_from_i64(id)?, name)),
                _ => None,
            };

            out.push(CompletedProgressRow {
                lesson_id: lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
                completed: row.try_get::<bool, _>("completed").map_err(ser)?,
                note: row.try_get("note").map_err(ser)?,
                confidence: parse_confidence(row.try_get("confidence").map_err(ser)?)?,
                xp_value: row
                    .try_get::<Option<i64>, _>("xp_value")
                    .map_err(ser)?
                    .map(|xp| u32_from_i64("xp_value", xp))
                    .transpose()?,
                subject,
            });
        }
        Ok(out)
    }

    async fn list_progress(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        if lessons.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT user_id, lesson_id, completed, confidence, note
            FROM lesson_progress
            WHERE user_id = ?1 AND lesson_id IN (
            ",
        );
        for i in 0..lessons.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\nORDER BY lesson_id ASC");

        let mut q = sqlx::query(&sql).bind(user.as_uuid());
        for lesson in lessons {
            q = q.bind(id_i64("lesson_id", lesson.value())?);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(map_progress_row).collect()
    }

    async fn upsert_progress(
        &self,
        user: UserId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        // Absent fields keep their stored value on conflict and take the
        // column default on insert.
        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, lesson_id, completed, confidence, note, updated_at)
            VALUES (?1, ?2, COALESCE(?3, 0), ?4, ?5, ?6)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                completed = CASE WHEN ?7 THEN excluded.completed ELSE lesson_progress.completed END,
                confidence = CASE WHEN ?8 THEN excluded.confidence ELSE lesson_progress.confidence END,
                note = CASE WHEN ?9 THEN excluded.note ELSE lesson_progress.note END,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_uuid())
        .bind(id_i64("lesson_id", lesson.value())?)
        .bind(patch.completed)
        .bind(patch.confidence.flatten().map(|c| c.as_str()))
        .bind(patch.note.clone().flatten())
        .bind(Utc::now())
        .bind(patch.completed.is_some())
        .bind(patch.confidence.is_some())
        .bind(patch.note.is_some())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

use async_trait::async_trait;
use learn_core::model::{
    AchievementDefinition, AchievementId, LessonId, LessonRecord, SubjectId, SubjectRecord, UnitId,
    UnitRecord,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    db_err, id_i64, map_lesson_row, map_unit_row, parse_achievement_id, ser, subject_id_from_i64,
};
use crate::repository::{CatalogRepository, StorageError};

fn map_subject_row(row: &SqliteRow) -> Result<SubjectRecord, StorageError> {
    SubjectRecord::new(
        subject_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
    )
    .map_err(ser)
}

#[async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_subject(&self, subject: &SubjectRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            ",
        )
        .bind(id_i64("subject_id", subject.id.value())?)
        .bind(&subject.name)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_unit(&self, unit: &UnitRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO units (id, subject_id, title, sort_order, linked_achievement_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                title = excluded.title,
                sort_order = excluded.sort_order,
                linked_achievement_id = excluded.linked_achievement_id
            ",
        )
        .bind(id_i64("unit_id", unit.id.value())?)
        .bind(
            unit.subject_id
                .map(|s| id_i64("subject_id", s.value()))
                .transpose()?,
        )
        .bind(&unit.title)
        .bind(i64::from(unit.order))
        .bind(unit.linked_achievement.as_ref().map(AchievementId::as_str))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (id, unit_id, title, xp_value, sort_order)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                unit_id = excluded.unit_id,
                title = excluded.title,
                xp_value = excluded.xp_value,
                sort_order = excluded.sort_order
            ",
        )
        .bind(id_i64("lesson_id", lesson.id.value())?)
        .bind(id_i64("unit_id", lesson.unit_id.value())?)
        .bind(&lesson.title)
        .bind(lesson.xp_value.map(i64::from))
        .bind(i64::from(lesson.order))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_achievement(
        &self,
        achievement: &AchievementDefinition,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO achievements (id, title, description) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            ",
        )
        .bind(achievement.id.as_str())
        .bind(&achievement.title)
        .bind(achievement.description.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<SubjectRecord>, StorageError> {
        let row = sqlx::query("SELECT id, name FROM subjects WHERE id = ?1")
            .bind(id_i64("subject_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_subject_row).transpose()
    }

    async fn list_subjects(&self) -> Result<Vec<SubjectRecord>, StorageError> {
        let rows = sqlx::query("SELECT id, name FROM subjects ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_subject_row).collect()
    }

    async fn list_subject_units(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<UnitRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, subject_id, title, sort_order, linked_achievement_id
            FROM units
            WHERE subject_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_i64("subject_id", subject.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_unit_row).collect()
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<UnitRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, subject_id, title, sort_order, linked_achievement_id
            FROM units WHERE id = ?1
            ",
        )
        .bind(id_i64("unit_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_unit_row).transpose()
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, unit_id, title, xp_value, sort_order
            FROM lessons WHERE id = ?1
            ",
        )
        .bind(id_i64("lesson_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn list_unit_lessons(&self, unit: UnitId) -> Result<Vec<LessonRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, unit_id, title, xp_value, sort_order
            FROM lessons
            WHERE unit_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_i64("unit_id", unit.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_lesson_row).collect()
    }

    async fn get_unit_lesson_count(&self, unit: UnitId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE unit_id = ?1")
            .bind(id_i64("unit_id", unit.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        u64::try_from(count).map_err(ser)
    }

    async fn get_achievement(
        &self,
        id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, StorageError> {
        let row = sqlx::query("SELECT id, title, description FROM achievements WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        AchievementDefinition::new(
            parse_achievement_id(row.try_get::<String, _>("id").map_err(ser)?)?,
            row.try_get::<String, _>("title").map_err(ser)?,
            row.try_get::<Option<String>, _>("description").map_err(ser)?,
        )
        .map(Some)
        .map_err(ser)
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(id_i64("lesson_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

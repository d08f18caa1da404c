use async_trait::async_trait;
use learn_core::model::{AchievementId, AchievementUnlock, UnitId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, parse_achievement_id, ser};
use crate::repository::{AchievementRepository, StorageError, UnlockInsert};

fn count_u64(count: i64) -> Result<u64, StorageError> {
    u64::try_from(count).map_err(ser)
}

#[async_trait]
impl AchievementRepository for SqliteRepository {
    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lesson_progress WHERE user_id = ?1 AND completed = 1",
        )
        .bind(user.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        count_u64(count)
    }

    async fn count_completed_in_unit(
        &self,
        user: UserId,
        unit: UnitId,
    ) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM lesson_progress p
            JOIN lessons l ON l.id = p.lesson_id
            WHERE p.user_id = ?1 AND p.completed = 1 AND l.unit_id = ?2
            ",
        )
        .bind(user.as_uuid())
        .bind(id_i64("unit_id", unit.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        count_u64(count)
    }

    async fn has_unlock(&self, user: UserId, id: &AchievementId) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM user_achievements WHERE user_id = ?1 AND achievement_id = ?2",
        )
        .bind(user.as_uuid())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn insert_unlock_if_absent(
        &self,
        unlock: &AchievementUnlock,
    ) -> Result<UnlockInsert, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, achievement_id) DO NOTHING
            ",
        )
        .bind(unlock.user_id.as_uuid())
        .bind(unlock.achievement_id.as_str())
        .bind(unlock.unlocked_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            Ok(UnlockInsert::AlreadyExists)
        } else {
            Ok(UnlockInsert::Created)
        }
    }

    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT achievement_id, unlocked_at
            FROM user_achievements
            WHERE user_id = ?1
            ORDER BY unlocked_at ASC, id ASC
            ",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut unlocks = Vec::with_capacity(rows.len());
        for row in rows {
            unlocks.push(AchievementUnlock {
                user_id: user,
                achievement_id: parse_achievement_id(
                    row.try_get::<String, _>("achievement_id").map_err(ser)?,
                )?,
                unlocked_at: row.try_get("unlocked_at").map_err(ser)?,
            });
        }
        Ok(unlocks)
    }
}

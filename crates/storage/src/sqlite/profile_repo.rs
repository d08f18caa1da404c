use async_trait::async_trait;
use learn_core::model::{Profile, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db_err, ser};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError> {
        let row = sqlx::query(
            "SELECT username, full_name, is_admin FROM profiles WHERE user_id = ?1",
        )
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Profile {
            user_id: user,
            username: row.try_get("username").map_err(ser)?,
            full_name: row.try_get("full_name").map_err(ser)?,
            is_admin: row.try_get::<bool, _>("is_admin").map_err(ser)?,
        }))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO profiles (user_id, username, full_name, is_admin)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                full_name = excluded.full_name,
                is_admin = excluded.is_admin
            ",
        )
        .bind(profile.user_id.as_uuid())
        .bind(profile.username.as_deref())
        .bind(profile.full_name.as_deref())
        .bind(profile.is_admin)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

use learn_core::model::{
    AchievementId, Confidence, LessonId, LessonRecord, ProgressRecord, SubjectId, UnitId,
    UnitRecord, UserId,
};
use sqlx::Row;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Constraint violations become `Conflict`; everything else is treated as a
/// connection-level failure.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match e.as_database_error().map(|d| d.kind()) {
        Some(ErrorKind::UniqueViolation | ErrorKind::ForeignKeyViolation) => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn unit_id_from_i64(v: i64) -> Result<UnitId, StorageError> {
    Ok(UnitId::new(i64_to_u64("unit_id", v)?))
}

pub(crate) fn subject_id_from_i64(v: i64) -> Result<SubjectId, StorageError> {
    Ok(SubjectId::new(i64_to_u64("subject_id", v)?))
}

pub(crate) fn parse_confidence(raw: Option<String>) -> Result<Option<Confidence>, StorageError> {
    raw.map(|s| s.parse::<Confidence>().map_err(ser)).transpose()
}

pub(crate) fn parse_achievement_id(raw: String) -> Result<AchievementId, StorageError> {
    AchievementId::new(raw).map_err(ser)
}

pub(crate) fn map_unit_row(row: &SqliteRow) -> Result<UnitRecord, StorageError> {
    let mut unit = UnitRecord::new(
        unit_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<Option<i64>, _>("subject_id")
            .map_err(ser)?
            .map(subject_id_from_i64)
            .transpose()?,
        row.try_get::<String, _>("title").map_err(ser)?,
        u32_from_i64("order", row.try_get::<i64, _>("sort_order").map_err(ser)?)?,
    )
    .map_err(ser)?;
    unit.linked_achievement = row
        .try_get::<Option<String>, _>("linked_achievement_id")
        .map_err(ser)?
        .map(parse_achievement_id)
        .transpose()?;
    Ok(unit)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<LessonRecord, StorageError> {
    LessonRecord::new(
        lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        unit_id_from_i64(row.try_get::<i64, _>("unit_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<i64>, _>("xp_value")
            .map_err(ser)?
            .map(|xp| u32_from_i64("xp_value", xp))
            .transpose()?,
        u32_from_i64("order", row.try_get::<i64, _>("sort_order").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    Ok(ProgressRecord {
        user_id: UserId::new(row.try_get("user_id").map_err(ser)?),
        lesson_id: lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        completed: row.try_get::<bool, _>("completed").map_err(ser)?,
        confidence: parse_confidence(row.try_get("confidence").map_err(ser)?)?,
        note: row.try_get("note").map_err(ser)?,
    })
}

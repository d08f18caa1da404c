use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use crate::repository::{
    AchievementRepository, CatalogRepository, ProfileRepository, ProgressRepository, Storage,
};

mod achievement_repo;
mod catalog_repo;
mod mapping;
mod migrate;
mod profile_repo;
mod progress_repo;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const FILE_PRAGMAS: &[&str] = &[
    "PRAGMA foreign_keys = ON;",
    "PRAGMA journal_mode = WAL;",
    "PRAGMA busy_timeout = 5000;",
];
// WAL has no effect on memory databases
const MEMORY_PRAGMAS: &[&str] = &["PRAGMA foreign_keys = ON;", "PRAGMA busy_timeout = 5000;"];

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Progress, catalog, achievement and profile tables behind one pool.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Opens a pool on `database_url`. Every connection gets foreign keys and
    /// a busy timeout; file databases also switch to WAL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or a
    /// pragma fails.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let in_memory = is_in_memory(database_url);
        let pragmas = if in_memory { MEMORY_PRAGMAS } else { FILE_PRAGMAS };

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    for pragma in pragmas {
                        sqlx::query(pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        info!(url = %database_url, in_memory, "sqlite pool ready");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Hands one `SQLite` repository out behind every repository trait.
    #[must_use]
    pub fn from_sqlite(repo: SqliteRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let achievements: Arc<dyn AchievementRepository> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo);
        Self {
            progress,
            catalog,
            achievements,
            profiles,
        }
    }

    /// Connects, migrates and wraps the result with [`Storage::from_sqlite`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connecting or migrating fails.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        Ok(Self::from_sqlite(repo))
    }
}

pub mod models;
pub mod types;

use std::ops::Deref;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

pub type DatabaseConnection = sqlx::SqliteConnection;

impl Database {
    /// Connect to the database named by `database_url` and bring the schema
    /// up to date.
    pub async fn connect(database_url: &url::Url) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() == "sqlite" {
            // A shared pool against :memory: would hand every connection its
            // own database; route that case through the capped constructor.
            if database_url.path() == ":memory:" {
                return Self::memory().await;
            }

            let options = SqliteConnectOptions::from_str(database_url.as_str())
                .map_err(DatabaseSetupError::Unavailable)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .map_err(DatabaseSetupError::Unavailable)?;

            let db = Database::new(pool);
            db.migrate().await?;
            return Ok(db);
        }

        Err(DatabaseSetupError::UnknownDbType(
            database_url.scheme().to_string(),
        ))
    }

    /// Create an in-memory database, migrated and ready to use.
    ///
    /// The pool is capped at one connection; separate connections to
    /// `:memory:` would each see their own empty database.
    pub async fn memory() -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(DatabaseSetupError::Unavailable)?;

        let db = Database::new(pool);
        db.migrate().await?;
        Ok(db)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    async fn migrate(&self) -> Result<(), DatabaseSetupError> {
        sqlx::migrate!("./migrations")
            .run(&self.0)
            .await
            .map_err(DatabaseSetupError::MigrationFailed)
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),
}

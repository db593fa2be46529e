use sqlx::{
    Sqlite, SqlitePool,
    migrate::{MigrateDatabase, Migrator},
    sqlite::SqlitePoolOptions,
};
use std::{
    path::PathBuf,
    sync::LazyLock,
    time::Duration,
};
use thiserror::Error;

pub mod conversation_summaries;
pub mod messages;
pub mod users;
pub mod utils;

pub static MIGRATOR: LazyLock<Migrator> = LazyLock::new(|| sqlx::migrate!("./db_migrations"));

const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: SqlitePool,
    pub path: PathBuf,
}

impl Database {
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}", db_path.display());

        tracing::debug!(
            target: "marketplace_messaging::database::new",
            "Checking if DB exists...{:?}",
            db_url
        );
        match Sqlite::database_exists(&db_url).await {
            Ok(true) => {
                tracing::debug!(target: "marketplace_messaging::database::new", "DB exists");
            }
            Ok(false) => {
                tracing::debug!(
                    target: "marketplace_messaging::database::new",
                    "DB does not exist, creating..."
                );
                Sqlite::create_database(&db_url).await.map_err(|e| {
                    tracing::error!(
                        target: "marketplace_messaging::database::new",
                        "Error creating DB: {:?}",
                        e
                    );
                    DatabaseError::Sqlx(e)
                })?;
            }
            Err(e) => {
                tracing::warn!(
                    target: "marketplace_messaging::database::new",
                    "Could not check if database exists: {:?}, attempting to create",
                    e
                );
                Sqlite::create_database(&db_url).await?;
            }
        }

        let pool = Self::create_connection_pool(&db_url).await?;
        let database = Self {
            pool,
            path: db_path,
        };
        database.migrate_up().await?;

        Ok(database)
    }

    /// Creates and configures a SQLite connection pool
    async fn create_connection_pool(db_url: &str) -> Result<SqlitePool, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .max_connections(DB_MAX_CONNECTIONS)
            .after_connect(|conn, _| {
                Box::pin(async move {
                    let conn = &mut *conn;
                    sqlx::query("PRAGMA journal_mode=WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(&format!("PRAGMA busy_timeout={DB_BUSY_TIMEOUT_MS}"))
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("{db_url}?mode=rwc"))
            .await?;
        Ok(pool)
    }

    /// Runs all pending database migrations
    ///
    /// Idempotent: only migrations that have not been applied yet are run.
    pub async fn migrate_up(&self) -> Result<(), DatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Deletes all data by dropping every table and re-running the migrations.
    pub async fn delete_all_data(&self) -> Result<(), DatabaseError> {
        let mut txn = self.pool.begin().await?;

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *txn)
            .await?;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type='table'
             AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *txn)
        .await?;

        for (table_name,) in tables {
            let drop_query = format!("DROP TABLE IF EXISTS {}", table_name);
            sqlx::query(&drop_query).execute(&mut *txn).await?;
        }

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;

        self.migrate_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path)
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }

    async fn table_exists(db: &Database, name: &str) -> bool {
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
            .bind(name)
            .fetch_optional(&db.pool)
            .await
            .expect("Failed to query sqlite_master")
            .is_some()
    }

    #[tokio::test]
    async fn test_database_creation_with_nested_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("nested").join("path").join("test.db");

        let db = Database::new(db_path.clone()).await.unwrap();
        assert_eq!(db.path, db_path);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_database_migrations_applied() {
        let (db, _temp_dir) = create_test_db().await;

        assert!(table_exists(&db, "users").await);
        assert!(table_exists(&db, "messages").await);
        assert!(table_exists(&db, "conversation_summaries").await);
    }

    #[tokio::test]
    async fn test_database_pragma_settings() {
        let (db, _temp_dir) = create_test_db().await;

        let foreign_keys: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys.0, 1);

        let journal_mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(journal_mode.0.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_migrate_up_is_idempotent() {
        let (db, _temp_dir) = create_test_db().await;
        db.migrate_up().await.unwrap();
        db.migrate_up().await.unwrap();
        assert!(table_exists(&db, "messages").await);
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let (db, _temp_dir) = create_test_db().await;

        sqlx::query(
            "INSERT INTO users (id, created_at, updated_at) VALUES ('u1', 0, 0), ('u2', 0, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
             VALUES ('m1', 'u1', 'u2', 'merhaba', 1)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        db.delete_all_data().await.unwrap();

        let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(user_count.0, 0);

        let message_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(message_count.0, 0);

        // Schema is recreated
        assert!(table_exists(&db, "conversation_summaries").await);
    }

    #[tokio::test]
    async fn test_messages_table_rejects_self_messages() {
        let (db, _temp_dir) = create_test_db().await;

        let result = sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
             VALUES ('m1', 'u1', 'u1', 'hello', 1)",
        )
        .execute(&db.pool)
        .await;

        assert!(result.is_err());
    }
}

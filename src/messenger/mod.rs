use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

pub mod conversation_aggregator;
pub mod conversations;
pub mod database;
pub mod error;
pub mod messages;
pub mod sessions;
pub mod users;

use crate::init_tracing;
use conversation_aggregator::{AggregatorConfig, ConversationAggregator};
use database::Database;
use error::{MessengerError, Result};

const DATA_DIR_ENV: &str = "MESSENGER_DATA_DIR";
const LOGS_DIR_ENV: &str = "MESSENGER_LOGS_DIR";
const DATABASE_FILE: &str = "messenger.sqlite";

#[derive(Clone, Debug)]
pub struct MessengerConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Configuration for the conversation aggregator
    pub aggregator_config: Option<AggregatorConfig>,
}

impl MessengerConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            data_dir: data_dir.join(env_suffix),
            logs_dir: logs_dir.join(env_suffix),
            aggregator_config: None,
        }
    }

    /// Create a new configuration with custom aggregator settings
    pub fn new_with_aggregator_config(
        data_dir: &Path,
        logs_dir: &Path,
        aggregator_config: AggregatorConfig,
    ) -> Self {
        Self {
            aggregator_config: Some(aggregator_config),
            ..Self::new(data_dir, logs_dir)
        }
    }

    /// Reads `MESSENGER_DATA_DIR` and `MESSENGER_LOGS_DIR`, loading a `.env`
    /// file first if one is present.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(
                target: "marketplace_messaging::config::from_env",
                "Loaded environment from {:?}",
                path
            ),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(MessengerError::Configuration(format!(
                    "Failed to load .env file: {}",
                    e
                )));
            }
        }

        let data_dir = read_dir_var(DATA_DIR_ENV)?;
        let logs_dir = read_dir_var(LOGS_DIR_ENV)?;
        Ok(Self::new(&data_dir, &logs_dir))
    }
}

fn read_dir_var(name: &str) -> Result<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| MessengerError::Configuration(format!("{} is not set", name)))
}

/// Message store and conversation inbox for marketplace participants.
pub struct Messenger {
    pub config: MessengerConfig,
    database: Arc<Database>,
    conversation_aggregator: ConversationAggregator,
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("config", &self.config)
            .field("database", &self.database.path)
            .field("conversation_aggregator", &self.conversation_aggregator)
            .finish()
    }
}

impl Messenger {
    /// Sets up data and log directories, logging and the database (running
    /// any pending migrations).
    pub async fn new(config: MessengerConfig) -> Result<Self> {
        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))
            .map_err(MessengerError::from)?;
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(MessengerError::from)?;

        init_tracing(logs_dir)?;

        tracing::debug!(
            target: "marketplace_messaging::messenger::new",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join(DATABASE_FILE)).await?);

        let conversation_aggregator = match config.aggregator_config.clone() {
            Some(aggregator_config) => ConversationAggregator::with_config(aggregator_config),
            None => ConversationAggregator::new(),
        };

        Ok(Self {
            config,
            database,
            conversation_aggregator,
        })
    }

    pub fn conversation_aggregator(&self) -> &ConversationAggregator {
        &self.conversation_aggregator
    }

    /// Deletes all users, messages and summaries, and the log files.
    pub async fn delete_all_data(&self) -> Result<()> {
        tracing::debug!(target: "marketplace_messaging::messenger::delete_all_data", "Deleting all data");

        self.database.delete_all_data().await?;

        if self.config.logs_dir.exists() {
            for entry in std::fs::read_dir(&self.config.logs_dir)? {
                let path = entry?.path();
                if path.is_file() {
                    std::fs::remove_file(path)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::messenger::messages::Message;
    use crate::messenger::users::{User, UserId};
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    /// 2025-01-01T00:00:00Z
    const BASE_TIMESTAMP_MS: i64 = 1_735_689_600_000;

    pub(crate) fn create_test_config() -> (MessengerConfig, TempDir, TempDir) {
        let data_temp_dir = TempDir::new().expect("Failed to create temp data dir");
        let logs_temp_dir = TempDir::new().expect("Failed to create temp logs dir");
        let config = MessengerConfig::new(data_temp_dir.path(), logs_temp_dir.path());
        (config, data_temp_dir, logs_temp_dir)
    }

    /// Creates a Messenger backed by a fresh database in temporary directories.
    ///
    /// The returned `TempDir`s must be kept alive for the duration of the test.
    pub(crate) async fn create_mock_messenger() -> (Messenger, TempDir, TempDir) {
        let (config, data_temp, logs_temp) = create_test_config();
        let messenger = Messenger::new(config)
            .await
            .expect("Failed to create mock messenger");
        (messenger, data_temp, logs_temp)
    }

    pub(crate) async fn seed_users(messenger: &Messenger, ids: &[&str]) {
        for id in ids {
            messenger
                .upsert_user(&User::new(*id))
                .await
                .expect("Failed to seed user");
        }
    }

    /// A message `minutes` after a fixed base time, with millisecond precision
    /// so it survives a round trip through the store unchanged.
    pub(crate) fn message_at(sender: &str, receiver: &str, minutes: i64, is_read: bool) -> Message {
        let created_at: DateTime<Utc> =
            DateTime::from_timestamp_millis(BASE_TIMESTAMP_MS + minutes * 60_000)
                .expect("valid test timestamp");
        Message {
            id: uuid::Uuid::new_v4(),
            sender_id: UserId::new(sender),
            receiver_id: UserId::new(receiver),
            content: format!("{} -> {} at +{}m", sender, receiver, minutes),
            created_at,
            is_read,
        }
    }
}

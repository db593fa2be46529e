use thiserror::Error;

use crate::messenger::database::DatabaseError;
use crate::messenger::sessions::SessionError;
use crate::messenger::users::UserId;

pub type Result<T> = core::result::Result<T, MessengerError>;

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("User {reader} is not the receiver of message {message_id}")]
    NotMessageReceiver { reader: UserId, message_id: String },

    #[error("Message content must not be empty")]
    EmptyMessage,

    #[error("Cannot send a message to yourself")]
    SelfMessage,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messenger::Messenger;
use crate::messenger::error::{MessengerError, Result};
use crate::messenger::users::{User, UserId};

/// One directed text message between two marketplace participants.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// The other participant relative to `viewer`, `None` when the message does
    /// not involve `viewer` or is addressed to its own sender.
    pub fn counterpart_of(&self, viewer: &UserId) -> Option<&UserId> {
        if self.sender_id == self.receiver_id {
            return None;
        }
        if &self.sender_id == viewer {
            Some(&self.receiver_id)
        } else if &self.receiver_id == viewer {
            Some(&self.sender_id)
        } else {
            None
        }
    }

    /// Counts toward `viewer`'s unread badge: received by them and not read yet.
    pub fn is_unread_for(&self, viewer: &UserId) -> bool {
        &self.receiver_id == viewer && !self.is_read
    }
}

/// A message about to be sent. The store assigns id and timestamp.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

impl NewMessage {
    pub fn new(
        sender_id: impl Into<UserId>,
        receiver_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(MessengerError::EmptyMessage);
        }
        if self.sender_id == self.receiver_id {
            return Err(MessengerError::SelfMessage);
        }
        Ok(())
    }
}

/// Result of a read action on a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTransition {
    /// The message went from unread to read.
    MarkedRead,
    /// The message was already read; nothing changed.
    AlreadyRead,
}

impl Messenger {
    /// Validates and stores a new message, updating both participants'
    /// conversation summaries in the same transaction.
    pub async fn send_message(&self, new_message: NewMessage) -> Result<Message> {
        new_message.validate()?;

        for participant in [&new_message.sender_id, &new_message.receiver_id] {
            if User::find_by_id(participant, &self.database).await?.is_none() {
                return Err(MessengerError::UserNotFound(participant.clone()));
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new_message.sender_id,
            receiver_id: new_message.receiver_id,
            content: new_message.content,
            created_at: Utc::now(),
            is_read: false,
        };
        message.insert(&self.database).await?;

        tracing::debug!(
            target: "marketplace_messaging::messages::send_message",
            "Stored message {} from {} to {}",
            message.id,
            message.sender_id,
            message.receiver_id
        );

        Ok(message)
    }

    /// Every message the user sent or received, most recent first.
    pub async fn messages_involving(&self, user_id: &UserId) -> Result<Vec<Message>> {
        Ok(Message::find_involving(user_id, &self.database).await?)
    }

    /// The full two-way thread between two users, oldest first.
    pub async fn conversation_thread(&self, user_a: &UserId, user_b: &UserId) -> Result<Vec<Message>> {
        Ok(Message::find_between(user_a, user_b, &self.database).await?)
    }

    pub async fn find_message(&self, message_id: &Uuid) -> Result<Message> {
        Message::find_by_id(message_id, &self.database)
            .await?
            .ok_or_else(|| MessengerError::MessageNotFound(message_id.to_string()))
    }

    /// Marks one message read. Marking an already-read message is a no-op.
    pub async fn mark_message_read(&self, message_id: &Uuid) -> Result<ReadTransition> {
        let transition = Message::mark_read(message_id, &self.database)
            .await?
            .ok_or_else(|| MessengerError::MessageNotFound(message_id.to_string()))?;

        tracing::debug!(
            target: "marketplace_messaging::messages::mark_message_read",
            "Message {}: {:?}",
            message_id,
            transition
        );

        Ok(transition)
    }

    /// Same as [`Messenger::mark_message_read`], but only the receiver may
    /// perform the read.
    pub async fn mark_message_read_by(
        &self,
        reader: &UserId,
        message_id: &Uuid,
    ) -> Result<ReadTransition> {
        let message = self.find_message(message_id).await?;
        if &message.receiver_id != reader {
            return Err(MessengerError::NotMessageReceiver {
                reader: reader.clone(),
                message_id: message_id.to_string(),
            });
        }
        self.mark_message_read(message_id).await
    }

    /// Marks every unread message from `counterpart` to `viewer` read and
    /// returns how many changed.
    pub async fn mark_conversation_read(&self, viewer: &UserId, counterpart: &UserId) -> Result<u64> {
        let marked = Message::mark_all_read_from(counterpart, viewer, &self.database).await?;
        tracing::debug!(
            target: "marketplace_messaging::messages::mark_conversation_read",
            "Marked {} messages from {} to {} read",
            marked,
            counterpart,
            viewer
        );
        Ok(marked)
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    Database, DatabaseError, conversation_summaries,
    utils::{parse_timestamp, parse_uuid},
};
use crate::messenger::messages::{Message, ReadTransition};
use crate::messenger::users::UserId;

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
pub(super) struct MessageRow {
    pub seq: i64,
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        let is_read: i64 = row.try_get("is_read")?;

        Ok(MessageRow {
            seq: row.try_get("seq")?,
            id: parse_uuid(row, "id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            content: row.try_get("content")?,
            is_read: is_read != 0,
            created_at: parse_timestamp(row, "created_at")?,
        })
    }
}

impl MessageRow {
    pub(super) fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: UserId::from(self.sender_id),
            receiver_id: UserId::from(self.receiver_id),
            content: self.content,
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

impl Message {
    /// Inserts the message and folds it into both participants' conversation
    /// summaries. Returns the store's insertion sequence number.
    pub(crate) async fn insert(&self, database: &Database) -> Result<i64> {
        let mut tx = database.pool.begin().await?;

        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING seq",
        )
        .bind(self.id.to_string())
        .bind(self.sender_id.as_str())
        .bind(self.receiver_id.as_str())
        .bind(&self.content)
        .bind(i64::from(self.is_read))
        .bind(self.created_at.timestamp_millis())
        .fetch_one(&mut *tx)
        .await?;

        conversation_summaries::record_sent(&mut tx, self, seq).await?;

        tx.commit().await?;
        Ok(seq)
    }

    pub(crate) async fn find_by_id(message_id: &Uuid, database: &Database) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&database.pool)
            .await?;

        Ok(row.map(MessageRow::into_message))
    }

    /// Messages where `user_id` is sender or receiver, newest first. Equal
    /// timestamps keep the reverse insertion order.
    pub(crate) async fn find_involving(user_id: &UserId, database: &Database) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages
             WHERE sender_id = ? OR receiver_id = ?
             ORDER BY created_at DESC, seq DESC",
        )
        .bind(user_id.as_str())
        .bind(user_id.as_str())
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// Both directions between two users, oldest first.
    pub(crate) async fn find_between(
        user_a: &UserId,
        user_b: &UserId,
        database: &Database,
    ) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages
             WHERE (sender_id = ? AND receiver_id = ?)
                OR (sender_id = ? AND receiver_id = ?)
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(user_a.as_str())
        .bind(user_b.as_str())
        .bind(user_b.as_str())
        .bind(user_a.as_str())
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// Flips `is_read` if the message is still unread. `None` when no message
    /// has this id.
    ///
    /// The UPDATE must stay the first statement: under WAL a transaction that
    /// has already read cannot become a writer after another connection commits.
    pub(crate) async fn mark_read(
        message_id: &Uuid,
        database: &Database,
    ) -> Result<Option<ReadTransition>> {
        let mut tx = database.pool.begin().await?;

        let flipped: Option<(String, String)> = sqlx::query_as(
            "UPDATE messages SET is_read = 1
             WHERE id = ? AND is_read = 0
             RETURNING sender_id, receiver_id",
        )
        .bind(message_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((sender_id, receiver_id)) = flipped else {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM messages WHERE id = ?")
                .bind(message_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            return Ok(exists.map(|_| ReadTransition::AlreadyRead));
        };

        conversation_summaries::record_read(
            &mut tx,
            &UserId::from(receiver_id),
            &UserId::from(sender_id),
            1,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(ReadTransition::MarkedRead))
    }

    /// Marks every unread message from `sender` to `receiver` read.
    pub(crate) async fn mark_all_read_from(
        sender: &UserId,
        receiver: &UserId,
        database: &Database,
    ) -> Result<u64> {
        let mut tx = database.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE messages SET is_read = 1
             WHERE sender_id = ? AND receiver_id = ? AND is_read = 0",
        )
        .bind(sender.as_str())
        .bind(receiver.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated > 0 {
            conversation_summaries::record_read(&mut tx, receiver, sender, updated).await?;
        }

        tx.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::test_utils::{create_mock_messenger, message_at};

    #[tokio::test]
    async fn test_insert_returns_increasing_sequence() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let first = message_at("u1", "u2", 10, false).insert(database).await.unwrap();
        let second = message_at("u2", "u1", 10, false).insert(database).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_find_involving_breaks_timestamp_ties_by_insertion() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let older = message_at("u1", "u2", 5, false);
        let tie_a = message_at("u2", "u1", 10, false);
        let tie_b = message_at("u3", "u1", 10, true);
        for message in [&older, &tie_a, &tie_b] {
            message.insert(database).await.unwrap();
        }

        let found = Message::find_involving(&UserId::new("u1"), database)
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![tie_b.id, tie_a.id, older.id]);
    }

    #[tokio::test]
    async fn test_row_round_trips_fields() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let original = message_at("u1", "u2", 42, true);
        original.insert(database).await.unwrap();

        let loaded = Message::find_by_id(&original.id, database)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_mark_read_transitions_once() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let unread = message_at("u2", "u1", 1, false);
        unread.insert(database).await.unwrap();

        let first = Message::mark_read(&unread.id, database).await.unwrap();
        let second = Message::mark_read(&unread.id, database).await.unwrap();
        assert_eq!(first, Some(ReadTransition::MarkedRead));
        assert_eq!(second, Some(ReadTransition::AlreadyRead));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mark_read_is_idempotent() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let mut ids = Vec::new();
        for minute in 0..40 {
            let message = message_at("u2", "u1", minute, false);
            message.insert(database).await.unwrap();
            ids.push(message.id);
        }

        let mut handles = Vec::new();
        for _ in 0..3 {
            for id in &ids {
                let database = database.clone();
                let id = *id;
                handles.push(tokio::spawn(async move {
                    Message::mark_read(&id, &database).await
                }));
            }
        }

        let mut marked = 0;
        for handle in handles {
            let transition = handle.await.unwrap().unwrap();
            if transition == Some(ReadTransition::MarkedRead) {
                marked += 1;
            }
        }
        assert_eq!(marked, ids.len());

        let still_unread: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE is_read = 0")
                .fetch_one(&database.pool)
                .await
                .unwrap();
        assert_eq!(still_unread, 0);

        let summary_unread: i64 = sqlx::query_scalar(
            "SELECT unread_count FROM conversation_summaries
             WHERE owner_id = 'u1' AND counterpart_id = 'u2'",
        )
        .fetch_one(&database.pool)
        .await
        .unwrap();
        assert_eq!(summary_unread, 0);
    }

    #[tokio::test]
    async fn test_mark_read_missing_message() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let result = Message::mark_read(&Uuid::new_v4(), &messenger.database)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}

//! Materialized per-user conversation list.
//!
//! Each participant owns one row per counterpart holding a pointer to the
//! newest message and the number of unread messages received from that
//! counterpart. Rows are maintained on send and on read, so listing
//! conversations does not rescan the message log.

use chrono::Utc;
use sqlx::SqliteConnection;

use super::{Database, DatabaseError, messages::MessageRow};
use crate::messenger::conversation_aggregator::CounterpartSummary;
use crate::messenger::messages::Message;
use crate::messenger::users::UserId;

type Result<T> = std::result::Result<T, DatabaseError>;

const UPSERT_SUMMARY: &str = "
    INSERT INTO conversation_summaries
        (owner_id, counterpart_id, last_message_id, last_message_at, last_message_seq,
         unread_count, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(owner_id, counterpart_id) DO UPDATE SET
        last_message_id = CASE WHEN excluded.last_message_at > last_message_at
                                 OR (excluded.last_message_at = last_message_at
                                     AND excluded.last_message_seq > last_message_seq)
                               THEN excluded.last_message_id ELSE last_message_id END,
        last_message_seq = CASE WHEN excluded.last_message_at > last_message_at
                                  OR (excluded.last_message_at = last_message_at
                                      AND excluded.last_message_seq > last_message_seq)
                                THEN excluded.last_message_seq ELSE last_message_seq END,
        last_message_at = MAX(excluded.last_message_at, last_message_at),
        unread_count = unread_count + excluded.unread_count,
        updated_at = excluded.updated_at";

/// Folds a freshly inserted message into the sender's and the receiver's rows.
pub(super) async fn record_sent(
    conn: &mut SqliteConnection,
    message: &Message,
    seq: i64,
) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let receiver_unread = i64::from(!message.is_read);

    for (owner, counterpart, unread) in [
        (&message.sender_id, &message.receiver_id, 0),
        (&message.receiver_id, &message.sender_id, receiver_unread),
    ] {
        sqlx::query(UPSERT_SUMMARY)
            .bind(owner.as_str())
            .bind(counterpart.as_str())
            .bind(message.id.to_string())
            .bind(message.created_at.timestamp_millis())
            .bind(seq)
            .bind(unread)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Lowers `owner`'s unread badge for `counterpart` after `count` messages were
/// read. Never drops below zero.
pub(super) async fn record_read(
    conn: &mut SqliteConnection,
    owner: &UserId,
    counterpart: &UserId,
    count: u64,
) -> Result<()> {
    sqlx::query(
        "UPDATE conversation_summaries
         SET unread_count = MAX(unread_count - ?, 0), updated_at = ?
         WHERE owner_id = ? AND counterpart_id = ?",
    )
    .bind(i64::try_from(count).unwrap_or(i64::MAX))
    .bind(Utc::now().timestamp_millis())
    .bind(owner.as_str())
    .bind(counterpart.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// The owner's summaries joined with their last messages, most recent first.
pub(crate) async fn find_for_owner(
    owner: &UserId,
    database: &Database,
) -> Result<Vec<CounterpartSummary>> {
    use sqlx::{FromRow, Row};

    let rows = sqlx::query(
        "SELECT s.counterpart_id, s.unread_count, m.*
         FROM conversation_summaries s
         INNER JOIN messages m ON m.id = s.last_message_id
         WHERE s.owner_id = ?
         ORDER BY s.last_message_at DESC, s.last_message_seq DESC",
    )
    .bind(owner.as_str())
    .fetch_all(&database.pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let counterpart_id: String = row.try_get("counterpart_id")?;
        let unread_count: i64 = row.try_get("unread_count")?;
        let last_message = MessageRow::from_row(&row)?.into_message();

        summaries.push(CounterpartSummary {
            counterpart_id: UserId::from(counterpart_id),
            last_message,
            unread_count: usize::try_from(unread_count).unwrap_or(0),
        });
    }

    Ok(summaries)
}

/// Replaces all of `owner`'s rows with `summaries` in one transaction.
pub(crate) async fn replace_for_owner(
    owner: &UserId,
    summaries: &[CounterpartSummary],
    database: &Database,
) -> Result<usize> {
    let mut tx = database.pool.begin().await?;
    let now = Utc::now().timestamp_millis();

    sqlx::query("DELETE FROM conversation_summaries WHERE owner_id = ?")
        .bind(owner.as_str())
        .execute(&mut *tx)
        .await?;

    let mut written = 0;
    for summary in summaries {
        let inserted = sqlx::query(
            "INSERT INTO conversation_summaries
                 (owner_id, counterpart_id, last_message_id, last_message_at, last_message_seq,
                  unread_count, updated_at)
             SELECT ?, ?, id, created_at, seq, ?, ?
             FROM messages WHERE id = ?",
        )
        .bind(owner.as_str())
        .bind(summary.counterpart_id.as_str())
        .bind(i64::try_from(summary.unread_count).unwrap_or(i64::MAX))
        .bind(now)
        .bind(summary.last_message.id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        written += inserted as usize;
    }

    tx.commit().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::test_utils::{create_mock_messenger, message_at};

    async fn unread_for(database: &Database, owner: &str, counterpart: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT unread_count FROM conversation_summaries
             WHERE owner_id = ? AND counterpart_id = ?",
        )
        .bind(owner)
        .bind(counterpart)
        .fetch_one(&database.pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_updates_both_sides() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        message_at("u1", "u2", 1, false).insert(database).await.unwrap();
        message_at("u1", "u2", 2, false).insert(database).await.unwrap();

        assert_eq!(unread_for(database, "u1", "u2").await, 0);
        assert_eq!(unread_for(database, "u2", "u1").await, 2);
    }

    #[tokio::test]
    async fn test_late_arriving_older_message_keeps_newest_pointer() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let newest = message_at("u1", "u2", 20, false);
        newest.insert(database).await.unwrap();
        // Imported history older than what is already summarized
        message_at("u2", "u1", 5, false).insert(database).await.unwrap();

        let summaries = find_for_owner(&UserId::new("u1"), database).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].last_message.id, newest.id);
        assert_eq!(summaries[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_record_read_floors_at_zero() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        message_at("u2", "u1", 1, false).insert(database).await.unwrap();

        let mut conn = database.pool.acquire().await.unwrap();
        record_read(&mut conn, &UserId::new("u1"), &UserId::new("u2"), 5)
            .await
            .unwrap();

        assert_eq!(unread_for(database, "u1", "u2").await, 0);
    }

    #[tokio::test]
    async fn test_find_for_owner_orders_by_recency() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        message_at("u1", "u2", 1, false).insert(database).await.unwrap();
        message_at("u3", "u1", 3, false).insert(database).await.unwrap();
        message_at("u1", "u4", 2, true).insert(database).await.unwrap();

        let counterparts: Vec<String> = find_for_owner(&UserId::new("u1"), database)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.counterpart_id.to_string())
            .collect();
        assert_eq!(counterparts, vec!["u3", "u4", "u2"]);
    }

    #[tokio::test]
    async fn test_replace_for_owner_overwrites_rows() {
        let (messenger, _data_temp, _logs_temp) = create_mock_messenger().await;
        let database = &messenger.database;

        let kept = message_at("u2", "u1", 1, false);
        kept.insert(database).await.unwrap();
        message_at("u3", "u1", 2, false).insert(database).await.unwrap();

        let replacement = vec![CounterpartSummary {
            counterpart_id: UserId::new("u2"),
            last_message: kept.clone(),
            unread_count: 7,
        }];
        let written = replace_for_owner(&UserId::new("u1"), &replacement, database)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let summaries = find_for_owner(&UserId::new("u1"), database).await.unwrap();
        assert_eq!(summaries, replacement);
    }
}

use chrono::{DateTime, Utc};

use super::{Database, DatabaseError, utils::parse_timestamp};
use crate::messenger::users::{User, UserId};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct UserRow {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    profile_image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for UserRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            profile_image_url: row.try_get("profile_image_url")?,
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: UserId::from(self.id),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            profile_image_url: self.profile_image_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl User {
    pub(crate) async fn find_by_id(user_id: &UserId, database: &Database) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&database.pool)
            .await?;

        Ok(row.map(UserRow::into_user))
    }

    /// Batch lookup. Ids without a row are simply absent from the result.
    pub(crate) async fn find_by_ids(user_ids: &[UserId], database: &Database) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = "?,".repeat(user_ids.len());
        let placeholders = placeholders.trim_end_matches(',');
        let query = format!("SELECT * FROM users WHERE id IN ({})", placeholders);

        let mut query_builder = sqlx::query_as::<_, UserRow>(&query);
        for user_id in user_ids {
            query_builder = query_builder.bind(user_id.as_str());
        }

        let rows = query_builder.fetch_all(&database.pool).await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Inserts or updates the profile fields. `created_at` is only written on insert.
    pub(crate) async fn save(&self, database: &Database) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, email, first_name, last_name, profile_image_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               email = excluded.email,
               first_name = excluded.first_name,
               last_name = excluded.last_name,
               profile_image_url = excluded.profile_image_url,
               updated_at = excluded.updated_at
             RETURNING *",
        )
        .bind(self.id.as_str())
        .bind(&self.email)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(&self.profile_image_url)
        .bind(self.created_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&database.pool)
        .await?;

        Ok(row.into_user())
    }

    pub(crate) async fn delete_by_id(user_id: &UserId, database: &Database) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .execute(&database.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

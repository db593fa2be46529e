use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messenger::Messenger;
use crate::messenger::error::Result;

/// Identity of a marketplace participant (provider or seeker).
///
/// Ids are opaque strings handed out by the identity provider, so no format
/// is assumed beyond being non-empty.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<UserId>) -> Self {
        let now = Utc::now();
        User {
            id: id.into(),
            email: None,
            first_name: None,
            last_name: None,
            profile_image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string()).filter(|s| !s.is_empty());
        self.last_name = Some(last_name.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string()).filter(|s| !s.is_empty());
        self
    }

    /// Name shown in the conversation list.
    ///
    /// Fallback chain: "first last" -> first or last alone -> email -> None
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if !parts.is_empty() {
            return Some(parts.join(" "));
        }

        self.email.clone().filter(|s| !s.is_empty())
    }
}

impl Messenger {
    /// Creates the user or updates their profile fields, keeping the original
    /// `created_at`.
    pub async fn upsert_user(&self, user: &User) -> Result<User> {
        let saved = user.save(&self.database).await?;
        tracing::debug!(
            target: "marketplace_messaging::users::upsert_user",
            "Upserted user {}",
            saved.id
        );
        Ok(saved)
    }

    /// Looks up a user, `None` when the identity record does not exist.
    pub async fn find_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(User::find_by_id(user_id, &self.database).await?)
    }

    /// Removes the identity record. Messages sent or received by the user stay
    /// in the store; conversations with them are dropped from other users'
    /// lists from then on.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<bool> {
        let deleted = User::delete_by_id(user_id, &self.database).await?;
        if deleted {
            tracing::info!(
                target: "marketplace_messaging::users::delete_user",
                "Deleted user {}",
                user_id
            );
        }
        Ok(deleted)
    }
}

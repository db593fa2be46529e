//! Session verification seam.
//!
//! Callers turn an opaque session token into a [`UserId`] before asking for a
//! conversation list; the aggregator itself never sees tokens.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::messenger::Messenger;
use crate::messenger::conversation_aggregator::Conversation;
use crate::messenger::error::Result;
use crate::messenger::users::UserId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown session token")]
    UnknownToken,

    #[error("Session expired")]
    Expired,
}

/// Resolves a session token to the user it was issued for.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> std::result::Result<UserId, SessionError>;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: UserId,
    issued_at: DateTime<Utc>,
}

/// In-process session table, suitable for a single server instance and tests.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions older than `ttl` are rejected and evicted on verification.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Issues a new token for `user_id`. Expired sessions are swept first.
    pub fn issue(&self, user_id: &UserId) -> String {
        self.purge_expired();
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: &UserId, issued_at: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            SessionEntry {
                user_id: user_id.clone(),
                issued_at,
            },
        );
        tracing::debug!(
            target: "marketplace_messaging::sessions::issue",
            "Issued session for {}",
            user_id
        );
        token
    }

    /// Drops every session older than the TTL and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before.saturating_sub(self.sessions.len());

        if purged > 0 {
            tracing::debug!(
                target: "marketplace_messaging::sessions::purge_expired",
                "Purged {} expired sessions",
                purged
            );
        }
        purged
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - entry.issued_at > ttl)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionVerifier for SessionStore {
    async fn verify(&self, token: &str) -> std::result::Result<UserId, SessionError> {
        let entry = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::UnknownToken)?;

        if self.is_expired(&entry, Utc::now()) {
            self.sessions.remove(token);
            tracing::debug!(
                target: "marketplace_messaging::sessions::verify",
                "Evicted expired session for {}",
                entry.user_id
            );
            return Err(SessionError::Expired);
        }

        Ok(entry.user_id)
    }
}

impl Messenger {
    /// Verifies the session and returns the conversation list of its user.
    pub async fn conversations_for_session(
        &self,
        verifier: &dyn SessionVerifier,
        token: &str,
    ) -> Result<Vec<Conversation>> {
        let viewer = verifier.verify(token).await?;
        self.get_conversations(&viewer).await
    }
}

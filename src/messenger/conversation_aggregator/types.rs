use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::messenger::messages::Message;
use crate::messenger::users::{User, UserId};

/// One entry of a user's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// The counterpart of the viewing user
    pub other_participant: User,

    /// Newest message exchanged with the counterpart, in either direction
    pub last_message: Message,

    /// Messages from the counterpart that the viewing user has not read
    pub unread_count: usize,
}

/// Per-counterpart result of the scan, before identities are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartSummary {
    pub counterpart_id: UserId,
    pub last_message: Message,
    pub unread_count: usize,
}

/// Conversations plus the counterparts that were dropped because their
/// identity record could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationOutcome {
    pub conversations: Vec<Conversation>,
    pub orphaned: Vec<UserId>,
}

impl AggregationOutcome {
    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }
}

/// Looks up the identity record for a counterpart.
///
/// Returning `None` marks the counterpart as orphaned; its conversation is
/// left out of the result.
pub trait UserResolver {
    fn resolve_user(&self, user_id: &UserId) -> Option<User>;
}

impl<F> UserResolver for F
where
    F: Fn(&UserId) -> Option<User>,
{
    fn resolve_user(&self, user_id: &UserId) -> Option<User> {
        self(user_id)
    }
}

impl UserResolver for HashMap<UserId, User> {
    fn resolve_user(&self, user_id: &UserId) -> Option<User> {
        self.get(user_id).cloned()
    }
}

/// Configuration for the conversation aggregator
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AggregatorConfig {
    /// Check that input is newest-first and stable-sort it when it is not.
    /// When disabled, input order is trusted as-is.
    pub sort_unordered_input: bool,

    /// Whether to enable detailed logging of processing steps
    pub enable_debug_logging: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sort_unordered_input: true,
            enable_debug_logging: false,
        }
    }
}

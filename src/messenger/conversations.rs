use std::collections::{HashMap, HashSet};

use crate::messenger::Messenger;
use crate::messenger::conversation_aggregator::{AggregationOutcome, Conversation};
use crate::messenger::database::conversation_summaries;
use crate::messenger::error::Result;
use crate::messenger::messages::Message;
use crate::messenger::users::{User, UserId};

/// Distinct counterparts of `viewer` across `messages`, in first-seen order.
fn collect_counterpart_ids(viewer: &UserId, messages: &[Message]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter_map(|m| m.counterpart_of(viewer))
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

impl Messenger {
    /// Retrieves the conversation list for a user by scanning their message log.
    ///
    /// Returns one entry per counterpart, most recently active first.
    pub async fn get_conversations(&self, viewer: &UserId) -> Result<Vec<Conversation>> {
        Ok(self.aggregate_conversations(viewer).await?.conversations)
    }

    /// Same as [`Messenger::get_conversations`], keeping the list of
    /// counterparts dropped because their user record is gone.
    pub async fn aggregate_conversations(&self, viewer: &UserId) -> Result<AggregationOutcome> {
        let messages = Message::find_involving(viewer, &self.database).await?;
        if messages.is_empty() {
            return Ok(AggregationOutcome::default());
        }

        let counterpart_ids = collect_counterpart_ids(viewer, &messages);
        let users_by_id = self.build_users_by_id(&counterpart_ids).await?;

        let outcome = self
            .conversation_aggregator
            .aggregate(viewer, messages, &users_by_id);

        tracing::debug!(
            target: "marketplace_messaging::conversations::aggregate_conversations",
            "Built {} conversations for {} ({} orphaned)",
            outcome.conversations.len(),
            viewer,
            outcome.orphaned_count()
        );

        Ok(outcome)
    }

    /// Reads the conversation list from the materialized summaries instead of
    /// the message log. Ordering and orphan handling match
    /// [`Messenger::get_conversations`].
    pub async fn conversation_summaries(&self, viewer: &UserId) -> Result<Vec<Conversation>> {
        let summaries = conversation_summaries::find_for_owner(viewer, &self.database).await?;
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let counterpart_ids: Vec<UserId> =
            summaries.iter().map(|s| s.counterpart_id.clone()).collect();
        let users_by_id = self.build_users_by_id(&counterpart_ids).await?;

        let outcome = self.conversation_aggregator.resolve(summaries, &users_by_id);

        Ok(outcome.conversations)
    }

    /// Recomputes `viewer`'s materialized summaries from the full message log.
    ///
    /// Every counterpart is written, including ones without a user record, so
    /// the summaries stay in step with the log if the user comes back.
    pub async fn rebuild_conversation_summaries(&self, viewer: &UserId) -> Result<usize> {
        let messages = Message::find_involving(viewer, &self.database).await?;
        let summaries = self.conversation_aggregator.summarize(viewer, messages);

        let written =
            conversation_summaries::replace_for_owner(viewer, &summaries, &self.database).await?;

        tracing::info!(
            target: "marketplace_messaging::conversations::rebuild_conversation_summaries",
            "Rebuilt {} conversation summaries for {}",
            written,
            viewer
        );

        Ok(written)
    }

    async fn build_users_by_id(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, User>> {
        let users = User::find_by_ids(user_ids, &self.database).await?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }
}

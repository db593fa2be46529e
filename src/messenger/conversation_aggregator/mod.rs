//! Conversation Aggregation Module
//!
//! Turns the flat, newest-first message log of one user into the conversation
//! list shown on the Messages page: one entry per counterpart with the newest
//! message and the unread count. Aggregation is a pure function of its inputs;
//! fetching messages and users is left to the caller.

mod processor;
mod types;


pub use types::{
    AggregationOutcome, AggregatorConfig, Conversation, CounterpartSummary, UserResolver,
};

use crate::messenger::messages::Message;
use crate::messenger::users::UserId;

/// Stateless conversation aggregator, one per Messenger instance
#[derive(Debug, Clone, Default)]
pub struct ConversationAggregator {
    config: AggregatorConfig,
}

impl ConversationAggregator {
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    pub fn with_config(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Builds the viewer's conversation list.
    ///
    /// `messages` should hold only messages involving `viewer`, newest first.
    /// Counterparts that `resolver` cannot find are left out.
    pub fn build_conversations<R>(
        &self,
        viewer: &UserId,
        messages: Vec<Message>,
        resolver: &R,
    ) -> Vec<Conversation>
    where
        R: UserResolver + ?Sized,
    {
        self.aggregate(viewer, messages, resolver).conversations
    }

    /// Like [`ConversationAggregator::build_conversations`], but also reports
    /// which counterparts were dropped as orphans.
    pub fn aggregate<R>(
        &self,
        viewer: &UserId,
        messages: Vec<Message>,
        resolver: &R,
    ) -> AggregationOutcome
    where
        R: UserResolver + ?Sized,
    {
        if self.config.enable_debug_logging {
            tracing::debug!(
                target: "marketplace_messaging::conversation_aggregator::aggregate",
                "Aggregating {} messages for user {}",
                messages.len(),
                viewer
            );
        }

        let summaries = self.summarize(viewer, messages);
        self.resolve(summaries, resolver)
    }

    /// The scan step alone: per-counterpart summaries in first-seen order,
    /// with no identity lookup.
    pub fn summarize(&self, viewer: &UserId, messages: Vec<Message>) -> Vec<CounterpartSummary> {
        processor::summarize_counterparts(viewer, messages, &self.config)
    }

    /// The resolve step alone, for summaries that come from somewhere other
    /// than a log scan.
    pub fn resolve<R>(&self, summaries: Vec<CounterpartSummary>, resolver: &R) -> AggregationOutcome
    where
        R: UserResolver + ?Sized,
    {
        processor::resolve_counterparts(summaries, resolver, &self.config)
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }
}

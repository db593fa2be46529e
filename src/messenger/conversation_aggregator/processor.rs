//! Single-pass conversation aggregation
//!
//! Walks a newest-first message log once, keeping the first message seen per
//! counterpart as its last message and counting unread messages addressed to
//! the viewer.

use std::collections::HashMap;

use super::types::{
    AggregationOutcome, AggregatorConfig, Conversation, CounterpartSummary, UserResolver,
};
use crate::messenger::messages::Message;
use crate::messenger::users::UserId;

/// Groups `messages` by counterpart in first-seen order.
pub(super) fn summarize_counterparts(
    viewer: &UserId,
    messages: Vec<Message>,
    config: &AggregatorConfig,
) -> Vec<CounterpartSummary> {
    if messages.is_empty() {
        return Vec::new();
    }

    let messages = ensure_newest_first(messages, config);

    let mut positions: HashMap<UserId, usize> = HashMap::new();
    let mut summaries: Vec<CounterpartSummary> = Vec::new();
    let mut skipped = 0usize;

    for message in messages {
        let Some(counterpart) = message.counterpart_of(viewer).cloned() else {
            skipped += 1;
            continue;
        };
        let unread = message.is_unread_for(viewer);

        match positions.get(&counterpart) {
            Some(&position) => {
                if unread {
                    summaries[position].unread_count += 1;
                }
            }
            None => {
                positions.insert(counterpart.clone(), summaries.len());
                summaries.push(CounterpartSummary {
                    counterpart_id: counterpart,
                    last_message: message,
                    unread_count: usize::from(unread),
                });
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(
            target: "marketplace_messaging::conversation_aggregator::summarize_counterparts",
            "Skipped {} messages that do not involve user {}",
            skipped,
            viewer
        );
    }

    if config.enable_debug_logging {
        tracing::debug!(
            target: "marketplace_messaging::conversation_aggregator::summarize_counterparts",
            "Grouped messages for {} into {} counterparts",
            viewer,
            summaries.len()
        );
    }

    summaries
}

/// Attaches identities, dropping counterparts the resolver does not know.
/// Order of `summaries` is preserved.
pub(super) fn resolve_counterparts<R>(
    summaries: Vec<CounterpartSummary>,
    resolver: &R,
    config: &AggregatorConfig,
) -> AggregationOutcome
where
    R: UserResolver + ?Sized,
{
    let mut outcome = AggregationOutcome {
        conversations: Vec::with_capacity(summaries.len()),
        orphaned: Vec::new(),
    };

    for summary in summaries {
        match resolver.resolve_user(&summary.counterpart_id) {
            Some(other_participant) => outcome.conversations.push(Conversation {
                other_participant,
                last_message: summary.last_message,
                unread_count: summary.unread_count,
            }),
            None => outcome.orphaned.push(summary.counterpart_id),
        }
    }

    if !outcome.orphaned.is_empty() {
        let orphaned_ids: Vec<&str> = outcome.orphaned.iter().map(UserId::as_str).collect();
        tracing::warn!(
            target: "marketplace_messaging::conversation_aggregator::resolve_counterparts",
            "Dropped {} conversations with unresolvable users: {:?}",
            outcome.orphaned.len(),
            orphaned_ids
        );
    }

    if config.enable_debug_logging {
        tracing::debug!(
            target: "marketplace_messaging::conversation_aggregator::resolve_counterparts",
            "Resolved {} conversations",
            outcome.conversations.len()
        );
    }

    outcome
}

/// Returns the log newest-first. Out-of-order input is stable-sorted when the
/// config allows it, so equal timestamps keep the caller's order.
fn ensure_newest_first(mut messages: Vec<Message>, config: &AggregatorConfig) -> Vec<Message> {
    let first_violation = messages
        .windows(2)
        .position(|pair| pair[0].created_at < pair[1].created_at);

    let Some(position) = first_violation else {
        return messages;
    };

    if config.sort_unordered_input {
        tracing::warn!(
            target: "marketplace_messaging::conversation_aggregator::ensure_newest_first",
            "Message log is not newest-first (message {} is older than message {}), sorting",
            messages[position].id,
            messages[position + 1].id
        );
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    } else {
        tracing::warn!(
            target: "marketplace_messaging::conversation_aggregator::ensure_newest_first",
            "Message log is not newest-first at index {}, using input order as given",
            position
        );
    }

    messages
}

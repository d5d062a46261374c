//! Latest-message-per-counterparty projection over an account's messages.
//!
//! Nothing here is persisted: summaries are recomputed from the message
//! store on every request.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use tradelink_types::api::ConversationSummary;
use tradelink_types::models::{AccountProfile, Message};

/// Reduce `messages` (all involving `account`) to the most recent one per
/// counterparty, most recently active conversation first.
///
/// Input order does not matter. Among messages with an equal `created_at`,
/// the one appearing first in `messages` wins, so callers that pass rows in
/// store order (newest first, insertion order on ties) get a stable result.
pub fn latest_per_counterparty(account: Uuid, messages: Vec<Message>) -> Vec<Message> {
    let mut ordered = messages;
    // Stable: equal timestamps keep their incoming relative order.
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut latest: Vec<Message> = Vec::new();
    for message in ordered {
        if !message.involves(account) {
            continue;
        }
        if seen.insert(message.counterparty_of(account)) {
            latest.push(message);
        }
    }

    // Group heads were taken in descending order already; sort again so the
    // output order does not depend on how grouping is implemented.
    latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    latest
}

/// Attach each counterparty's display identity. A counterparty that cannot
/// be resolved still gets a summary, with `participant` left empty.
pub fn summarize(
    account: Uuid,
    latest: Vec<Message>,
    profiles: &HashMap<Uuid, AccountProfile>,
) -> Vec<ConversationSummary> {
    latest
        .into_iter()
        .map(|last_message| {
            let counterparty_id = last_message.counterparty_of(account);
            ConversationSummary {
                counterparty_id,
                participant: profiles.get(&counterparty_id).cloned(),
                last_message,
            }
        })
        .collect()
}

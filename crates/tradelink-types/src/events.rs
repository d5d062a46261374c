use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageView;

/// Events pushed to relay clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayEvent {
    /// The connection is authenticated and bound to this account
    #[serde(rename_all = "camelCase")]
    Ready { account_id: Uuid },

    /// A message was persisted
    #[serde(rename_all = "camelCase")]
    MessageCreate { message: MessageView },

    /// The recipient read a message
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: Uuid,
        reader_id: Uuid,
        updated_at: DateTime<Utc>,
    },

    /// A party deleted a message
    #[serde(rename_all = "camelCase")]
    MessageDelete { message_id: Uuid, deleted_by: Uuid },
}

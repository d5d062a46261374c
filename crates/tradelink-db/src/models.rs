//! Database row types. These map directly to SQLite rows and are converted
//! into `tradelink-types` models at the edge.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tradelink_types::models::{AccountProfile, Message, Role};

pub struct AccountRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fixed-width RFC 3339 so that lexical order in SQLite is chronological.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?;
    Ok(ts.with_timezone(&Utc))
}

impl AccountRow {
    pub fn to_profile(&self) -> Result<AccountProfile> {
        Ok(AccountProfile {
            id: self.id.parse::<Uuid>().with_context(|| format!("corrupt account id '{}'", self.id))?,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.parse::<Role>().map_err(anyhow::Error::msg)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id.parse().with_context(|| format!("corrupt message id '{}'", row.id))?,
            sender_id: row
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message '{}'", row.id))?,
            recipient_id: row
                .recipient_id
                .parse()
                .with_context(|| format!("corrupt recipient_id on message '{}'", row.id))?,
            content: row.content,
            read: row.read,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let (fa, fb, fc) = (format_timestamp(a), format_timestamp(b), format_timestamp(c));
        assert!(fa < fb && fb < fc);
        assert_eq!(fa.len(), fc.len());
        assert_eq!(parse_timestamp(&fb).unwrap(), b);
    }
}

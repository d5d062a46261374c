use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{SubsecRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use tradelink_db::{AccountRow, Database, format_timestamp};
use tradelink_types::api::{DataResponse, MessageView, SendMessageRequest, StatusResponse};
use tradelink_types::events::RelayEvent;
use tradelink_types::models::{AccountProfile, Message};

use crate::conversations::{latest_per_counterparty, summarize};
use crate::error::{ApiError, ApiResult};
use crate::middleware::Claims;
use crate::state::{AppState, run_blocking};

/// Upper bound on message length, counted in characters after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidArgument(format!("Invalid {} ID", what)))
}

fn profiles_by_id(rows: Vec<AccountRow>) -> anyhow::Result<HashMap<Uuid, AccountProfile>> {
    rows.iter()
        .map(|row| row.to_profile().map(|p| (p.id, p)))
        .collect()
}

fn load_messages(rows: Vec<tradelink_db::MessageRow>) -> anyhow::Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn view(message: Message, profiles: &HashMap<Uuid, AccountProfile>) -> MessageView {
    MessageView {
        sender: profiles.get(&message.sender_id).cloned(),
        recipient: profiles.get(&message.recipient_id).cloned(),
        message,
    }
}

/// POST /api/v1/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let recipient_id = parse_id(&req.recipient_id, "recipient")?;
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::InvalidArgument("Message content is required".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::InvalidArgument(format!(
            "Message content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    if recipient_id == claims.sub {
        return Err(ApiError::InvalidArgument("Cannot send a message to yourself".into()));
    }

    // Stored with microsecond precision; truncate so the response matches.
    let now = Utc::now().trunc_subsecs(6);
    let message = Message {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        recipient_id,
        content,
        read: false,
        created_at: now,
        updated_at: now,
    };

    let to_insert = message.clone();
    let profiles = run_blocking(&state, move |db| {
        let rows = db.get_accounts_by_ids(&[
            to_insert.sender_id.to_string(),
            to_insert.recipient_id.to_string(),
        ])?;
        let profiles = profiles_by_id(rows)?;
        if !profiles.contains_key(&to_insert.recipient_id) {
            return Ok(None);
        }

        db.insert_message(
            &to_insert.id.to_string(),
            &to_insert.sender_id.to_string(),
            &to_insert.recipient_id.to_string(),
            &to_insert.content,
            &format_timestamp(to_insert.created_at),
        )?;
        Ok(Some(profiles))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Recipient not found".into()))?;

    debug!("{} -> {} message {}", message.sender_id, message.recipient_id, message.id);

    let created = view(message, &profiles);
    state
        .dispatcher
        .publish(
            &[created.message.sender_id, created.message.recipient_id],
            RelayEvent::MessageCreate { message: created.clone() },
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new("Message sent successfully", created)),
    ))
}

/// GET /api/v1/messages/conversation/{user_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let counterparty = parse_id(&user_id, "user")?;
    let actor = claims.sub;

    let views = run_blocking(&state, move |db| {
        let messages = load_messages(db.get_conversation(&actor.to_string(), &counterparty.to_string())?)?;
        let profiles = profiles_by_id(
            db.get_accounts_by_ids(&[actor.to_string(), counterparty.to_string()])?,
        )?;
        Ok(messages
            .into_iter()
            .map(|m| view(m, &profiles))
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(DataResponse::new("Conversation retrieved successfully", views)))
}

/// GET /api/v1/messages
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.sub;

    let summaries = run_blocking(&state, move |db| {
        let messages = load_messages(db.get_messages_for_participant(&actor.to_string())?)?;
        let latest = latest_per_counterparty(actor, messages);

        let counterparty_ids: Vec<String> = latest
            .iter()
            .map(|m| m.counterparty_of(actor).to_string())
            .collect();
        let profiles = profiles_by_id(db.get_accounts_by_ids(&counterparty_ids)?)?;

        Ok(summarize(actor, latest, &profiles))
    })
    .await?;

    Ok(Json(DataResponse::new("Conversations retrieved successfully", summaries)))
}

enum ReadOutcome {
    Missing,
    NotRecipient,
    Read { message: Message, changed: bool },
}

fn mark_read_in(db: &Database, message_id: Uuid, actor: Uuid) -> anyhow::Result<ReadOutcome> {
    let id = message_id.to_string();
    let Some(row) = db.get_message(&id)? else {
        return Ok(ReadOutcome::Missing);
    };
    let mut message = Message::try_from(row)?;

    if message.recipient_id != actor {
        return Ok(ReadOutcome::NotRecipient);
    }
    if message.read {
        return Ok(ReadOutcome::Read { message, changed: false });
    }

    let now = Utc::now().trunc_subsecs(6);
    if db.mark_message_read(&id, &actor.to_string(), &format_timestamp(now))? {
        message.read = true;
        message.updated_at = now;
        return Ok(ReadOutcome::Read { message, changed: true });
    }

    // Lost a race with another read or a delete; report what is stored now.
    match db.get_message(&id)? {
        Some(row) => Ok(ReadOutcome::Read { message: Message::try_from(row)?, changed: false }),
        None => Ok(ReadOutcome::Missing),
    }
}

/// PATCH /api/v1/messages/{message_id}/read
///
/// Only the recipient may mark a message read. Repeating the call on a read
/// message succeeds without touching `updatedAt`.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = parse_id(&message_id, "message")?;
    let actor = claims.sub;

    let outcome = run_blocking(&state, move |db| mark_read_in(db, message_id, actor)).await?;

    let message = match outcome {
        ReadOutcome::Missing => return Err(ApiError::NotFound("Message not found".into())),
        ReadOutcome::NotRecipient => {
            return Err(ApiError::Forbidden(
                "You are not authorized to perform this action".into(),
            ));
        }
        ReadOutcome::Read { message, changed } => {
            if changed {
                state
                    .dispatcher
                    .publish(
                        &[message.sender_id, message.recipient_id],
                        RelayEvent::MessageRead {
                            message_id: message.id,
                            reader_id: actor,
                            updated_at: message.updated_at,
                        },
                    )
                    .await;
            }
            message
        }
    };

    Ok(Json(DataResponse::new("Message marked as read", message)))
}

/// DELETE /api/v1/messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = parse_id(&message_id, "message")?;
    let actor = claims.sub;

    let message = run_blocking(&state, move |db| {
        db.get_message(&message_id.to_string())?
            .map(Message::try_from)
            .transpose()
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;

    if !message.involves(actor) {
        return Err(ApiError::Forbidden(
            "You are not authorized to perform this action".into(),
        ));
    }

    let deleted = run_blocking(&state, move |db| {
        db.delete_message(&message_id.to_string(), &actor.to_string())
    })
    .await?;
    if !deleted {
        return Err(ApiError::NotFound("Message not found".into()));
    }

    info!("{} deleted message {}", actor, message_id);

    state
        .dispatcher
        .publish(
            &[message.sender_id, message.recipient_id],
            RelayEvent::MessageDelete {
                message_id,
                deleted_by: actor,
            },
        )
        .await;

    Ok(Json(StatusResponse {
        message: "Message deleted successfully".into(),
    }))
}

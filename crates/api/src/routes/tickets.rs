//! Ticket REST handlers
//!
//! Thin layer over the synchronizer: extract identity, deserialize, call
//! the shared operation. Mutations broadcast to rooms through the
//! synchronizer, so REST callers and socket subscribers observe the same
//! committed state.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use fleetdesk_shared::TicketStatus;

use crate::auth::{DisplayName, Identity};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::messages::{MessagePage, NewAttachment, TicketMessage};
use crate::store::tickets::{
    self, StatusHistoryEntry, Ticket, TicketFilter, TicketNote, TicketPage, TicketStats,
};
use crate::sync::{NewTicket, SendMessage, UpdateTicket};

pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<NewTicket>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let ticket = state.sync.create_ticket(&identity, payload).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<TicketFilter>,
) -> ApiResult<Json<TicketPage>> {
    let scope = match identity {
        Identity::Admin(_) => None,
        Identity::Business(id) => Some(id),
        Identity::Courier(_) => return Err(ApiError::Forbidden),
    };
    let page = tickets::list(&state.pool, scope, &filter).await?;
    Ok(Json(page))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.sync.get_ticket(&identity, ticket_id).await?;
    Ok(Json(ticket))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<UpdateTicket>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.sync.update_ticket(&identity, ticket_id, payload).await?;
    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.sync.delete_ticket(&identity, ticket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TicketStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state
        .sync
        .update_status(&identity, ticket_id, body.status)
        .await?;
    Ok(Json(ticket))
}

pub async fn ticket_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Vec<StatusHistoryEntry>>> {
    state.sync.get_ticket(&identity, ticket_id).await?;
    let history = tickets::history(&state.pool, ticket_id).await?;
    Ok(Json(history))
}

// =============================================================================
// Internal notes (admin only)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub body: String,
}

pub async fn add_note(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<NoteBody>,
) -> ApiResult<(StatusCode, Json<TicketNote>)> {
    let Identity::Admin(admin_id) = identity else {
        return Err(ApiError::Forbidden);
    };
    if body.body.trim().is_empty() {
        return Err(ApiError::Validation("Note body is required".to_string()));
    }
    state.sync.get_ticket(&identity, ticket_id).await?;
    let note = tickets::add_note(&state.pool, ticket_id, admin_id, body.body.trim()).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TicketNote>>> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }
    state.sync.get_ticket(&identity, ticket_id).await?;
    let notes = tickets::list_notes(&state.pool, ticket_id).await?;
    Ok(Json(notes))
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Fetching the thread also marks it read for the caller's party, so a
/// panel that merely opens a ticket clears its badge without a second call.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<MessagePage>> {
    state.sync.get_ticket(&identity, ticket_id).await?;

    let page = crate::store::messages::list(
        &state.pool,
        ticket_id,
        identity.is_admin(),
        query.page.unwrap_or(1),
        query.limit.unwrap_or(100),
    )
    .await?;

    state.sync.mark_read(&identity, ticket_id).await?;

    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(DisplayName(name)): Extension<DisplayName>,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<SendMessage>,
) -> ApiResult<(StatusCode, Json<TicketMessage>)> {
    let message = state
        .sync
        .send_message(&identity, &name, ticket_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct AttachmentsBody {
    pub attachments: Vec<NewAttachment>,
}

pub async fn add_attachments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((ticket_id, message_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AttachmentsBody>,
) -> ApiResult<Json<TicketMessage>> {
    let message = state
        .sync
        .append_attachments(&identity, ticket_id, message_id, body.attachments)
        .await?;
    Ok(Json(message))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.sync.mark_read(&identity, ticket_id).await?;
    Ok(Json(serde_json::json!({ "marked_read": count })))
}

// =============================================================================
// Rating & stats
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RatingBody {
    pub rating: i16,
}

pub async fn rate_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<RatingBody>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state
        .sync
        .rate_ticket(&identity, ticket_id, body.rating)
        .await?;
    Ok(Json(ticket))
}

pub async fn ticket_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<TicketStats>> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let stats = tickets::stats(&state.pool).await?;
    Ok(Json(stats))
}

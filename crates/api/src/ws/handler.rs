//! WebSocket gateway
//!
//! Authenticates the handshake, parks each connection in its default rooms,
//! and dispatches client events. Per-event failures are answered with a
//! scoped error event; the connection itself stays open.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use fleetdesk_shared::{rooms, ActorKind};

use crate::auth::{Credentials, Identity};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::couriers;
use crate::sync::SendMessage;

use super::connection::Connection;
use super::events::{ClientEvent, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token for mobile/API callers
    token: Option<String>,
    /// Panel flag for browser callers authenticating via session cookie
    panel: Option<String>,
}

/// Upgrade handler. Authentication happens before the upgrade so an
/// unauthenticated handshake gets a proper 401 instead of a dead socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let creds = match &query.token {
        Some(token) => Credentials::bearer(token.clone()),
        None => Credentials::from_headers(&headers, query.panel.as_deref()),
    };
    let (identity, name) = state.resolver.resolve_named(&creds)?;
    let display_name = name.unwrap_or_else(|| default_display_name(identity.kind()).to_string());

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity, display_name)))
}

fn default_display_name(kind: ActorKind) -> &'static str {
    match kind {
        ActorKind::Business => "Business",
        ActorKind::Admin => "Support Team",
        ActorKind::Courier => "Courier",
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity, display_name: String) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = Arc::new(Connection::new(session_id, identity, display_name, tx));

    tracing::info!(
        session_id = %session_id,
        kind = identity.kind().as_str(),
        actor_id = %identity.id(),
        "WebSocket connected"
    );

    let (mut sink, mut stream) = socket.split();

    // Writer half: drain the outbound queue onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    join_default_rooms(&state, &conn).await;
    let _ = conn.send(ServerEvent::Connected { session_id });

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => handle_event(&state, &conn, event).await,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Unparseable client event");
                let _ = conn.send(ServerEvent::Error {
                    message: "Unrecognized event".to_string(),
                    ticket_id: None,
                });
            }
        }
    }

    // Teardown: leave every room, cancel typing expiry tasks, announce
    // courier departure.
    state.rooms.remove_connection(session_id).await;
    conn.clear_all_typing_timers().await;
    if let Identity::Courier(courier_id) = identity {
        if couriers::upsert_availability(&state.pool, courier_id, false)
            .await
            .is_ok()
        {
            state
                .broadcaster
                .broadcast(
                    rooms::ADMINS,
                    ServerEvent::CourierStatusUpdate {
                        courier_id,
                        is_available: false,
                    },
                )
                .await;
        }
    }
    writer.abort();

    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// Every connection lands in the rooms its identity entitles it to; ticket
/// rooms are joined explicitly afterwards.
async fn join_default_rooms(state: &AppState, conn: &Arc<Connection>) {
    match conn.identity {
        Identity::Business(id) => {
            state.rooms.join(&rooms::business(id), Arc::clone(conn)).await;
        }
        Identity::Admin(_) => {
            state.rooms.join(rooms::ADMINS, Arc::clone(conn)).await;
            state
                .rooms
                .join(rooms::ADMIN_BROADCAST, Arc::clone(conn))
                .await;

            // Bootstrap the admin map with the last known courier positions.
            match couriers::snapshot(&state.pool).await {
                Ok(couriers) => {
                    let _ = conn.send(ServerEvent::CourierSnapshot { couriers });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load courier snapshot");
                }
            }
        }
        Identity::Courier(id) => {
            state.rooms.join(&rooms::courier(id), Arc::clone(conn)).await;
            if couriers::upsert_availability(&state.pool, id, true).await.is_ok() {
                state
                    .broadcaster
                    .broadcast(
                        rooms::ADMINS,
                        ServerEvent::CourierStatusUpdate {
                            courier_id: id,
                            is_available: true,
                        },
                    )
                    .await;
            }
        }
    }
}

async fn handle_event(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) {
    match event {
        ClientEvent::JoinTicket { ticket_id } => {
            // Access is checked on join; room membership alone then gates
            // delivery for the life of the subscription.
            match state.sync.get_ticket(&conn.identity, ticket_id).await {
                Ok(_) => {
                    state
                        .rooms
                        .join(&rooms::ticket(ticket_id), Arc::clone(conn))
                        .await;
                }
                Err(e) => send_scoped_error(conn, ticket_id, &e),
            }
        }

        ClientEvent::LeaveTicket { ticket_id } => {
            state
                .rooms
                .leave(&rooms::ticket(ticket_id), conn.session_id)
                .await;
            conn.clear_typing_timer(ticket_id).await;
        }

        ClientEvent::TicketTyping {
            ticket_id,
            is_typing,
        } => handle_typing(state, conn, ticket_id, is_typing).await,

        ClientEvent::SendTicketMessage {
            ticket_id,
            body,
            kind,
            reply_to,
            is_internal,
            attachments,
            attachment_url,
        } => {
            let payload = SendMessage {
                body,
                kind,
                reply_to,
                is_internal,
                attachments,
                attachment_url,
            };
            if let Err(e) = state
                .sync
                .send_message(&conn.identity, &conn.display_name, ticket_id, payload)
                .await
            {
                send_scoped_error(conn, ticket_id, &e);
            }
            // The sender receives the message through the room broadcast
            // like everyone else.
        }

        ClientEvent::MarkMessagesRead { ticket_id } => {
            if let Err(e) = state.sync.mark_read(&conn.identity, ticket_id).await {
                send_scoped_error(conn, ticket_id, &e);
            }
        }

        ClientEvent::UpdateTicketStatus { ticket_id, status } => {
            if let Err(e) = state
                .sync
                .update_status(&conn.identity, ticket_id, status)
                .await
            {
                send_scoped_error(conn, ticket_id, &e);
            }
        }

        ClientEvent::LocationUpdate {
            latitude,
            longitude,
        } => {
            let Identity::Courier(courier_id) = conn.identity else {
                let _ = conn.send(ServerEvent::Error {
                    message: "Only couriers report location".to_string(),
                    ticket_id: None,
                });
                return;
            };
            match couriers::upsert_location(&state.pool, courier_id, latitude, longitude).await {
                Ok(()) => {
                    state
                        .broadcaster
                        .broadcast(
                            rooms::ADMINS,
                            ServerEvent::CourierLocationUpdate {
                                courier_id,
                                latitude,
                                longitude,
                            },
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(courier_id = %courier_id, error = %e, "Location upsert failed");
                }
            }
        }

        ClientEvent::StatusUpdate { is_available } => {
            let Identity::Courier(courier_id) = conn.identity else {
                let _ = conn.send(ServerEvent::Error {
                    message: "Only couriers report availability".to_string(),
                    ticket_id: None,
                });
                return;
            };
            match couriers::upsert_availability(&state.pool, courier_id, is_available).await {
                Ok(()) => {
                    state
                        .broadcaster
                        .broadcast(
                            rooms::ADMINS,
                            ServerEvent::CourierStatusUpdate {
                                courier_id,
                                is_available,
                            },
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(courier_id = %courier_id, error = %e, "Availability upsert failed");
                }
            }
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

/// Typing indicators fan out to the ticket room, excluding the typist. A
/// `true` indicator arms a server-side expiry so a crashed client cannot
/// leave a ghost indicator behind.
///
/// Access is re-validated here even though joining the room already checked
/// it: typing events name an arbitrary ticket, so without the check any
/// authenticated caller could plant indicators in rooms it never joined.
async fn handle_typing(state: &AppState, conn: &Arc<Connection>, ticket_id: Uuid, is_typing: bool) {
    if let Err(e) = state.sync.get_ticket(&conn.identity, ticket_id).await {
        send_scoped_error(conn, ticket_id, &e);
        return;
    }

    let event = ServerEvent::UserTyping {
        ticket_id,
        user_id: conn.identity.id(),
        user_name: conn.display_name.clone(),
        is_typing,
    };
    state
        .broadcaster
        .broadcast_except(&rooms::ticket(ticket_id), event, conn.session_id)
        .await;

    if is_typing {
        let broadcaster = state.broadcaster.clone();
        let expiry = Duration::from_secs(state.config.typing_expiry_secs);
        let stop = ServerEvent::UserTyping {
            ticket_id,
            user_id: conn.identity.id(),
            user_name: conn.display_name.clone(),
            is_typing: false,
        };
        let session_id = conn.session_id;

        let task = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            broadcaster
                .broadcast_except(&rooms::ticket(ticket_id), stop, session_id)
                .await;
        });
        conn.set_typing_timer(ticket_id, task).await;
    } else {
        conn.clear_typing_timer(ticket_id).await;
    }
}

fn send_scoped_error(conn: &Arc<Connection>, ticket_id: Uuid, err: &ApiError) {
    let _ = conn.send(ServerEvent::Error {
        message: err.to_string(),
        ticket_id: Some(ticket_id),
    });
}

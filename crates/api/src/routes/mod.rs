//! HTTP routing

pub mod health;
pub mod tickets;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_auth;
use crate::state::AppState;
use crate::ws;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tickets", post(tickets::create_ticket).get(tickets::list_tickets))
        .route("/tickets/stats", get(tickets::ticket_stats))
        .route(
            "/tickets/:id",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route("/tickets/:id/status", patch(tickets::update_status))
        .route("/tickets/:id/history", get(tickets::ticket_history))
        .route("/tickets/:id/notes", get(tickets::list_notes).post(tickets::add_note))
        .route(
            "/tickets/:id/messages",
            get(tickets::list_messages).post(tickets::send_message),
        )
        .route(
            "/tickets/:id/messages/:message_id/attachments",
            post(tickets::add_attachments),
        )
        .route("/tickets/:id/read", post(tickets::mark_read))
        .route("/tickets/:id/rating", post(tickets::rate_ticket))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(ws::handler::ws_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(state.config.cors_origin.as_deref()))
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

//! Health check

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness plus a database round-trip and current room occupancy.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "rooms": state.rooms.room_count().await,
    }))
}

//! Courier presence store
//!
//! Durable shadow of courier location and availability so newly connected
//! admin panels can bootstrap their map without waiting for the next
//! heartbeat from every courier.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiResult;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourierPresence {
    pub id: Uuid,
    pub display_name: String,
    pub is_available: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub located_at: Option<OffsetDateTime>,
}

pub async fn upsert_location(
    pool: &PgPool,
    courier_id: Uuid,
    latitude: f64,
    longitude: f64,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO couriers (id, latitude, longitude, located_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        ON CONFLICT (id) DO UPDATE
        SET latitude = $2, longitude = $3, located_at = NOW(), updated_at = NOW()
        "#,
    )
    .bind(courier_id)
    .bind(latitude)
    .bind(longitude)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_availability(
    pool: &PgPool,
    courier_id: Uuid,
    is_available: bool,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO couriers (id, is_available, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (id) DO UPDATE
        SET is_available = $2, updated_at = NOW()
        "#,
    )
    .bind(courier_id)
    .bind(is_available)
    .execute(pool)
    .await?;
    Ok(())
}

/// Snapshot of couriers with a known position, for admin bootstrap.
pub async fn snapshot(pool: &PgPool) -> ApiResult<Vec<CourierPresence>> {
    Ok(sqlx::query_as(
        r#"
        SELECT id, display_name, is_available, latitude, longitude, located_at
        FROM couriers
        WHERE located_at IS NOT NULL
        ORDER BY updated_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?)
}

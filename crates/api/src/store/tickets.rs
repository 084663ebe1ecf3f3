//! Ticket Store
//!
//! Persistence and invariant enforcement for tickets: status history,
//! unread counters, assignment, rating, internal notes, statistics.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use fleetdesk_shared::{Party, TicketCategory, TicketPriority, TicketStatus};

use crate::error::{ApiError, ApiResult};

/// Columns fetched for every ticket read. Kept in one place so the row
/// shape and the struct below cannot drift apart.
pub(crate) const TICKET_COLUMNS: &str = r#"
    id, ticket_number, business_id, subject, description, category, priority,
    status, order_number, tags, assigned_to, rating, rated_at,
    resolved_at, resolved_by, closed_at, closed_by, first_response_at,
    last_message_at, last_message_by, unread_business, unread_admin,
    created_at, updated_at
"#;

/// The canonical ticket representation: persisted row, API response, and
/// broadcast payload are all this one struct.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub business_id: Uuid,
    pub subject: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub order_number: Option<String>,
    pub tags: Vec<String>,
    pub assigned_to: Option<Uuid>,
    pub rating: Option<i16>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    pub closed_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_response_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    pub last_message_by: Option<Party>,
    pub unread_business: i32,
    pub unread_admin: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One append-only status history record.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusHistoryEntry {
    pub status: TicketStatus,
    pub changed_by_kind: Party,
    pub changed_by_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub changed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TicketNote {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Ticket Numbers
// =============================================================================

const TICKET_NUMBER_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a ticket number: `TKT-<millis base36>-<3 random chars>`.
///
/// Monotonic-ish by construction (millisecond prefix) and collision-free in
/// practice; the unique constraint plus an insert retry covers the rest.
pub fn generate_ticket_number() -> String {
    let millis = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u128;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..3)
        .map(|_| TICKET_NUMBER_ALPHABET[rng.gen_range(0..TICKET_NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("TKT-{}-{}", to_base36(millis), suffix)
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(TICKET_NUMBER_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// =============================================================================
// Queries
// =============================================================================

/// Insert a new ticket in `new` status with its initial history entry.
///
/// Retries once on a ticket-number collision.
pub async fn insert(
    pool: &PgPool,
    business_id: Uuid,
    subject: &str,
    description: &str,
    category: TicketCategory,
    priority: TicketPriority,
    order_number: Option<&str>,
    tags: &[String],
) -> ApiResult<Ticket> {
    for attempt in 0..2 {
        let number = generate_ticket_number();
        let mut tx = pool.begin().await?;

        let result = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            INSERT INTO tickets (ticket_number, business_id, subject, description,
                                 category, priority, order_number, tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(&number)
        .bind(business_id)
        .bind(subject)
        .bind(description)
        .bind(category)
        .bind(priority)
        .bind(order_number)
        .bind(tags)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok(ticket) => {
                append_history(
                    &mut tx,
                    ticket.id,
                    TicketStatus::New,
                    Party::Business,
                    Some(business_id),
                )
                .await?;
                tx.commit().await?;
                return Ok(ticket);
            }
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                tracing::warn!(number = %number, attempt, "Ticket number collision, retrying");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Internal)
}

/// Fetch a ticket by id.
pub async fn fetch(pool: &PgPool, ticket_id: Uuid) -> ApiResult<Ticket> {
    sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
    ))
    .bind(ticket_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound)
}

/// List query parameters for the ticket index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
    pub priority: Option<TicketPriority>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort: TicketSort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSort {
    #[default]
    CreatedAt,
    LastMessage,
    Priority,
}

impl TicketSort {
    fn order_clause(&self) -> &'static str {
        match self {
            TicketSort::CreatedAt => "created_at DESC",
            TicketSort::LastMessage => "last_message_at DESC NULLS LAST, created_at DESC",
            TicketSort::Priority => {
                "CASE priority WHEN 'urgent' THEN 1 WHEN 'high' THEN 2 \
                 WHEN 'medium' THEN 3 ELSE 4 END, created_at DESC"
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// List tickets. `business_scope` restricts the listing to one tenant;
/// admins pass `None` and see everything.
pub async fn list(
    pool: &PgPool,
    business_scope: Option<Uuid>,
    filter: &TicketFilter,
) -> ApiResult<TicketPage> {
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * limit;

    let where_clause = r#"
        ($1::uuid IS NULL OR business_id = $1)
        AND ($2::varchar IS NULL OR status = $2)
        AND ($3::varchar IS NULL OR category = $3)
        AND ($4::varchar IS NULL OR priority = $4)
        AND ($5::text IS NULL
             OR subject ILIKE '%' || $5 || '%'
             OR ticket_number ILIKE '%' || $5 || '%'
             OR description ILIKE '%' || $5 || '%')
    "#;

    let tickets = sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE {where_clause} ORDER BY {} LIMIT $6 OFFSET $7",
        filter.sort.order_clause()
    ))
    .bind(business_scope)
    .bind(filter.status)
    .bind(filter.category)
    .bind(filter.priority)
    .bind(&filter.search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM tickets WHERE {where_clause}"
    ))
    .bind(business_scope)
    .bind(filter.status)
    .bind(filter.category)
    .bind(filter.priority)
    .bind(&filter.search)
    .fetch_one(pool)
    .await?;

    Ok(TicketPage {
        tickets,
        total,
        page,
        limit,
    })
}

/// Append a status history record inside the caller's transaction. History
/// is append-only; nothing in the codebase updates or deletes these rows.
pub async fn append_history(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    status: TicketStatus,
    changed_by_kind: Party,
    changed_by_id: Option<Uuid>,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ticket_status_history (ticket_id, status, changed_by_kind, changed_by_id)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(ticket_id)
    .bind(status)
    .bind(changed_by_kind)
    .bind(changed_by_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn history(pool: &PgPool, ticket_id: Uuid) -> ApiResult<Vec<StatusHistoryEntry>> {
    Ok(sqlx::query_as(
        r#"
        SELECT status, changed_by_kind, changed_by_id, changed_at
        FROM ticket_status_history
        WHERE ticket_id = $1
        ORDER BY changed_at ASC, id ASC
        "#,
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?)
}

pub async fn add_note(
    pool: &PgPool,
    ticket_id: Uuid,
    author_id: Uuid,
    body: &str,
) -> ApiResult<TicketNote> {
    Ok(sqlx::query_as(
        r#"
        INSERT INTO ticket_notes (ticket_id, author_id, body)
        VALUES ($1, $2, $3)
        RETURNING id, ticket_id, author_id, body, created_at
        "#,
    )
    .bind(ticket_id)
    .bind(author_id)
    .bind(body)
    .fetch_one(pool)
    .await?)
}

pub async fn list_notes(pool: &PgPool, ticket_id: Uuid) -> ApiResult<Vec<TicketNote>> {
    Ok(sqlx::query_as(
        r#"
        SELECT id, ticket_id, author_id, body, created_at
        FROM ticket_notes
        WHERE ticket_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?)
}

/// Hard-delete a ticket; messages, receipts, history, and notes cascade.
pub async fn delete(pool: &PgPool, ticket_id: Uuid) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Serialize, FromRow)]
pub struct TicketStats {
    pub total: i64,
    pub new: i64,
    pub open: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub closed: i64,
    pub reopened: i64,
    pub avg_first_response_hours: Option<f64>,
    pub avg_resolution_hours: Option<f64>,
}

pub async fn stats(pool: &PgPool) -> ApiResult<TicketStats> {
    Ok(sqlx::query_as(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status = 'new') AS new,
            COUNT(*) FILTER (WHERE status = 'open') AS open,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
            COUNT(*) FILTER (WHERE status = 'resolved') AS resolved,
            COUNT(*) FILTER (WHERE status = 'closed') AS closed,
            COUNT(*) FILTER (WHERE status = 'reopened') AS reopened,
            (AVG(EXTRACT(EPOCH FROM (first_response_at - created_at)) / 3600.0)
                FILTER (WHERE first_response_at IS NOT NULL))::float8 AS avg_first_response_hours,
            (AVG(EXTRACT(EPOCH FROM (resolved_at - created_at)) / 3600.0)
                FILTER (WHERE resolved_at IS NOT NULL))::float8 AS avg_resolution_hours
        FROM tickets
        "#,
    )
    .fetch_one(pool)
    .await?)
}

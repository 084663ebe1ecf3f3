//! Message Store
//!
//! Persistence for ticket messages, attachments, and read receipts. The
//! [`TicketMessage`] struct is the single wire shape: REST responses and
//! room broadcasts serialize the same value.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use fleetdesk_shared::{MessageKind, Party};

use crate::error::ApiResult;

pub(crate) const MESSAGE_COLUMNS: &str = r#"
    id, ticket_id, sender_kind, sender_id, sender_name, kind, body,
    is_internal, edited, deleted, reply_to, created_at
"#;

/// A persisted ticket message with its attachments.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_kind: Party,
    pub sender_id: Option<Uuid>,
    pub sender_name: String,
    pub kind: MessageKind,
    pub body: String,
    pub is_internal: bool,
    pub edited: bool,
    pub deleted: bool,
    pub reply_to: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Loaded in a second query; not part of the message row.
    #[sqlx(skip)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub kind: String,
    pub url: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub thumbnail_url: Option<String>,
}

/// Attachment payload as supplied by callers.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAttachment {
    #[serde(default = "default_attachment_kind")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

fn default_attachment_kind() -> String {
    "file".to_string()
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

/// Attribution for an inserted message.
#[derive(Debug, Clone)]
pub struct MessageSender {
    pub kind: Party,
    pub id: Option<Uuid>,
    pub name: String,
}

/// Insert a message row. Runs inside the caller's transaction so the
/// ticket-side effects (reopen, counters, stamps) commit atomically with it.
pub async fn insert(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    sender: &MessageSender,
    kind: MessageKind,
    body: &str,
    is_internal: bool,
    reply_to: Option<Uuid>,
) -> ApiResult<TicketMessage> {
    Ok(sqlx::query_as::<_, TicketMessage>(&format!(
        r#"
        INSERT INTO ticket_messages (ticket_id, sender_kind, sender_id, sender_name,
                                     kind, body, is_internal, reply_to)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(ticket_id)
    .bind(sender.kind)
    .bind(sender.id)
    .bind(&sender.name)
    .bind(kind)
    .bind(body)
    .bind(is_internal)
    .bind(reply_to)
    .fetch_one(conn)
    .await?)
}

/// Insert attachments for a message, returning them in insertion order.
pub async fn insert_attachments(
    conn: &mut PgConnection,
    message_id: Uuid,
    attachments: &[NewAttachment],
) -> ApiResult<Vec<Attachment>> {
    let mut out = Vec::with_capacity(attachments.len());
    for a in attachments {
        out.push(
            sqlx::query_as::<_, Attachment>(
                r#"
                INSERT INTO message_attachments (message_id, kind, url, filename,
                                                 size_bytes, mime_type, thumbnail_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, message_id, kind, url, filename, size_bytes, mime_type, thumbnail_url
                "#,
            )
            .bind(message_id)
            .bind(&a.kind)
            .bind(&a.url)
            .bind(&a.filename)
            .bind(a.size_bytes)
            .bind(&a.mime_type)
            .bind(&a.thumbnail_url)
            .fetch_one(&mut *conn)
            .await?,
        );
    }
    Ok(out)
}

/// Fetch a single message with its attachments.
pub async fn fetch(pool: &PgPool, message_id: Uuid) -> ApiResult<TicketMessage> {
    let mut message = sqlx::query_as::<_, TicketMessage>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE id = $1"
    ))
    .bind(message_id)
    .fetch_one(pool)
    .await?;

    message.attachments = sqlx::query_as(
        r#"
        SELECT id, message_id, kind, url, filename, size_bytes, mime_type, thumbnail_url
        FROM message_attachments
        WHERE message_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;

    Ok(message)
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<TicketMessage>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// List a ticket's messages in chronological order.
///
/// `include_internal` is false for business callers; internal admin notes
/// never cross the tenant boundary. Deleted messages keep their slot but
/// are returned with an empty body by the caller-facing masking below.
pub async fn list(
    pool: &PgPool,
    ticket_id: Uuid,
    include_internal: bool,
    page: i64,
    limit: i64,
) -> ApiResult<MessagePage> {
    let page = page.max(1);
    let limit = limit.clamp(1, 200);
    let offset = (page - 1) * limit;

    let mut messages = sqlx::query_as::<_, TicketMessage>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS} FROM ticket_messages
        WHERE ticket_id = $1 AND ($2 OR is_internal = FALSE)
        ORDER BY created_at ASC, id ASC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(ticket_id)
    .bind(include_internal)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ticket_messages WHERE ticket_id = $1 AND ($2 OR is_internal = FALSE)",
    )
    .bind(ticket_id)
    .bind(include_internal)
    .fetch_one(pool)
    .await?;

    // Batch-load attachments for the page.
    let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
    let attachments: Vec<Attachment> = sqlx::query_as(
        r#"
        SELECT id, message_id, kind, url, filename, size_bytes, mime_type, thumbnail_url
        FROM message_attachments
        WHERE message_id = ANY($1)
        ORDER BY created_at ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    for attachment in attachments {
        if let Some(message) = messages.iter_mut().find(|m| m.id == attachment.message_id) {
            message.attachments.push(attachment);
        }
    }

    for message in &mut messages {
        mask_deleted(message);
    }

    Ok(MessagePage {
        messages,
        total,
        page,
        limit,
    })
}

/// Deleted messages keep their position in the thread but expose no content.
fn mask_deleted(message: &mut TicketMessage) {
    if message.deleted {
        message.body.clear();
        message.attachments.clear();
    }
}

/// Record read receipts for every message in the ticket the party has not
/// yet read. Re-marking is a no-op thanks to the receipt primary key.
/// Returns the number of newly read messages.
pub async fn mark_read(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    party: Party,
    party_id: Uuid,
) -> ApiResult<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO message_reads (message_id, party_kind, party_id)
        SELECT id, $2, $3 FROM ticket_messages
        WHERE ticket_id = $1
          AND deleted = FALSE
          AND sender_kind <> $2
          AND ($2 <> 'business' OR is_internal = FALSE)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(ticket_id)
    .bind(party)
    .bind(party_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(deleted: bool) -> TicketMessage {
        TicketMessage {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            sender_kind: Party::Admin,
            sender_id: Some(Uuid::new_v4()),
            sender_name: "Support".to_string(),
            kind: MessageKind::Text,
            body: "hello".to_string(),
            is_internal: false,
            edited: false,
            deleted,
            reply_to: None,
            created_at: OffsetDateTime::now_utc(),
            attachments: vec![Attachment {
                id: Uuid::new_v4(),
                message_id: Uuid::new_v4(),
                kind: "image".to_string(),
                url: "https://cdn.example/x.png".to_string(),
                filename: "x.png".to_string(),
                size_bytes: 1024,
                mime_type: "image/png".to_string(),
                thumbnail_url: None,
            }],
        }
    }

    #[test]
    fn test_deleted_messages_are_masked() {
        let mut m = message(true);
        mask_deleted(&mut m);
        assert!(m.body.is_empty());
        assert!(m.attachments.is_empty());
        assert!(m.deleted);
    }

    #[test]
    fn test_live_messages_are_untouched() {
        let mut m = message(false);
        mask_deleted(&mut m);
        assert_eq!(m.body, "hello");
        assert_eq!(m.attachments.len(), 1);
    }

    #[test]
    fn test_new_attachment_defaults() {
        let a: NewAttachment =
            serde_json::from_str(r#"{"url": "https://cdn.example/doc"}"#).unwrap();
        assert_eq!(a.kind, "file");
        assert_eq!(a.mime_type, "application/octet-stream");
        assert_eq!(a.size_bytes, 0);
        assert!(a.filename.is_empty());
    }
}

//! Lifecycle synchronizer
//!
//! Every ticket mutation, whether it arrives over REST or over a socket,
//! funnels through this module. Each operation runs its persistence in a
//! single transaction whose updates evaluate the current row state, then
//! broadcasts the committed result. The value returned to the caller and
//! the value broadcast to rooms are the same struct, so the two surfaces
//! cannot drift.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use fleetdesk_shared::{rooms, MessageKind, Party, TicketCategory, TicketPriority, TicketStatus};

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::store::messages::{self, MessageSender, NewAttachment, TicketMessage};
use crate::store::tickets::{self, Ticket, TICKET_COLUMNS};
use crate::ws::broadcast::Broadcaster;
use crate::ws::events::ServerEvent;

const NOTICE_PREVIEW_CHARS: usize = 120;

#[derive(Clone)]
pub struct Synchronizer {
    pool: PgPool,
    broadcaster: Broadcaster,
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewTicket {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    #[serde(default, alias = "content")]
    pub body: String,
    #[serde(default, alias = "message_type", alias = "messageType")]
    pub kind: MessageKind,
    #[serde(default, alias = "replyTo")]
    pub reply_to: Option<Uuid>,
    #[serde(default, alias = "isInternal")]
    pub is_internal: bool,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
    /// Shorthand for a single attachment known only by URL
    #[serde(default, alias = "attachmentUrl")]
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTicket {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    /// Absent field leaves assignment alone; an explicit `null` unassigns.
    #[serde(default, deserialize_with = "present")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub internal_note: Option<String>,
}

/// Wraps a field's value so a missing field (outer `None`) can be told
/// apart from an explicit `null` (inner `None`).
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl UpdateTicket {
    /// Strip the admin-only fields from a business caller's update. Tags are
    /// the only field a tenant may edit on an existing ticket.
    pub fn masked_for_business(self) -> UpdateTicket {
        UpdateTicket {
            subject: None,
            priority: None,
            assigned_to: None,
            internal_note: None,
            tags: self.tags,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.tags.is_none()
            && self.internal_note.is_none()
    }
}

// =============================================================================
// Access
// =============================================================================

/// Admins see every ticket; a business only its own; couriers none.
fn ensure_access(identity: &Identity, ticket: &Ticket) -> ApiResult<()> {
    match identity {
        Identity::Admin(_) => Ok(()),
        Identity::Business(id) if *id == ticket.business_id => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

fn ensure_admin(identity: &Identity) -> ApiResult<Uuid> {
    match identity {
        Identity::Admin(id) => Ok(*id),
        _ => Err(ApiError::Forbidden),
    }
}

fn preview(body: &str) -> String {
    body.chars().take(NOTICE_PREVIEW_CHARS).collect()
}

async fn fetch_for_update(conn: &mut PgConnection, ticket_id: Uuid) -> ApiResult<Ticket> {
    sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE"
    ))
    .bind(ticket_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ApiError::NotFound)
}

// =============================================================================
// Operations
// =============================================================================

impl Synchronizer {
    pub fn new(pool: PgPool, broadcaster: Broadcaster) -> Self {
        Self { pool, broadcaster }
    }

    /// Open a new ticket for a business and announce it to admins.
    pub async fn create_ticket(&self, identity: &Identity, payload: NewTicket) -> ApiResult<Ticket> {
        let business_id = match identity {
            Identity::Business(id) => *id,
            _ => return Err(ApiError::Forbidden),
        };

        let subject = payload.subject.trim();
        if subject.is_empty() {
            return Err(ApiError::Validation("Subject is required".to_string()));
        }
        if subject.len() > 500 {
            return Err(ApiError::Validation(
                "Subject must be at most 500 characters".to_string(),
            ));
        }

        let ticket = tickets::insert(
            &self.pool,
            business_id,
            subject,
            &payload.description,
            payload.category,
            payload.priority,
            payload.order_number.as_deref(),
            &payload.tags,
        )
        .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            business_id = %business_id,
            "Ticket created"
        );

        self.broadcaster
            .broadcast(
                rooms::ADMINS,
                ServerEvent::NewTicket {
                    ticket: ticket.clone(),
                },
            )
            .await;

        Ok(ticket)
    }

    /// Fetch a ticket, enforcing tenancy.
    pub async fn get_ticket(&self, identity: &Identity, ticket_id: Uuid) -> ApiResult<Ticket> {
        let ticket = tickets::fetch(&self.pool, ticket_id).await?;
        ensure_access(identity, &ticket)?;
        Ok(ticket)
    }

    /// Post a message to a ticket.
    ///
    /// Side effects commit atomically with the message row: reopening a
    /// resolved or closed ticket, the recipient's unread counter, the
    /// last-message stamp, and the first-response stamp. Broadcasts go out
    /// only after the transaction commits.
    pub async fn send_message(
        &self,
        identity: &Identity,
        sender_name: &str,
        ticket_id: Uuid,
        payload: SendMessage,
    ) -> ApiResult<TicketMessage> {
        let mut attachments = payload.attachments;
        if let Some(url) = payload.attachment_url {
            attachments.push(NewAttachment {
                kind: "file".to_string(),
                url,
                filename: String::new(),
                size_bytes: 0,
                mime_type: "application/octet-stream".to_string(),
                thumbnail_url: None,
            });
        }

        if payload.body.trim().is_empty() && attachments.is_empty() {
            return Err(ApiError::Validation(
                "Message body or attachments required".to_string(),
            ));
        }

        // Couriers are not a ticket party and cannot post.
        let party = identity.party().ok_or(ApiError::Forbidden)?;
        let sender = MessageSender {
            kind: party,
            id: Some(identity.id()),
            name: sender_name.to_string(),
        };
        // Only admins can write internal notes into the thread.
        let is_internal = payload.is_internal && identity.is_admin();

        let mut tx = self.pool.begin().await?;

        let ticket = fetch_for_update(&mut tx, ticket_id).await?;
        ensure_access(identity, &ticket)?;

        let mut message = messages::insert(
            &mut tx,
            ticket_id,
            &sender,
            payload.kind,
            payload.body.trim(),
            is_internal,
            payload.reply_to,
        )
        .await?;
        if !attachments.is_empty() {
            message.attachments =
                messages::insert_attachments(&mut tx, message.id, &attachments).await?;
        }

        // A message on a resolved or closed ticket reopens it. Internal
        // notes count too: activity is activity.
        let reopened = ticket.status.reopens_on_message();

        sqlx::query(
            r#"
            UPDATE tickets SET
                status = CASE WHEN status IN ('resolved', 'closed') THEN 'reopened' ELSE status END,
                last_message_at = $2,
                last_message_by = $3,
                unread_business = unread_business
                    + CASE WHEN $3 = 'admin' AND NOT $4 THEN 1 ELSE 0 END,
                unread_admin = unread_admin
                    + CASE WHEN $3 = 'business' THEN 1 ELSE 0 END,
                first_response_at = CASE
                    WHEN first_response_at IS NULL AND $3 = 'admin' AND NOT $4 THEN $2
                    ELSE first_response_at
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(ticket_id)
        .bind(message.created_at)
        .bind(sender.kind)
        .bind(is_internal)
        .execute(&mut *tx)
        .await?;

        if reopened {
            tickets::append_history(&mut tx, ticket_id, TicketStatus::Reopened, sender.kind, sender.id)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            ticket_id = %ticket_id,
            message_id = %message.id,
            sender_kind = ?sender.kind,
            is_internal,
            reopened,
            "Message posted"
        );

        if is_internal {
            // Internal notes never cross the tenant boundary; the ticket
            // room may contain business connections.
            self.broadcaster
                .broadcast(
                    rooms::ADMINS,
                    ServerEvent::NewTicketMessage {
                        ticket_id,
                        message: message.clone(),
                    },
                )
                .await;
        } else {
            self.broadcaster
                .broadcast(
                    &rooms::ticket(ticket_id),
                    ServerEvent::NewTicketMessage {
                        ticket_id,
                        message: message.clone(),
                    },
                )
                .await;

            // Lightweight notice for the counterpart's top-level room so
            // panels not subscribed to this ticket can badge it.
            let notice = ServerEvent::NewMessageNotice {
                ticket_id,
                ticket_number: ticket.ticket_number.clone(),
                sender_kind: sender.kind,
                preview: preview(&message.body),
            };
            match sender.kind {
                Party::Business => self.broadcaster.broadcast(rooms::ADMINS, notice).await,
                Party::Admin | Party::System => {
                    self.broadcaster
                        .broadcast(&rooms::business(ticket.business_id), notice)
                        .await
                }
            }
        }

        if reopened {
            let status_event = ServerEvent::TicketStatusUpdated {
                ticket_id,
                status: TicketStatus::Reopened,
                changed_by: sender.kind,
            };
            self.broadcaster
                .broadcast(&rooms::ticket(ticket_id), status_event.clone())
                .await;
            self.broadcaster
                .broadcast(rooms::ADMINS, status_event)
                .await;
        }

        Ok(message)
    }

    /// Apply a status transition. Admin only; the transition graph is
    /// enforced against the row state read under lock, so two racing
    /// transitions serialize and the loser gets a conflict.
    pub async fn update_status(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        new_status: TicketStatus,
    ) -> ApiResult<Ticket> {
        let admin_id = ensure_admin(identity)?;

        let mut tx = self.pool.begin().await?;
        let ticket = fetch_for_update(&mut tx, ticket_id).await?;

        if !ticket.status.can_transition_to(new_status) {
            return Err(ApiError::Conflict(format!(
                "Cannot transition ticket from {} to {}",
                ticket.status.as_str(),
                new_status.as_str()
            )));
        }

        let updated = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets SET
                status = $2,
                resolved_at = CASE WHEN $2 = 'resolved' THEN NOW() ELSE resolved_at END,
                resolved_by = CASE WHEN $2 = 'resolved' THEN $3 ELSE resolved_by END,
                closed_at = CASE WHEN $2 = 'closed' THEN NOW() ELSE closed_at END,
                closed_by = CASE WHEN $2 = 'closed' THEN $3 ELSE closed_by END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(new_status)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tickets::append_history(&mut tx, ticket_id, new_status, Party::Admin, Some(admin_id))
            .await?;

        tx.commit().await?;

        tracing::info!(
            ticket_id = %ticket_id,
            from = ticket.status.as_str(),
            to = new_status.as_str(),
            admin_id = %admin_id,
            "Ticket status updated"
        );

        let event = ServerEvent::TicketStatusUpdated {
            ticket_id,
            status: new_status,
            changed_by: Party::Admin,
        };
        self.broadcaster
            .broadcast(&rooms::ticket(ticket_id), event.clone())
            .await;
        self.broadcaster.broadcast(rooms::ADMINS, event.clone()).await;
        self.broadcaster
            .broadcast(&rooms::business(updated.business_id), event)
            .await;

        Ok(updated)
    }

    /// Patch ticket fields. Business callers are masked down to the fields
    /// they own; status changes go through [`Self::update_status`].
    pub async fn update_ticket(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        payload: UpdateTicket,
    ) -> ApiResult<Ticket> {
        let payload = if identity.is_admin() {
            payload
        } else {
            payload.masked_for_business()
        };
        if payload.is_empty() {
            return self.get_ticket(identity, ticket_id).await;
        }

        let mut tx = self.pool.begin().await?;
        let ticket = fetch_for_update(&mut tx, ticket_id).await?;
        ensure_access(identity, &ticket)?;

        // COALESCE cannot express "set to NULL", so assignment carries its
        // own applied flag.
        let updated = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets SET
                subject = COALESCE($2, subject),
                priority = COALESCE($3, priority),
                assigned_to = CASE WHEN $5 THEN $4 ELSE assigned_to END,
                tags = COALESCE($6, tags),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(&payload.subject)
        .bind(payload.priority)
        .bind(payload.assigned_to.flatten())
        .bind(payload.assigned_to.is_some())
        .bind(&payload.tags)
        .fetch_one(&mut *tx)
        .await?;

        // Internal notes live beside the ticket, not in the message thread,
        // and never reopen it.
        if let Some(note) = &payload.internal_note {
            sqlx::query(
                "INSERT INTO ticket_notes (ticket_id, author_id, body) VALUES ($1, $2, $3)",
            )
            .bind(ticket_id)
            .bind(identity.id())
            .bind(note)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let event = ServerEvent::TicketUpdated {
            ticket: updated.clone(),
        };
        self.broadcaster
            .broadcast(&rooms::ticket(ticket_id), event.clone())
            .await;
        self.broadcaster.broadcast(rooms::ADMINS, event).await;

        Ok(updated)
    }

    /// Mark the whole thread read for the caller's party. Idempotent; the
    /// caller's unread counter zeroes in the same transaction as the
    /// receipts.
    pub async fn mark_read(&self, identity: &Identity, ticket_id: Uuid) -> ApiResult<u64> {
        let party = identity.party().ok_or(ApiError::Forbidden)?;

        let mut tx = self.pool.begin().await?;
        let ticket = fetch_for_update(&mut tx, ticket_id).await?;
        ensure_access(identity, &ticket)?;

        let count = messages::mark_read(&mut tx, ticket_id, party, identity.id()).await?;

        sqlx::query(
            r#"
            UPDATE tickets SET
                unread_business = CASE WHEN $2 = 'business' THEN 0 ELSE unread_business END,
                unread_admin = CASE WHEN $2 = 'admin' THEN 0 ELSE unread_admin END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(ticket_id)
        .bind(party)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if count > 0 {
            self.broadcaster
                .broadcast(
                    &rooms::ticket(ticket_id),
                    ServerEvent::MessagesRead {
                        ticket_id,
                        party,
                        count,
                    },
                )
                .await;
        }

        Ok(count)
    }

    /// Rate a resolved or closed ticket. One rating per ticket; re-rating
    /// is rejected rather than overwritten.
    pub async fn rate_ticket(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        rating: i16,
    ) -> ApiResult<Ticket> {
        if !(1..=5).contains(&rating) {
            return Err(ApiError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let ticket = fetch_for_update(&mut tx, ticket_id).await?;

        // Only the owning business rates its ticket.
        match identity {
            Identity::Business(id) if *id == ticket.business_id => {}
            _ => return Err(ApiError::Forbidden),
        }

        if !ticket.status.accepts_rating() {
            return Err(ApiError::Conflict(
                "Only resolved or closed tickets can be rated".to_string(),
            ));
        }
        if ticket.rating.is_some() {
            return Err(ApiError::Conflict(
                "Ticket has already been rated".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets SET rating = $2, rated_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(rating)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.broadcaster
            .broadcast(
                rooms::ADMINS,
                ServerEvent::TicketUpdated {
                    ticket: updated.clone(),
                },
            )
            .await;

        Ok(updated)
    }

    /// Delete a ticket and everything under it. Admin only.
    pub async fn delete_ticket(&self, identity: &Identity, ticket_id: Uuid) -> ApiResult<()> {
        ensure_admin(identity)?;
        let ticket = tickets::fetch(&self.pool, ticket_id).await?;
        tickets::delete(&self.pool, ticket_id).await?;

        tracing::info!(ticket_id = %ticket_id, "Ticket deleted");

        let event = ServerEvent::TicketDeleted { ticket_id };
        self.broadcaster
            .broadcast(&rooms::ticket(ticket_id), event.clone())
            .await;
        self.broadcaster.broadcast(rooms::ADMINS, event.clone()).await;
        self.broadcaster
            .broadcast(&rooms::business(ticket.business_id), event)
            .await;

        Ok(())
    }

    /// Attach files to an existing message.
    pub async fn append_attachments(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        message_id: Uuid,
        attachments: Vec<NewAttachment>,
    ) -> ApiResult<TicketMessage> {
        if attachments.is_empty() {
            return Err(ApiError::Validation("No attachments given".to_string()));
        }

        let ticket = tickets::fetch(&self.pool, ticket_id).await?;
        ensure_access(identity, &ticket)?;

        let mut tx = self.pool.begin().await?;
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT ticket_id FROM ticket_messages WHERE id = $1 FOR UPDATE")
                .bind(message_id)
                .fetch_optional(&mut *tx)
                .await?;
        if owner != Some(ticket_id) {
            return Err(ApiError::NotFound);
        }

        messages::insert_attachments(&mut tx, message_id, &attachments).await?;
        tx.commit().await?;

        let message = messages::fetch(&self.pool, message_id).await?;

        let room = if message.is_internal {
            rooms::ADMINS.to_string()
        } else {
            rooms::ticket(ticket_id)
        };
        self.broadcaster
            .broadcast(
                &room,
                ServerEvent::MessageUpdated {
                    ticket_id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_update_is_masked_to_tags() {
        let update = UpdateTicket {
            subject: Some("hijack".to_string()),
            priority: Some(TicketPriority::Urgent),
            assigned_to: Some(Some(Uuid::new_v4())),
            tags: Some(vec!["billing".to_string()]),
            internal_note: Some("note".to_string()),
        };

        let masked = update.masked_for_business();
        assert!(masked.subject.is_none());
        assert!(masked.priority.is_none());
        assert!(masked.assigned_to.is_none());
        assert!(masked.internal_note.is_none());
        assert_eq!(masked.tags.as_deref(), Some(&["billing".to_string()][..]));
    }

    #[test]
    fn test_empty_update_detection() {
        assert!(UpdateTicket::default().is_empty());
        let update = UpdateTicket {
            tags: Some(vec![]),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_access_rules() {
        let business_id = Uuid::new_v4();
        let ticket = sample_ticket(business_id);

        assert!(ensure_access(&Identity::Admin(Uuid::new_v4()), &ticket).is_ok());
        assert!(ensure_access(&Identity::Business(business_id), &ticket).is_ok());
        assert!(matches!(
            ensure_access(&Identity::Business(Uuid::new_v4()), &ticket),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            ensure_access(&Identity::Courier(Uuid::new_v4()), &ticket),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), NOTICE_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_assignment_distinguishes_null_from_absent() {
        // Absent field leaves assignment untouched.
        let update: UpdateTicket = serde_json::from_str(r#"{"priority": "high"}"#).unwrap();
        assert!(update.assigned_to.is_none());
        assert!(!update.is_empty());

        // Explicit null unassigns.
        let update: UpdateTicket = serde_json::from_str(r#"{"assigned_to": null}"#).unwrap();
        assert_eq!(update.assigned_to, Some(None));
        assert!(!update.is_empty());

        let update: UpdateTicket =
            serde_json::from_str(r#"{"assigned_to": "7a1e3f1a-9f42-4b6a-8c1d-2e91d1a0c111"}"#)
                .unwrap();
        assert!(matches!(update.assigned_to, Some(Some(_))));
    }

    #[test]
    fn test_send_message_legacy_aliases() {
        let payload: SendMessage = serde_json::from_str(
            r#"{"content": "photo", "messageType": "image",
                "attachmentUrl": "https://cdn.example/x.png"}"#,
        )
        .unwrap();
        assert_eq!(payload.body, "photo");
        assert_eq!(payload.kind, MessageKind::Image);
        assert_eq!(
            payload.attachment_url.as_deref(),
            Some("https://cdn.example/x.png")
        );
        assert!(payload.attachments.is_empty());
    }

    async fn db_sync() -> Synchronizer {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = fleetdesk_shared::db::create_pool(&url, 3)
            .await
            .expect("Failed to create pool");
        fleetdesk_shared::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Synchronizer::new(pool, Broadcaster::Silent)
    }

    fn new_ticket_payload() -> NewTicket {
        NewTicket {
            subject: "Late delivery".to_string(),
            description: "Order stuck at the depot".to_string(),
            category: TicketCategory::DeliveryIssue,
            priority: TicketPriority::default(),
            order_number: None,
            tags: vec![],
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_message_side_effects_and_read_tracking() {
        let sync = db_sync().await;
        let business = Identity::Business(Uuid::new_v4());
        let admin = Identity::Admin(Uuid::new_v4());

        let ticket = sync
            .create_ticket(&business, new_ticket_payload())
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::New);

        // An admin reply stamps the ticket and increments the business's
        // counter; the ticket stays in its current state (no reopen from
        // `new`).
        let reply = sync
            .send_message(
                &admin,
                "Support",
                ticket.id,
                SendMessage {
                    body: "Looking into it".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let t = sync.get_ticket(&admin, ticket.id).await.unwrap();
        assert_eq!(t.status, TicketStatus::New);
        assert_eq!(t.unread_business, 1);
        assert_eq!(t.last_message_at, Some(reply.created_at));
        assert_eq!(t.last_message_by, Some(Party::Admin));
        assert!(t.first_response_at.is_some());

        // Internal notes never touch the business counter.
        sync.send_message(
            &admin,
            "Support",
            ticket.id,
            SendMessage {
                body: "Courier dropped the crate".to_string(),
                is_internal: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let t = sync.get_ticket(&admin, ticket.id).await.unwrap();
        assert_eq!(t.unread_business, 1);

        // Business-facing listings exclude the internal note entirely.
        let page = messages::list(&sync.pool, ticket.id, false, 1, 50)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.messages.iter().all(|m| !m.is_internal));

        // Marking read zeroes the counter; re-marking is a no-op.
        let first = sync.mark_read(&business, ticket.id).await.unwrap();
        assert_eq!(first, 1);
        let again = sync.mark_read(&business, ticket.id).await.unwrap();
        assert_eq!(again, 0);
        let t = sync.get_ticket(&business, ticket.id).await.unwrap();
        assert_eq!(t.unread_business, 0);

        sync.delete_ticket(&admin, ticket.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_message_on_resolved_ticket_reopens_with_attribution() {
        let sync = db_sync().await;
        let business = Identity::Business(Uuid::new_v4());
        let admin = Identity::Admin(Uuid::new_v4());

        let ticket = sync
            .create_ticket(&business, new_ticket_payload())
            .await
            .unwrap();
        sync.update_status(&admin, ticket.id, TicketStatus::Open)
            .await
            .unwrap();
        sync.update_status(&admin, ticket.id, TicketStatus::Resolved)
            .await
            .unwrap();

        sync.send_message(
            &business,
            "Acme Goods",
            ticket.id,
            SendMessage {
                body: "Still not here".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let t = sync.get_ticket(&admin, ticket.id).await.unwrap();
        assert_eq!(t.status, TicketStatus::Reopened);
        assert_eq!(t.unread_admin, 1);

        let history = tickets::history(&sync.pool, ticket.id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.status, TicketStatus::Reopened);
        assert_eq!(last.changed_by_kind, Party::Business);

        // Skipping `reopened` by direct transition stays rejected even
        // though a message just reopened this ticket once before.
        sync.update_status(&admin, ticket.id, TicketStatus::Open)
            .await
            .unwrap();
        sync.update_status(&admin, ticket.id, TicketStatus::Closed)
            .await
            .unwrap();
        let err = sync
            .update_status(&admin, ticket.id, TicketStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        sync.delete_ticket(&admin, ticket.id).await.unwrap();
    }

    fn sample_ticket(business_id: Uuid) -> Ticket {
        use time::OffsetDateTime;
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "TKT-TEST-001".to_string(),
            business_id,
            subject: "Late delivery".to_string(),
            description: String::new(),
            category: TicketCategory::DeliveryIssue,
            priority: TicketPriority::Medium,
            status: TicketStatus::New,
            order_number: None,
            tags: vec![],
            assigned_to: None,
            rating: None,
            rated_at: None,
            resolved_at: None,
            resolved_by: None,
            closed_at: None,
            closed_by: None,
            first_response_at: None,
            last_message_at: None,
            last_message_by: None,
            unread_business: 0,
            unread_admin: 0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

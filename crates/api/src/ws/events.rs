//! WebSocket event types and serialization
//!
//! Client-to-server and server-to-client event vocabularies with type-safe
//! serde serialization. Server events carry the same canonical ticket and
//! message shapes the REST surface returns.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetdesk_shared::{MessageKind, Party, TicketStatus};

use crate::store::couriers::CourierPresence;
use crate::store::messages::{NewAttachment, TicketMessage};
use crate::store::tickets::Ticket;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe to a ticket's room
    JoinTicket { ticket_id: Uuid },

    /// Unsubscribe from a ticket's room
    LeaveTicket { ticket_id: Uuid },

    /// Typing indicator; `is_typing: true` refreshes the expiry window
    TicketTyping { ticket_id: Uuid, is_typing: bool },

    /// Post a message to a ticket over the socket.
    ///
    /// Aliases keep the existing clients' field names (`content`,
    /// `messageType`, `attachmentUrl`) valid alongside the snake_case ones.
    SendTicketMessage {
        ticket_id: Uuid,
        #[serde(default, alias = "content")]
        body: String,
        #[serde(default, alias = "message_type", alias = "messageType")]
        kind: MessageKind,
        #[serde(default, alias = "replyTo")]
        reply_to: Option<Uuid>,
        #[serde(default, alias = "isInternal")]
        is_internal: bool,
        #[serde(default)]
        attachments: Vec<NewAttachment>,
        /// Shorthand for a single attachment known only by URL
        #[serde(default, alias = "attachmentUrl")]
        attachment_url: Option<String>,
    },

    /// Mark every message in a ticket as read by the caller's party
    MarkMessagesRead { ticket_id: Uuid },

    /// Change a ticket's status (admin only)
    UpdateTicketStatus {
        ticket_id: Uuid,
        status: TicketStatus,
    },

    /// Courier position heartbeat
    LocationUpdate { latitude: f64, longitude: f64 },

    /// Courier availability change
    StatusUpdate { is_available: bool },

    /// Heartbeat ping to keep the connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// A business opened a new ticket (admins room)
    NewTicket { ticket: Ticket },

    /// Full message payload, delivered to the ticket's room
    NewTicketMessage {
        ticket_id: Uuid,
        message: TicketMessage,
    },

    /// Lightweight notice for parties not subscribed to the ticket room
    #[serde(rename = "new_message")]
    NewMessageNotice {
        ticket_id: Uuid,
        ticket_number: String,
        sender_kind: Party,
        preview: String,
    },

    /// Someone is (or stopped) typing in a ticket
    UserTyping {
        ticket_id: Uuid,
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },

    /// The other party read the thread
    MessagesRead {
        ticket_id: Uuid,
        party: Party,
        count: u64,
    },

    /// Status transition applied to a ticket
    TicketStatusUpdated {
        ticket_id: Uuid,
        status: TicketStatus,
        changed_by: Party,
    },

    /// Ticket fields changed (priority, assignment, tags, rating)
    TicketUpdated { ticket: Ticket },

    /// Ticket removed
    TicketDeleted { ticket_id: Uuid },

    /// A message gained attachments or was edited
    MessageUpdated {
        ticket_id: Uuid,
        message: TicketMessage,
    },

    /// Courier moved. Kebab-case name is a wire-compat requirement of the
    /// existing panel clients.
    #[serde(rename = "courier-location-update")]
    CourierLocationUpdate {
        courier_id: Uuid,
        latitude: f64,
        longitude: f64,
    },

    /// Courier availability changed
    #[serde(rename = "courier-status-update")]
    CourierStatusUpdate { courier_id: Uuid, is_available: bool },

    /// Presence snapshot sent to admins on connect
    CourierSnapshot { couriers: Vec<CourierPresence> },

    /// Heartbeat response
    Pong,

    /// Scoped failure; the connection stays open
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type": "ticket_typing", "ticket_id": "7a1e3f1a-9f42-4b6a-8c1d-2e91d1a0c111", "is_typing": true}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::TicketTyping { is_typing: true, .. }
        ));
    }

    #[test]
    fn test_send_message_defaults() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type": "send_ticket_message",
                "ticket_id": "7a1e3f1a-9f42-4b6a-8c1d-2e91d1a0c111",
                "body": "hi"}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SendTicketMessage {
                kind,
                is_internal,
                reply_to,
                attachments,
                attachment_url,
                ..
            } => {
                assert_eq!(kind, MessageKind::Text);
                assert!(!is_internal);
                assert!(reply_to.is_none());
                assert!(attachments.is_empty());
                assert!(attachment_url.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_message_accepts_legacy_field_names() {
        // content/messageType/attachmentUrl are the field names the mobile
        // clients already send.
        let event: ClientEvent = serde_json::from_str(
            r#"{"type": "send_ticket_message",
                "ticket_id": "7a1e3f1a-9f42-4b6a-8c1d-2e91d1a0c111",
                "content": "photo attached",
                "messageType": "image",
                "attachmentUrl": "https://cdn.example/x.png",
                "isInternal": true}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SendTicketMessage {
                body,
                kind,
                is_internal,
                attachment_url,
                ..
            } => {
                assert_eq!(body, "photo attached");
                assert_eq!(kind, MessageKind::Image);
                assert!(is_internal);
                assert_eq!(attachment_url.as_deref(), Some("https://cdn.example/x.png"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_courier_events_keep_kebab_names() {
        let event = ServerEvent::CourierLocationUpdate {
            courier_id: Uuid::new_v4(),
            latitude: 41.0,
            longitude: 28.9,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "courier-location-update");

        let event = ServerEvent::CourierStatusUpdate {
            courier_id: Uuid::new_v4(),
            is_available: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "courier-status-update");
    }

    #[test]
    fn test_notice_serializes_as_new_message() {
        let event = ServerEvent::NewMessageNotice {
            ticket_id: Uuid::new_v4(),
            ticket_number: "TKT-ABC-123".to_string(),
            sender_kind: Party::Admin,
            preview: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["sender_kind"], "admin");
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type": "drop_tables"}"#);
        assert!(result.is_err());
    }
}

//! Domain types shared across Fleetdesk

use serde::{Deserialize, Serialize};

// =============================================================================
// Caller & Party Kinds
// =============================================================================

/// The three caller kinds a live connection or API request can resolve to.
///
/// Carried as the `act` claim of a verified token. Never derived from
/// request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Business,
    Admin,
    Courier,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Business => "business",
            ActorKind::Admin => "admin",
            ActorKind::Courier => "courier",
        }
    }
}

/// The possible ticket/message actors.
///
/// `System` covers server-generated messages and automatic status changes;
/// couriers never act on tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Business,
    Admin,
    System,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Business => "business",
            Party::Admin => "admin",
            Party::System => "system",
        }
    }

    /// The party on the other side of the ticket conversation.
    ///
    /// System messages address the business side.
    pub fn counterpart(&self) -> Party {
        match self {
            Party::Business => Party::Admin,
            Party::Admin | Party::System => Party::Business,
        }
    }
}

// =============================================================================
// Ticket Enumerations
// =============================================================================

/// Ticket lifecycle states.
///
/// Transitions follow a fixed graph (see [`TicketStatus::can_transition_to`]);
/// the only transition the server applies on its own is the reopen of a
/// resolved/closed ticket when a new message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Open,
    Pending,
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Reopened => "reopened",
        }
    }

    /// Whether an explicit transition from `self` to `to` is allowed.
    ///
    /// Re-asserting the current status is not a valid transition.
    pub fn can_transition_to(&self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        if *self == to {
            return false;
        }
        match self {
            New => matches!(to, Open | Pending | InProgress),
            Open | Pending | InProgress => {
                matches!(to, Open | Pending | InProgress | Resolved | Closed)
            }
            Resolved => matches!(to, Closed | Reopened),
            Closed => matches!(to, Reopened),
            Reopened => matches!(to, Open | Pending | InProgress),
        }
    }

    /// A new message on a ticket in this state forces it to `Reopened`.
    pub fn reopens_on_message(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Ratings are only accepted once the ticket reached a settled state.
    pub fn accepts_rating(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    /// Sort rank for listings (urgent first).
    pub fn rank(&self) -> i16 {
        match self {
            TicketPriority::Urgent => 1,
            TicketPriority::High => 2,
            TicketPriority::Medium => 3,
            TicketPriority::Low => 4,
        }
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Closed enumeration of ticket categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    DeliveryIssue,
    PickupIssue,
    OrderIssue,
    PaymentIssue,
    AccountIssue,
    TechnicalIssue,
    Other,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::DeliveryIssue => "delivery_issue",
            TicketCategory::PickupIssue => "pickup_issue",
            TicketCategory::OrderIssue => "order_issue",
            TicketCategory::PaymentIssue => "payment_issue",
            TicketCategory::AccountIssue => "account_issue",
            TicketCategory::TechnicalIssue => "technical_issue",
            TicketCategory::Other => "other",
        }
    }
}

// =============================================================================
// Message Enumerations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Audio,
    Video,
    System,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

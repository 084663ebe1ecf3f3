//! Room naming conventions for the broadcast layer
//!
//! Rooms form a flat string keyspace. These helpers are the only place room
//! names are constructed, so the conventions stay in one spot.

use uuid::Uuid;

/// All admin identities.
pub const ADMINS: &str = "admins";

/// Generic admin broadcast channel (dashboard refresh signals).
pub const ADMIN_BROADCAST: &str = "admin:broadcast";

/// Per-tenant room for a business identity.
pub fn business(business_id: Uuid) -> String {
    format!("business:{business_id}")
}

/// Per-courier room.
pub fn courier(courier_id: Uuid) -> String {
    format!("courier:{courier_id}")
}

/// Per-ticket conversation room.
pub fn ticket(ticket_id: Uuid) -> String {
    format!("ticket:{ticket_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_formats() {
        let id = Uuid::nil();
        assert_eq!(business(id), "business:00000000-0000-0000-0000-000000000000");
        assert_eq!(ticket(id), "ticket:00000000-0000-0000-0000-000000000000");
        assert_eq!(courier(id), "courier:00000000-0000-0000-0000-000000000000");
        assert_eq!(ADMINS, "admins");
    }
}

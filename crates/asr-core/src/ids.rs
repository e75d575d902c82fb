//! Opaque identifier generation for sessions, items, and events.

use rand::Rng;

fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap())
        .collect()
}

/// `sess_` + 16 hex chars.
pub fn generate_session_id() -> String {
    format!("sess_{}", random_hex(16))
}

/// `item_` + 20 hex chars.
pub fn generate_item_id() -> String {
    format!("item_{}", random_hex(20))
}

/// `event_` + 20 hex chars.
pub fn generate_event_id() -> String {
    format!("event_{}", random_hex(20))
}

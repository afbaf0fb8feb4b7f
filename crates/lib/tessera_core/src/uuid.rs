// Identifier helpers.
//
// Sessions use UUIDv7 (time-sortable rows). Refresh-token JTIs use UUIDv4.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a fresh, random JWT ID.
pub fn new_jti() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a client-supplied session id. Returns `None` for empty, malformed
/// and nil identifiers.
pub fn parse_session_id(raw: &str) -> Option<Uuid> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Uuid::parse_str(trimmed).ok().filter(|id| !id.is_nil())
}

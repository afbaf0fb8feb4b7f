//! Cache key namespace.
//!
//! - `tessera:session:{session_id}`: cached [`Session`](crate::models::auth::Session)
//! - `tessera:refresh:{account_id}:{jti}`: [`DeviceRecord`](crate::models::auth::DeviceRecord)

use uuid::Uuid;

const NAMESPACE: &str = "tessera";
const SESSION: &str = "session";
const REFRESH: &str = "refresh";

/// Key of a cached session.
pub fn session(session_id: Uuid) -> String {
    format!("{NAMESPACE}:{SESSION}:{session_id}")
}

/// Recover the session id from a key built by [`session`].
pub fn session_id_from_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(NAMESPACE)?
        .strip_prefix(':')?
        .strip_prefix(SESSION)?
        .strip_prefix(':')
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Key of the device record for one refresh token.
pub fn refresh_token(account_id: Uuid, jti: &str) -> String {
    format!("{NAMESPACE}:{REFRESH}:{account_id}:{jti}")
}

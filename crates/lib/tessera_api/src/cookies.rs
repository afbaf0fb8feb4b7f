//! Session cookie: set, read and clear the httpOnly session id cookie.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Cookie name for the server-side session id.
pub const SESSION_COOKIE: &str = "tessera_session";

/// Build a httpOnly cookie carrying `session_id` for `lifetime`.
pub fn session_cookie(session_id: &str, lifetime: Duration) -> Cookie<'static> {
    let max_age = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((SESSION_COOKIE.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(false) // TODO: set true once TLS termination is configurable
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// Build an expired session cookie.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(time::Duration::ZERO)
        .build()
}

/// Session id from the request cookies; empty when absent.
pub fn session_id(jar: &CookieJar) -> String {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only_with_lifetime() {
        let cookie = session_cookie("abc", Duration::from_secs(3600));
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
    }

    #[test]
    fn missing_cookie_reads_as_empty() {
        assert_eq!(session_id(&CookieJar::new()), "");
        let jar = CookieJar::new().add(session_cookie("xyz", Duration::from_secs(1)));
        assert_eq!(session_id(&jar), "xyz");
    }
}

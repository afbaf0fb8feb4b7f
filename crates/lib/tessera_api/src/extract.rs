//! Request metadata extractor.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

/// Client IP and user agent recorded on sessions and device records.
///
/// The IP is the first `X-Forwarded-For` entry when present, otherwise the
/// peer address. Missing values are empty strings.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            ip: forwarded.or(peer).unwrap_or_default(),
            user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> ClientMeta {
        let (mut parts, _) = request.into_parts();
        ClientMeta::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn prefers_forwarded_for() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(USER_AGENT, "curl/8")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let meta = extract(request).await;
        assert_eq!(meta.ip, "203.0.113.7");
        assert_eq!(meta.user_agent, "curl/8");
    }

    #[tokio::test]
    async fn falls_back_to_peer_then_empty() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(extract(request).await.ip, "192.0.2.1");

        let meta = extract(Request::builder().body(()).unwrap()).await;
        assert!(meta.ip.is_empty());
        assert!(meta.user_agent.is_empty());
    }
}

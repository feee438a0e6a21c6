use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};

use crate::error::SyncError;
use crate::http::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

/// `POST /sync`. Gates on origin IP and cookie presence, form-decodes the
/// body exactly once to pull out the `q` field, then hands that field
/// straight to the engine — the protocol parser percent-decodes `r`/`R`
/// payloads itself, so the body is never decoded twice.
pub async fn sync(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<String, SyncError> {
    let config = &state.server.config;

    if !config.connection_origin.is_empty() && addr.ip().to_string() != config.connection_origin {
        tracing::warn!(origin = %addr.ip(), "rejected connection from disallowed origin");
        return Err(SyncError::OriginRejected);
    }

    if !config.required_cookie.is_empty() {
        let cookie_header = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !cookie_present(cookie_header, &config.required_cookie) {
            return Err(SyncError::CookieMissing);
        }
    }

    let form: HashMap<String, String> =
        serde_urlencoded::from_str(&body).map_err(|_| SyncError::MissingPayload)?;
    let payload = form.get("q").ok_or(SyncError::MissingPayload)?;

    Ok(state.server.handle_request(payload))
}

/// Mirrors the original daemon's `REQUIRED_COOKIE` regex,
/// `r'(^|;)\s*NAME=\w'` — the cookie must be present with a value whose
/// first character is a word character.
fn cookie_present(header_value: &str, name: &str) -> bool {
    header_value.split(';').any(|part| {
        part.trim()
            .split_once('=')
            .map(|(key, value)| {
                key == name
                    && value
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_')
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_present_requires_word_char_value() {
        assert!(cookie_present("session=abc123", "session"));
        assert!(!cookie_present("session=", "session"));
        assert!(!cookie_present("other=abc123", "session"));
        assert!(cookie_present("a=1; session=xyz", "session"));
    }
}

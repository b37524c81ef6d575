// src/auth/session.rs

//! Admin control-plane sessions.
//!
//! The admin UI authenticates with a cookie rather than a bearer JWT.
//! There is no crate in the teacher's stack for this (no `axum-extra`
//! cookie feature, no `tower-sessions`), so it follows the same in-memory
//! `HashMap` + TTL pattern the teacher uses for conversion jobs
//! (`server::jobs::JobManager`) and rate-limit state
//! (`server::security::RateLimiter`): an opaque random token is hashed
//! into a map entry with an expiry, and the HTTP layer reads it back out
//! of a `Cookie` request header by hand.

use base64::Engine;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const SESSION_COOKIE_NAME: &str = "revkeep_admin_session";

#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, AdminSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session for `username`, returning the opaque token to set
    /// as the cookie value.
    pub fn create(&self, username: &str) -> String {
        let token = random_token();
        let now = Instant::now();
        self.sessions.lock().unwrap().insert(
            token.clone(),
            AdminSession {
                username: username.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Look up a session by token, returning `None` if absent or expired.
    pub fn validate(&self, token: &str) -> Option<AdminSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(token)
            .filter(|s| s.expires_at > Instant::now())
            .cloned()
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.lock().unwrap().remove(token);
    }

    /// Drop expired sessions. Called from the retention sweep.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.sessions.lock().unwrap().retain(|_, s| s.expires_at > now);
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract the session token from a raw `Cookie` request header value.
pub fn extract_session_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|pair| {
        let pair = pair.trim();
        let (name, value) = pair.split_once('=')?;
        (name == SESSION_COOKIE_NAME).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_validate_round_trip() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create("admin");
        let session = store.validate(&token).unwrap();
        assert_eq!(session.username, "admin");
    }

    #[test]
    fn expired_session_is_rejected() {
        let store = SessionStore::new(Duration::from_millis(1));
        let token = store.create("admin");
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.validate(&token).is_none());
    }

    #[test]
    fn revoke_invalidates_immediately() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create("admin");
        store.revoke(&token);
        assert!(store.validate(&token).is_none());
    }

    #[test]
    fn extract_cookie_from_header_with_multiple_pairs() {
        let header = "other=1; revkeep_admin_session=abc123; another=2";
        assert_eq!(extract_session_cookie(header), Some("abc123"));
    }

    #[test]
    fn extract_cookie_missing_returns_none() {
        assert_eq!(extract_session_cookie("other=1"), None);
    }
}

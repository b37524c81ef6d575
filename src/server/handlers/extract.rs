// src/server/handlers/extract.rs

//! Shared axum extractors for the two authentication surfaces: bearer
//! JWTs for the sync protocol, and admin session cookies for the control
//! plane. Neither uses a framework extension crate — the cookie is parsed
//! by hand, same as the session store it reads from (see
//! `crate::auth::session`).

use crate::auth::permissions::PermissionSet;
use crate::auth::session::extract_session_cookie;
use crate::auth::token::verify_token;
use crate::error::Error;
use crate::server::ServerState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

pub struct AuthUser {
    pub username: String,
    pub permissions: PermissionSet,
}

impl FromRequestParts<Arc<ServerState>> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ServerState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::Unauthenticated)?;
        let token = header.strip_prefix("Bearer ").ok_or(Error::Unauthenticated)?;

        let secret = state.config.jwt_secret_bytes()?;
        let claims = verify_token(&secret, token)?;
        let permissions = PermissionSet::parse(&claims.permissions)?;
        Ok(AuthUser {
            username: claims.sub,
            permissions,
        })
    }
}

pub struct AdminUser {
    pub username: String,
    pub session_token: String,
}

impl FromRequestParts<Arc<ServerState>> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ServerState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::Unauthenticated)?;
        let token = extract_session_cookie(header).ok_or(Error::Unauthenticated)?;
        let session = state.sessions.validate(token).ok_or(Error::Unauthenticated)?;
        Ok(AdminUser {
            username: session.username,
            session_token: token.to_string(),
        })
    }
}

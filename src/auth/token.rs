// src/auth/token.rs

//! Bearer-credential issuance and verification for the sync protocol
//! surface (as opposed to the admin control plane, which uses cookie
//! sessions — see [`super::session`]).

use crate::auth::permissions::PermissionSet;
use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    /// Comma-separated permission names — see `PermissionSet::to_store_string`.
    pub permissions: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

pub fn issue_token(secret: &[u8], username: &str, permissions: &PermissionSet, expiration_hours: u64) -> Result<String> {
    let exp = Utc::now() + chrono::Duration::hours(expiration_hours as i64);
    let claims = Claims {
        sub: username.to_string(),
        permissions: permissions.to_store_string(),
        exp: exp.timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| Error::Internal(format!("token issuance failed: {e}")))
}

pub fn verify_token(secret: &[u8], token: &str) -> Result<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| Error::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::Permission;

    #[test]
    fn issue_and_verify_round_trip() {
        let secret = b"test-secret";
        let permissions = PermissionSet::new([Permission::CanPush, Permission::CanPull]);
        let token = issue_token(secret, "alice", &permissions, 1).unwrap();
        let claims = verify_token(secret, &token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(PermissionSet::parse(&claims.permissions).unwrap(), permissions);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let permissions = PermissionSet::new([Permission::CanPull]);
        let token = issue_token(b"secret-a", "alice", &permissions, 1).unwrap();
        assert!(verify_token(b"secret-b", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = b"test-secret";
        let claims = Claims {
            sub: "alice".to_string(),
            permissions: "can_pull".to_string(),
            exp: (Utc::now() - chrono::Duration::hours(2)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap();
        assert!(verify_token(secret, &token).is_err());
    }
}

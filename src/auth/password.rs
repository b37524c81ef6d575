// src/auth/password.rs

//! Password hashing via bcrypt.
//!
//! bcrypt's underlying Blowfish key schedule only ever consumes the first
//! 72 bytes of its input; anything past that is silently ignored by most
//! implementations (not this crate's — it errors), so passwords are
//! clamped to 72 bytes before hashing rather than letting a long
//! passphrase fail validation for a reason a user has no way to guess.

use crate::error::{Error, Result};

const BCRYPT_COST: u32 = 12;
const BCRYPT_MAX_BYTES: usize = 72;

fn clamp(password: &str) -> &str {
    if password.len() <= BCRYPT_MAX_BYTES {
        return password;
    }
    let mut end = BCRYPT_MAX_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(clamp(password), BCRYPT_COST)
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(clamp(password), hash)
        .map_err(|e| Error::Internal(format!("password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn clamps_passwords_longer_than_72_bytes() {
        let long = "x".repeat(200);
        let hash = hash_password(&long).unwrap();
        // Anything sharing the first 72 bytes verifies identically.
        assert!(verify_password(&"x".repeat(90), &hash).unwrap());
    }

    #[test]
    fn clamp_respects_utf8_boundaries() {
        let password: String = std::iter::repeat('é').take(80).collect();
        assert!(hash_password(&password).is_ok());
    }
}

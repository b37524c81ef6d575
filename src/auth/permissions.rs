// src/auth/permissions.rs

//! Permissions are granted independently, not derived from a fixed role
//! hierarchy: a user might hold `can_push` without `can_reconcile`, or
//! `can_view_files` without either. `admin` implies every other
//! permission. Each operation type gates on exactly one of these (see
//! `server::handlers::transaction::required_permission`); Pull needs
//! nothing beyond a valid credential.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    Admin,
    CanPush,
    CanPull,
    CanReconcile,
    CanViewFiles,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Admin,
        Permission::CanPush,
        Permission::CanPull,
        Permission::CanReconcile,
        Permission::CanViewFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "admin",
            Permission::CanPush => "can_push",
            Permission::CanPull => "can_pull",
            Permission::CanReconcile => "can_reconcile",
            Permission::CanViewFiles => "can_view_files",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Permission::Admin),
            "can_push" => Ok(Permission::CanPush),
            "can_pull" => Ok(Permission::CanPull),
            "can_reconcile" => Ok(Permission::CanReconcile),
            "can_view_files" => Ok(Permission::CanViewFiles),
            other => Err(Error::Validation(format!("unknown permission '{other}'"))),
        }
    }
}

/// An independently-grantable set of permissions held by one user.
/// `admin` implies all others — [`PermissionSet::has`] checks for it
/// first so callers never need to special-case it themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self(permissions.into_iter().collect())
    }

    pub fn admin() -> Self {
        Self::new([Permission::Admin])
    }

    /// Parse a comma-separated list of permission names, as stored in the
    /// `users.permissions` column and the bearer token's `permissions`
    /// claim. Unknown tokens are rejected rather than silently dropped —
    /// a typo in a grant should fail loudly, not grant nothing.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let mut set = BTreeSet::new();
        for token in trimmed.split(',') {
            set.insert(Permission::parse(token.trim())?);
        }
        Ok(Self(set))
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.0.contains(&Permission::Admin) || self.0.contains(&permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    pub fn to_store_string(&self) -> String {
        self.0.iter().map(Permission::as_str).collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_implies_every_other_permission() {
        let set = PermissionSet::admin();
        for permission in Permission::ALL {
            assert!(set.has(permission));
        }
    }

    #[test]
    fn grants_are_independent() {
        let set = PermissionSet::new([Permission::CanPush, Permission::CanViewFiles]);
        assert!(set.has(Permission::CanPush));
        assert!(set.has(Permission::CanViewFiles));
        assert!(!set.has(Permission::CanPull));
        assert!(!set.has(Permission::CanReconcile));
        assert!(!set.has(Permission::Admin));
    }

    #[test]
    fn round_trips_through_store_string() {
        let set = PermissionSet::new([Permission::CanPush, Permission::CanReconcile]);
        let parsed = PermissionSet::parse(&set.to_store_string()).unwrap();
        assert_eq!(set, parsed);
    }

    #[test]
    fn empty_string_is_no_permissions() {
        let set = PermissionSet::parse("").unwrap();
        assert!(!set.has(Permission::CanPull));
    }

    #[test]
    fn unknown_permission_token_is_rejected() {
        assert!(PermissionSet::parse("can_fly").is_err());
    }
}

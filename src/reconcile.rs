// src/reconcile.rs

//! The reconcile planner.
//!
//! A pure, side-effect-free comparison between what a client reports it
//! has and what the metadata index says the server's current revision is,
//! producing one action per path. Nothing here touches the database, the
//! lock manager, or disk — the caller turns the resulting plan into
//! transaction operations.

use crate::db::Revision;
use crate::model::RelativePath;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One path as reported by a connecting client.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub path: RelativePath,
    pub size: u64,
    pub content_hash: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Client has it, server doesn't (or server's is a tombstone and the
    /// caller has chosen not to treat tombstones as absent) — client
    /// should upload.
    Push,
    /// Server has a live revision the client lacks or is behind on —
    /// client should download.
    Pull,
    /// Server has tombstoned the path and the client still has a local
    /// copy — client should remove its local copy.
    DeleteLocal,
    /// Both sides already agree.
    NoOp,
}

#[derive(Debug, Clone)]
pub struct ReconcilePlanEntry {
    pub path: RelativePath,
    pub action: ReconcileAction,
}

/// How a server-side tombstone for a path the client still has is
/// resolved. Spec leaves this open; revkeep makes it a per-call setting
/// rather than a hardcoded choice — see `Setting` `tombstone_as_absent` in
/// the metadata index.
#[derive(Debug, Clone, Copy)]
pub enum TombstonePolicy {
    /// A tombstone counts as "server doesn't have it" — the client's copy
    /// is left alone (and would be re-pushed on the next sync did it not
    /// also appear client-only).
    TreatAsAbsent,
    /// A tombstone actively propagates to clients that still have the
    /// file, deleting their local copy.
    DeleteOnClient,
}

/// Build a reconcile plan for one service's comparison pass.
pub fn plan(
    client_entries: &[ClientEntry],
    server_revisions: &[Revision],
    tombstone_policy: TombstonePolicy,
) -> Vec<ReconcilePlanEntry> {
    let mut client_by_path: BTreeMap<&str, &ClientEntry> =
        client_entries.iter().map(|e| (e.path.as_str(), e)).collect();
    let mut server_by_path: BTreeMap<&str, &Revision> =
        server_revisions.iter().map(|r| (r.path.as_str(), r)).collect();

    let mut all_paths: Vec<&str> = client_by_path
        .keys()
        .chain(server_by_path.keys())
        .copied()
        .collect();
    all_paths.sort_unstable();
    all_paths.dedup();

    let mut entries = Vec::with_capacity(all_paths.len());
    for path_str in all_paths {
        let client = client_by_path.remove(path_str);
        let server = server_by_path.remove(path_str);
        let action = decide(client, server, tombstone_policy);
        let path = client
            .map(|c| c.path.clone())
            .or_else(|| server.and_then(|s| RelativePath::parse(&s.path).ok()))
            .expect("path present on at least one side");
        entries.push(ReconcilePlanEntry { path, action });
    }
    entries
}

/// Mtimes within this tolerance are treated as equal — clock skew between
/// client and server, not a real edit race.
const MTIME_TOLERANCE_MS: i64 = 1000;

fn decide(client: Option<&ClientEntry>, server: Option<&Revision>, tombstone_policy: TombstonePolicy) -> ReconcileAction {
    match (client, server) {
        (Some(_), None) => ReconcileAction::Push,
        (None, Some(server)) => {
            if server.tombstone {
                ReconcileAction::NoOp
            } else {
                ReconcileAction::Pull
            }
        }
        (None, None) => ReconcileAction::NoOp,
        (Some(client), Some(server)) => {
            if server.tombstone {
                return match tombstone_policy {
                    TombstonePolicy::TreatAsAbsent => ReconcileAction::Push,
                    TombstonePolicy::DeleteOnClient => ReconcileAction::DeleteLocal,
                };
            }

            // (a) An mtime divergence of more than a second decides the
            // outcome outright, regardless of hash or size.
            let diff_ms = (client.modified_at - server.created_at).num_milliseconds().abs();
            if diff_ms > MTIME_TOLERANCE_MS {
                return if client.modified_at > server.created_at {
                    ReconcileAction::Push
                } else {
                    ReconcileAction::Pull
                };
            }

            // (b)-(e) Mtimes agree within tolerance. Matching content is a
            // no-op; anything else — differing hash, differing size —
            // resolves to the later mtime with ties favoring the server,
            // which inside this tolerance window means Pull.
            let server_hash = server.content_hash.as_deref().unwrap_or("");
            if client.content_hash == server_hash {
                ReconcileAction::NoOp
            } else {
                ReconcileAction::Pull
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Service;

    fn server_revision(path: &str, hash: &str, size: u64, tombstone: bool, created_at: DateTime<Utc>) -> Revision {
        Revision {
            id: 1,
            service: Service::Contemporary,
            path: path.to_string(),
            revision_number: 1,
            content_hash: (!tombstone).then(|| hash.to_string()),
            size: (!tombstone).then_some(size),
            tombstone,
            created_at,
            created_by: "alice".to_string(),
            operation_id: Some("op-1".to_string()),
            changelist_id: None,
        }
    }

    fn client_entry(path: &str, hash: &str, size: u64, modified_at: DateTime<Utc>) -> ClientEntry {
        ClientEntry {
            path: RelativePath::parse(path).unwrap(),
            size,
            content_hash: hash.to_string(),
            modified_at,
        }
    }

    #[test]
    fn client_only_pushes() {
        let now = Utc::now();
        let plan = plan(&[client_entry("a.pro", "h1", 10, now)], &[], TombstonePolicy::TreatAsAbsent);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action, ReconcileAction::Push);
    }

    #[test]
    fn server_only_live_pulls() {
        let now = Utc::now();
        let plan = plan(&[], &[server_revision("a.pro", "h1", 10, false, now)], TombstonePolicy::TreatAsAbsent);
        assert_eq!(plan[0].action, ReconcileAction::Pull);
    }

    #[test]
    fn server_only_tombstone_is_noop() {
        let now = Utc::now();
        let plan = plan(&[], &[server_revision("a.pro", "", 0, true, now)], TombstonePolicy::TreatAsAbsent);
        assert_eq!(plan[0].action, ReconcileAction::NoOp);
    }

    #[test]
    fn matching_hash_is_noop() {
        let now = Utc::now();
        let plan = plan(
            &[client_entry("a.pro", "h1", 10, now)],
            &[server_revision("a.pro", "h1", 10, false, now)],
            TombstonePolicy::TreatAsAbsent,
        );
        assert_eq!(plan[0].action, ReconcileAction::NoOp);
    }

    #[test]
    fn newer_client_wins_on_divergence() {
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let later = Utc::now();
        let plan = plan(
            &[client_entry("a.pro", "h2", 11, later)],
            &[server_revision("a.pro", "h1", 10, false, earlier)],
            TombstonePolicy::TreatAsAbsent,
        );
        assert_eq!(plan[0].action, ReconcileAction::Push);
    }

    #[test]
    fn tombstone_treat_as_absent_with_client_copy_pushes() {
        let now = Utc::now();
        let plan = plan(
            &[client_entry("a.pro", "h1", 10, now)],
            &[server_revision("a.pro", "", 0, true, now)],
            TombstonePolicy::TreatAsAbsent,
        );
        assert_eq!(plan[0].action, ReconcileAction::Push);
    }

    #[test]
    fn tied_mtime_with_differing_size_favors_server() {
        let now = Utc::now();
        let plan = plan(
            &[client_entry("a.pro", "h2", 99, now)],
            &[server_revision("a.pro", "h1", 10, false, now)],
            TombstonePolicy::TreatAsAbsent,
        );
        assert_eq!(plan[0].action, ReconcileAction::Pull);
    }

    #[test]
    fn mtime_within_tolerance_is_treated_as_tied() {
        let server_time = Utc::now();
        let client_time = server_time + chrono::Duration::milliseconds(500);
        let plan = plan(
            &[client_entry("a.pro", "h2", 10, client_time)],
            &[server_revision("a.pro", "h1", 10, false, server_time)],
            TombstonePolicy::TreatAsAbsent,
        );
        assert_eq!(plan[0].action, ReconcileAction::Pull);
    }

    #[test]
    fn tombstone_delete_on_client_policy() {
        let now = Utc::now();
        let plan = plan(
            &[client_entry("a.pro", "h1", 10, now)],
            &[server_revision("a.pro", "", 0, true, now)],
            TombstonePolicy::DeleteOnClient,
        );
        assert_eq!(plan[0].action, ReconcileAction::DeleteLocal);
    }
}

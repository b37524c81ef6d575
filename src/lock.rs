// src/lock.rs

//! The lock manager.
//!
//! There is at most one lock process-wide — not one per service. A Push
//! against Contemporary and a Push against Traditional cannot run
//! concurrently; the engine trades away that parallelism for the simple,
//! total commit ordering §5 asks for ("across transactions, the global
//! lock is a total order: no two transactions' side effects interleave on
//! the server"). A lock is held in memory only — there is nothing to
//! recover at startup, since a held lock with no process behind it is, by
//! construction, already expired. Grounded in the same `Mutex`-guarded
//! state + `Instant`-based TTL tracking the teacher uses for conversion
//! jobs and rate-limit buckets (`server::jobs`, `server::security`).

use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LockInfo {
    pub token: String,
    pub holder: String,
    pub op_type: String,
    pub acquired_at: Instant,
    pub timeout: Duration,
}

impl LockInfo {
    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() > self.timeout
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.acquired_at.elapsed().as_secs()
    }
}

/// Reason a lock acquisition was refused.
#[derive(Debug, Clone)]
pub struct LockBusy {
    pub holder: String,
    pub op_type: String,
    pub elapsed_secs: u64,
}

pub struct LockManager {
    lock: Mutex<Option<LockInfo>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self { lock: Mutex::new(None) }
    }

    /// Acquire the single process-wide write lock. Succeeds if no lock is
    /// held, or the held lock has expired (in which case it is silently
    /// reclaimed — the previous holder's transaction, if any, is still
    /// cleaned up independently by [`crate::transaction::recover_incomplete`]
    /// or the retention sweep).
    pub fn acquire(&self, holder: &str, op_type: &str, timeout: Duration) -> Result<String, LockBusy> {
        let mut lock = self.lock.lock().unwrap();
        if let Some(existing) = lock.as_ref() {
            if !existing.is_expired() {
                return Err(LockBusy {
                    holder: existing.holder.clone(),
                    op_type: existing.op_type.clone(),
                    elapsed_secs: existing.elapsed_secs(),
                });
            }
        }

        let token = Uuid::new_v4().to_string();
        *lock = Some(LockInfo {
            token: token.clone(),
            holder: holder.to_string(),
            op_type: op_type.to_string(),
            acquired_at: Instant::now(),
            timeout,
        });
        Ok(token)
    }

    /// The current lock holder, if any and unexpired. A call that observes
    /// an expired lock clears it first, so `current()` never reports a
    /// lock past its timeout.
    pub fn current(&self) -> Option<LockInfo> {
        let mut lock = self.lock.lock().unwrap();
        if lock.as_ref().is_some_and(|l| l.is_expired()) {
            *lock = None;
        }
        lock.clone()
    }

    /// Release the lock. A mismatched or missing token is a no-op — the
    /// caller is expected to release only a lock it believes it holds, and
    /// an already-expired-and-reclaimed lock should not be released out
    /// from under its new holder.
    pub fn release(&self, token: &str) {
        let mut lock = self.lock.lock().unwrap();
        if lock.as_ref().map(|l| l.token.as_str()) == Some(token) {
            *lock = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_while_held() {
        let manager = LockManager::new();
        manager.acquire("alice", "push", Duration::from_secs(60)).unwrap();
        let err = manager.acquire("bob", "push", Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.holder, "alice");
    }

    #[test]
    fn release_frees_the_lock() {
        let manager = LockManager::new();
        let token = manager.acquire("alice", "push", Duration::from_secs(60)).unwrap();
        manager.release(&token);
        assert!(manager.current().is_none());
        assert!(manager.acquire("bob", "push", Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn expired_lock_is_reclaimable() {
        let manager = LockManager::new();
        manager.acquire("alice", "push", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(manager.acquire("bob", "push", Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn lock_is_shared_across_both_services() {
        let manager = LockManager::new();
        manager.acquire("alice", "push", Duration::from_secs(60)).unwrap();
        let err = manager.acquire("bob", "push", Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.holder, "alice");
    }

    #[test]
    fn release_with_wrong_token_is_ignored() {
        let manager = LockManager::new();
        manager.acquire("alice", "push", Duration::from_secs(60)).unwrap();
        manager.release("not-the-real-token");
        assert!(manager.current().is_some());
    }
}

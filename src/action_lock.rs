//! C3 — Action Lock: durable, TTL-leased, owner-tagged lease on "the right
//! to drive the browser right now" (spec §4.3).
//!
//! All mutations happen under the softlock's [`FileMutex`](crate::file_mutex),
//! so two processes racing `acquire` for different owners are totally
//! ordered by successful writes (P1).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::atomic_file::{now_unix, read_json_lenient, write_json_atomic};
use crate::errors::ActionLockError;
use crate::file_mutex::{self, FileMutexConfig};
use crate::window_registry::WindowRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(75);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftlockState {
    pub owner: String,
    pub expires_at: i64,
}

pub struct AcquireOutcome {
    pub acquired: bool,
    pub reason: Option<String>,
    pub current_owner: Option<String>,
    pub expires_at: Option<i64>,
}

impl AcquireOutcome {
    fn granted() -> Self {
        Self {
            acquired: true,
            reason: None,
            current_owner: None,
            expires_at: None,
        }
    }

    fn busy(owner: String, expires_at: i64) -> Self {
        Self {
            acquired: false,
            reason: Some("busy".to_string()),
            current_owner: Some(owner),
            expires_at: Some(expires_at),
        }
    }

    fn io_error() -> Self {
        Self {
            acquired: false,
            reason: Some("io_error".to_string()),
            current_owner: None,
            expires_at: None,
        }
    }
}

/// C3 Action Lock bound to a single profile's softlock file.
pub struct ActionLock {
    softlock_path: PathBuf,
    mutex_path: PathBuf,
    mutex_config: FileMutexConfig,
}

impl ActionLock {
    pub fn new(coord_dir: &Path, profile_key: &str, mutex_config: FileMutexConfig) -> Self {
        Self {
            softlock_path: coord_dir.join(format!("{profile_key}.softlock.json")),
            mutex_path: coord_dir.join(format!("{profile_key}.softlock.mutex")),
            mutex_config,
        }
    }

    fn read_state(&self) -> Option<SoftlockState> {
        read_json_lenient(&self.softlock_path)
    }

    fn write_state(&self, state: &SoftlockState) -> Result<(), ActionLockError> {
        write_json_atomic(&self.softlock_path, state).map_err(ActionLockError::Io)
    }

    /// Try a single acquisition attempt under the softlock mutex. Returns
    /// `Ok(Some(outcome))` when a decision was reached (granted or
    /// definitively busy with fresh state), `Ok(None)` when the caller
    /// should poll again (lock was busy with no staleness yet observed).
    async fn try_once(&self, owner: &str, ttl: Duration) -> Result<AcquireOutcome, ActionLockError> {
        let guard = file_mutex::acquire_async(&self.mutex_path, Duration::from_secs(5), &self.mutex_config).await?;

        let now = now_unix();
        let outcome = match self.read_state() {
            None => {
                self.write_state(&SoftlockState {
                    owner: owner.to_string(),
                    expires_at: now + ttl.as_secs() as i64,
                })?;
                AcquireOutcome::granted()
            }
            Some(state) if state.expires_at <= now || state.owner == owner => {
                self.write_state(&SoftlockState {
                    owner: owner.to_string(),
                    expires_at: now + ttl.as_secs() as i64,
                })?;
                AcquireOutcome::granted()
            }
            Some(state) => AcquireOutcome::busy(state.owner, state.expires_at),
        };

        guard.release();
        Ok(outcome)
    }

    /// Acquire the Action Lock for `owner`, polling until success, busy
    /// timeout, or persistent I/O failure.
    pub async fn acquire(&self, owner: &str, ttl: Duration, wait: Duration) -> AcquireOutcome {
        let start = std::time::Instant::now();

        loop {
            match self.try_once(owner, ttl).await {
                Ok(outcome) if outcome.acquired => return outcome,
                Ok(outcome) => {
                    if start.elapsed() >= wait {
                        return outcome;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "action lock acquire attempt failed, retrying");
                    if start.elapsed() >= wait {
                        return AcquireOutcome::io_error();
                    }
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Renew the lease for `owner`. Only the current owner may renew.
    /// Piggybacks a registry heartbeat for `owner` on success (spec §4.3).
    pub async fn renew(&self, owner: &str, ttl: Duration, registry: &WindowRegistry) -> bool {
        let Ok(guard) =
            file_mutex::acquire_async(&self.mutex_path, Duration::from_secs(5), &self.mutex_config).await
        else {
            return false;
        };

        let now = now_unix();
        let renewed = match self.read_state() {
            Some(state) if state.owner == owner => {
                let write_ok = self
                    .write_state(&SoftlockState {
                        owner: owner.to_string(),
                        expires_at: now + ttl.as_secs() as i64,
                    })
                    .is_ok();
                write_ok
            }
            _ => false,
        };

        guard.release();

        if renewed {
            registry.heartbeat(owner);
        }

        renewed
    }

    /// Release the lease held by `owner`. A non-owner's release is a silent
    /// no-op and never mutates the file (P2).
    pub async fn release(&self, owner: &str) -> bool {
        let Ok(guard) =
            file_mutex::acquire_async(&self.mutex_path, Duration::from_secs(5), &self.mutex_config).await
        else {
            return false;
        };

        let released = match self.read_state() {
            Some(state) if state.owner == owner => {
                let _ = std::fs::remove_file(&self.softlock_path);
                true
            }
            _ => false,
        };

        guard.release();
        released
    }

    /// Current softlock state, if any (used by diagnostics and tests).
    pub fn current_state(&self) -> Option<SoftlockState> {
        self.read_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window_registry::WindowRegistry;

    fn setup() -> (tempfile::TempDir, ActionLock, WindowRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActionLock::new(dir.path(), "pk", FileMutexConfig::default());
        let registry = WindowRegistry::new(dir.path(), "pk", FileMutexConfig::default());
        (dir, lock, registry)
    }

    #[tokio::test]
    async fn fresh_acquire_succeeds() {
        let (_dir, lock, _reg) = setup();
        let outcome = lock
            .acquire("agent:1", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        assert!(outcome.acquired);
    }

    #[tokio::test]
    async fn second_owner_is_busy_until_released() {
        let (_dir, lock, _reg) = setup();
        let a = lock
            .acquire("agent:a", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        assert!(a.acquired);

        let b = lock
            .acquire("agent:b", Duration::from_secs(30), Duration::from_millis(200))
            .await;
        assert!(!b.acquired);
        assert_eq!(b.current_owner.as_deref(), Some("agent:a"));

        assert!(lock.release("agent:a").await);

        let b2 = lock
            .acquire("agent:b", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        assert!(b2.acquired);
    }

    #[tokio::test]
    async fn non_owner_release_is_noop() {
        let (_dir, lock, _reg) = setup();
        let a = lock
            .acquire("agent:a", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        assert!(a.acquired);

        let released = lock.release("agent:b").await;
        assert!(!released);

        // state must be unchanged (P2)
        let state = lock.current_state().unwrap();
        assert_eq!(state.owner, "agent:a");
    }

    #[tokio::test]
    async fn renew_requires_ownership_and_bumps_heartbeat() {
        let (_dir, lock, reg) = setup();
        lock.acquire("agent:a", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        reg.register("agent:a", "t1", 1);

        let before = reg.get("agent:a").unwrap().last_heartbeat;
        std::thread::sleep(Duration::from_millis(1100));
        let renewed = lock.renew("agent:a", Duration::from_secs(30), &reg).await;
        assert!(renewed);
        let after = reg.get("agent:a").unwrap().last_heartbeat;
        assert!(after >= before);

        let stolen = lock.renew("agent:ghost", Duration::from_secs(30), &reg).await;
        assert!(!stolen);
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable() {
        let (_dir, lock, _reg) = setup();
        lock.write_state(&SoftlockState {
            owner: "agent:dead".to_string(),
            expires_at: now_unix() - 10,
        })
        .unwrap();

        let outcome = lock
            .acquire("agent:new", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        assert!(outcome.acquired);
    }

    #[tokio::test]
    async fn release_then_acquire_leaves_file_absent() {
        let (_dir, lock, _reg) = setup();
        lock.acquire("agent:a", Duration::from_secs(30), Duration::from_secs(1))
            .await;
        lock.release("agent:a").await;
        assert!(lock.current_state().is_none());
    }
}

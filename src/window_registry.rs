//! C4 — Window Registry: persistent agent_tag → window mapping with
//! liveness heartbeats (spec §4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic_file::{now_unix, read_json_lenient, write_json_atomic};
use crate::errors::RegistryError;
use crate::file_mutex::{self, FileMutexConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub target_id: String,
    pub window_id: i64,
    pub pid: u32,
    pub created_at: i64,
    pub last_heartbeat: i64,
}

type RegistryMap = HashMap<String, RegistryEntry>;

/// Anything that can tell the registry whether a target still exists in the
/// shared browser, so `scan_and_clean` can detect targets closed out from
/// under a dead agent. Implemented by [`crate::driver::DriverSession`];
/// abstracted here so registry tests don't need a real browser.
pub trait TargetProbe {
    fn target_exists(&self, target_id: &str) -> bool;
    fn best_effort_close(&self, target_id: &str);
}

pub struct WindowRegistry {
    path: PathBuf,
    mutex_path: PathBuf,
    mutex_config: FileMutexConfig,
    pub stale_threshold: Duration,
}

impl WindowRegistry {
    pub fn new(coord_dir: &Path, profile_key: &str, mutex_config: FileMutexConfig) -> Self {
        Self {
            path: coord_dir.join(format!("{profile_key}.window_registry.json")),
            mutex_path: coord_dir.join(format!("{profile_key}.softlock.mutex")),
            mutex_config,
            stale_threshold: Duration::from_secs(300),
        }
    }

    fn read(&self) -> RegistryMap {
        read_json_lenient(&self.path).unwrap_or_default()
    }

    fn write(&self, map: &RegistryMap) -> Result<(), RegistryError> {
        write_json_atomic(&self.path, map).map_err(RegistryError::Io)
    }

    fn with_lock<F, R>(&self, f: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut RegistryMap) -> R,
    {
        let guard = file_mutex::acquire(&self.mutex_path, Duration::from_secs(5), &self.mutex_config)?;
        let mut map = self.read();
        let result = f(&mut map);
        self.write(&map)?;
        guard.release();
        Ok(result)
    }

    pub fn register(&self, agent_tag: &str, target_id: &str, window_id: i64) {
        let now = now_unix();
        if let Err(e) = self.with_lock(|map| {
            map.insert(
                agent_tag.to_string(),
                RegistryEntry {
                    target_id: target_id.to_string(),
                    window_id,
                    pid: std::process::id(),
                    created_at: now,
                    last_heartbeat: now,
                },
            );
        }) {
            warn!(error = %e, agent_tag, "failed to register window entry");
        }
    }

    /// Missing entry is a silent no-op (spec §4.4).
    pub fn heartbeat(&self, agent_tag: &str) {
        let now = now_unix();
        let _ = self.with_lock(|map| {
            if let Some(entry) = map.get_mut(agent_tag) {
                entry.last_heartbeat = now;
            }
        });
    }

    pub fn unregister(&self, agent_tag: &str) {
        let _ = self.with_lock(|map| {
            map.remove(agent_tag);
        });
    }

    pub fn get(&self, agent_tag: &str) -> Option<RegistryEntry> {
        self.read().get(agent_tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_pid_alive(pid: u32) -> bool {
        #[cfg(unix)]
        {
            // SAFETY: signal 0 delivers nothing; it only probes existence.
            unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
        }
        #[cfg(not(unix))]
        {
            pid == std::process::id()
        }
    }

    /// Remove orphaned (dead pid), stale (heartbeat too old), or
    /// target-gone entries. Idempotent; a failure closing one entry's
    /// target must not prevent processing the rest (spec §4.4).
    pub fn scan_and_clean(&self, probe: &dyn TargetProbe) -> Vec<(String, RegistryEntry)> {
        let now = now_unix();
        let stale_secs = self.stale_threshold.as_secs() as i64;

        let removed = self.with_lock(|map| {
            let mut removed = Vec::new();
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let Some(entry) = map.get(&key) else { continue };
                let dead = !Self::is_pid_alive(entry.pid);
                let stale = now - entry.last_heartbeat > stale_secs;
                let target_gone = !probe.target_exists(&entry.target_id);

                if dead || stale || target_gone {
                    if let Some(entry) = map.remove(&key) {
                        removed.push((key, entry));
                    }
                }
            }
            removed
        });

        match removed {
            Ok(removed) => {
                for (_, entry) in &removed {
                    probe.best_effort_close(&entry.target_id);
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "registry scan_and_clean failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeProbe {
        missing: RefCell<Vec<String>>,
        closed: RefCell<Vec<String>>,
    }

    impl TargetProbe for FakeProbe {
        fn target_exists(&self, target_id: &str) -> bool {
            !self.missing.borrow().contains(&target_id.to_string())
        }
        fn best_effort_close(&self, target_id: &str) {
            self.closed.borrow_mut().push(target_id.to_string());
        }
    }

    fn registry() -> (tempfile::TempDir, WindowRegistry) {
        let dir = tempfile::tempdir().unwrap();
        (dir, WindowRegistry::new(dir.path(), "pk", FileMutexConfig::default()))
    }

    #[test]
    fn register_then_unregister_is_noop_round_trip() {
        let (_dir, reg) = registry();
        reg.register("agent:a", "t1", 1);
        assert!(reg.get("agent:a").is_some());
        reg.unregister("agent:a");
        assert!(reg.get("agent:a").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn heartbeat_on_missing_entry_is_noop() {
        let (_dir, reg) = registry();
        reg.heartbeat("agent:nobody"); // must not panic
        assert!(reg.is_empty());
    }

    #[test]
    fn scan_and_clean_removes_dead_pid_entries() {
        let (_dir, reg) = registry();
        reg.with_lock(|map| {
            map.insert(
                "agent:ghost".to_string(),
                RegistryEntry {
                    target_id: "FAKE".to_string(),
                    window_id: 1,
                    pid: 4_194_304, // guaranteed-dead pid
                    created_at: 0,
                    last_heartbeat: now_unix(),
                },
            );
        })
        .unwrap();

        let probe = FakeProbe {
            missing: RefCell::new(vec![]),
            closed: RefCell::new(vec![]),
        };
        let removed = reg.scan_and_clean(&probe);
        assert_eq!(removed.len(), 1);
        assert!(reg.is_empty());
        assert_eq!(probe.closed.borrow().as_slice(), ["FAKE"]);
    }

    #[test]
    fn scan_and_clean_removes_stale_heartbeat_entries() {
        let (_dir, reg) = registry();
        reg.with_lock(|map| {
            map.insert(
                "agent:stale".to_string(),
                RegistryEntry {
                    target_id: "T1".to_string(),
                    window_id: 1,
                    pid: std::process::id(),
                    created_at: 0,
                    last_heartbeat: now_unix() - 10_000,
                },
            );
        })
        .unwrap();

        let probe = FakeProbe {
            missing: RefCell::new(vec![]),
            closed: RefCell::new(vec![]),
        };
        let removed = reg.scan_and_clean(&probe);
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn scan_and_clean_keeps_live_fresh_entries() {
        let (_dir, reg) = registry();
        reg.register("agent:live", "T1", 1);

        let probe = FakeProbe {
            missing: RefCell::new(vec![]),
            closed: RefCell::new(vec![]),
        };
        let removed = reg.scan_and_clean(&probe);
        assert!(removed.is_empty());
        assert!(reg.get("agent:live").is_some());
    }

    #[test]
    fn scan_and_clean_one_failure_does_not_block_others() {
        let (_dir, reg) = registry();
        reg.with_lock(|map| {
            map.insert(
                "agent:a".to_string(),
                RegistryEntry {
                    target_id: "GONE_A".to_string(),
                    window_id: 1,
                    pid: 4_194_304,
                    created_at: 0,
                    last_heartbeat: now_unix(),
                },
            );
            map.insert(
                "agent:b".to_string(),
                RegistryEntry {
                    target_id: "GONE_B".to_string(),
                    window_id: 2,
                    pid: 4_194_305,
                    created_at: 0,
                    last_heartbeat: now_unix(),
                },
            );
        })
        .unwrap();

        let probe = FakeProbe {
            missing: RefCell::new(vec![]),
            closed: RefCell::new(vec![]),
        };
        let removed = reg.scan_and_clean(&probe);
        assert_eq!(removed.len(), 2);
        assert!(reg.is_empty());
    }
}

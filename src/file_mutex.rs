//! C2 — File Mutex: advisory, best-effort cross-process exclusion.
//!
//! Backed by a sentinel file whose creation is atomic (`create_new`). Not a
//! kernel mutex: it protects atomic rewrites of coordination files and the
//! Startup Arbiter's critical section, nothing stronger (spec §4.2).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::errors::FileMutexError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct FileMutexConfig {
    /// How old (by mtime) a sentinel file must be before it is considered
    /// abandoned and safe to steal. Default 60s (spec §4.2, §6).
    pub stale_after: Duration,
}

impl Default for FileMutexConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
        }
    }
}

/// A held file mutex. Dropping (or calling [`FileMutexGuard::release`])
/// deletes the sentinel file; deletion by another process — because the
/// lock was stolen out from under us — is tolerated silently.
pub struct FileMutexGuard {
    path: PathBuf,
    released: bool,
}

impl FileMutexGuard {
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release file mutex");
            }
        }
    }
}

impl Drop for FileMutexGuard {
    fn drop(&mut self) {
        self.do_release();
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().map(|age| age > stale_after).unwrap_or(false),
        Err(_) => false,
    }
}

fn try_create(path: &Path) -> std::io::Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Steal a stale sentinel file: best-effort remove-then-recreate. Losing the
/// race to another stealer is fine — the loser just polls again.
fn steal(path: &Path) -> std::io::Result<bool> {
    let _ = std::fs::remove_file(path);
    try_create(path)
}

/// Acquire the file mutex named by `path`, waiting up to `wait` for it to
/// become available.
///
/// Returns a guard that releases on drop. Stale sentinel files (older than
/// `config.stale_after`) are stolen rather than waited out.
pub fn acquire(
    path: &Path,
    wait: Duration,
    config: &FileMutexConfig,
) -> Result<FileMutexGuard, FileMutexError> {
    let start = Instant::now();

    loop {
        match try_create(path) {
            Ok(true) => {
                return Ok(FileMutexGuard {
                    path: path.to_path_buf(),
                    released: false,
                });
            }
            Ok(false) => {
                if is_stale(path, config.stale_after) {
                    match steal(path) {
                        Ok(true) => {
                            return Ok(FileMutexGuard {
                                path: path.to_path_buf(),
                                released: false,
                            });
                        }
                        Ok(false) => { /* someone else won the steal race; keep polling */ }
                        Err(e) => {
                            return Err(FileMutexError::Io {
                                path: path.display().to_string(),
                                source: e,
                            });
                        }
                    }
                }
            }
            Err(e) => {
                return Err(FileMutexError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        }

        if start.elapsed() >= wait {
            return Err(FileMutexError::Timeout(path.display().to_string(), wait));
        }

        std::thread::sleep(POLL_INTERVAL.min(wait.saturating_sub(start.elapsed()).max(Duration::from_millis(1))));
    }
}

/// Async variant of [`acquire`] for call sites that must not block a tokio
/// worker thread (the polling loop sleeps via `tokio::time::sleep`).
pub async fn acquire_async(
    path: &Path,
    wait: Duration,
    config: &FileMutexConfig,
) -> Result<FileMutexGuard, FileMutexError> {
    let start = Instant::now();

    loop {
        match try_create(path) {
            Ok(true) => {
                return Ok(FileMutexGuard {
                    path: path.to_path_buf(),
                    released: false,
                });
            }
            Ok(false) => {
                if is_stale(path, config.stale_after) {
                    match steal(path) {
                        Ok(true) => {
                            return Ok(FileMutexGuard {
                                path: path.to_path_buf(),
                                released: false,
                            });
                        }
                        Ok(false) => {}
                        Err(e) => {
                            return Err(FileMutexError::Io {
                                path: path.display().to_string(),
                                source: e,
                            });
                        }
                    }
                }
            }
            Err(e) => {
                return Err(FileMutexError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        }

        if start.elapsed() >= wait {
            return Err(FileMutexError::Timeout(path.display().to_string(), wait));
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mutex");
        let config = FileMutexConfig::default();

        let guard = acquire(&path, Duration::from_secs(1), &config).unwrap();
        assert!(path.exists());
        guard.release();
        assert!(!path.exists());

        let _guard2 = acquire(&path, Duration::from_secs(1), &config).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mutex");
        let config = FileMutexConfig::default();

        let _guard = acquire(&path, Duration::from_secs(1), &config).unwrap();
        let err = acquire(&path, Duration::from_millis(150), &config).unwrap_err();
        assert!(matches!(err, FileMutexError::Timeout(_, _)));
    }

    #[test]
    fn stale_mutex_is_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mutex");
        std::fs::write(&path, b"").unwrap();

        // Backdate the mtime well past the staleness threshold.
        let old = std::time::SystemTime::now() - Duration::from_secs(120);
        let file = std::fs::File::open(&path).unwrap();
        file.set_modified(old).unwrap();

        let config = FileMutexConfig {
            stale_after: Duration::from_secs(60),
        };
        let guard = acquire(&path, Duration::from_secs(1), &config).unwrap();
        guard.release();
    }

    #[test]
    fn release_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mutex");
        let config = FileMutexConfig::default();
        let guard = acquire(&path, Duration::from_secs(1), &config).unwrap();
        std::fs::remove_file(&path).unwrap(); // simulate another process stealing it
        guard.release(); // must not panic
    }
}

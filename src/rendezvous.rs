//! C5 — Rendezvous File: cache of "which host:port is the shared browser's
//! debug endpoint", so late joiners attach instead of relaunching (spec §4.5).
//!
//! Grounded in the session-descriptor pattern used by `pw-cli`'s
//! `SessionBroker` (probe-before-trust, pid liveness, endpoint match) —
//! adapted here to a single shared `host:port` rather than a per-request
//! descriptor file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::atomic_file::{now_unix, read_json_lenient, write_json_atomic};
use crate::errors::RendezvousError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RendezvousState {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub written_at: i64,
}

pub struct RendezvousFile {
    path: PathBuf,
    pub ttl: Duration,
}

impl RendezvousFile {
    pub fn new(coord_dir: &Path, profile_key: &str, ttl: Duration) -> Self {
        Self {
            path: coord_dir.join(format!("{profile_key}.rendezvous.json")),
            ttl,
        }
    }

    pub fn write(&self, host: &str, port: u16) -> Result<(), RendezvousError> {
        let state = RendezvousState {
            host: host.to_string(),
            port,
            pid: std::process::id(),
            written_at: now_unix(),
        };
        write_json_atomic(&self.path, &state).map_err(RendezvousError::Io)
    }

    fn read(&self) -> Option<RendezvousState> {
        let state: RendezvousState = read_json_lenient(&self.path)?;
        if now_unix() - state.written_at > self.ttl.as_secs() as i64 {
            return None;
        }
        Some(state)
    }

    /// Read the cached endpoint and probe it. Returns `Some((host, port))`
    /// only for an endpoint that is reachable right now — a closed port
    /// never reports success (P8).
    pub async fn read_and_probe(&self, probe_timeout: Duration) -> Option<(String, u16)> {
        let state = self.read()?;
        if probe_port(&state.host, state.port, probe_timeout).await {
            Some((state.host, state.port))
        } else {
            None
        }
    }
}

/// Best-effort TCP connect probe with a bounded timeout. Used both for
/// rendezvous validation (spec §4.5) and for `permissive_attach` candidate
/// scanning (spec §4.6 step 5).
pub async fn probe_port(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn absent_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let rv = RendezvousFile::new(dir.path(), "pk", Duration::from_secs(86400));
        assert!(rv.read_and_probe(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_port_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let rv = RendezvousFile::new(dir.path(), "pk", Duration::from_secs(86400));
        rv.write("127.0.0.1", 1).unwrap(); // port 1 is never listening here
        assert!(rv.read_and_probe(Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test]
    async fn reachable_port_is_returned() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let rv = RendezvousFile::new(dir.path(), "pk", Duration::from_secs(86400));
        rv.write("127.0.0.1", port).unwrap();
        let found = rv.read_and_probe(Duration::from_millis(200)).await;
        assert_eq!(found, Some(("127.0.0.1".to_string(), port)));
    }

    #[tokio::test]
    async fn expired_ttl_falls_through() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let rv = RendezvousFile::new(dir.path(), "pk", Duration::from_secs(1));
        let state = RendezvousState {
            host: "127.0.0.1".to_string(),
            port,
            pid: std::process::id(),
            written_at: now_unix() - 10,
        };
        crate::atomic_file::write_json_atomic(&rv.path, &state).unwrap();
        assert!(rv.read_and_probe(Duration::from_millis(200)).await.is_none());
    }
}

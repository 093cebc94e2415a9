//! C7 — Session Context: the process-wide singleton holding everything a
//! wrapped tool call needs (spec §3, §4.7).
//!
//! Grounded in `src/manager.rs`'s `BrowserManager` (a `tokio::sync::Mutex`-
//! guarded `Option<BrowserWrapper>` behind a process-wide `Arc`), generalized
//! to also carry the coordination-layer state (profile key, debug endpoint,
//! target/window ids, agent tag) that a single-process-owned browser never
//! needed to track.

use std::path::PathBuf;
use std::sync::OnceLock;

use tokio::sync::Mutex;

use crate::action_lock::ActionLock;
use crate::config::GatewayConfig;
use crate::driver::DriverSession;
use crate::file_mutex::FileMutexConfig;
use crate::window_registry::WindowRegistry;

/// Mutable fields that change over a process's lifetime, guarded together
/// so `ensure_window`/`tear_down`/etc. see a consistent snapshot.
pub struct SessionState {
    pub driver: Option<DriverSession>,
    pub target_id: Option<String>,
    pub window_id: Option<i64>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            driver: None,
            target_id: None,
            window_id: None,
        }
    }
}

/// Process-wide singleton (spec §4.7: "created on first `get_context()` ...
/// never replaced except by explicit `reset_context()` used only for
/// tests").
pub struct SessionContext {
    pub config: GatewayConfig,
    pub coord_dir: PathBuf,
    pub profile_key: String,
    pub action_lock: ActionLock,
    pub registry: WindowRegistry,
    /// Cooperative intra-process lock (spec §4.8 step 3, §5 "Scheduling
    /// model"): held across suspension points for the duration of one
    /// wrapped tool call, so at most one logical tool execution runs per
    /// process at a time.
    pub intra_lock: Mutex<()>,
    pub state: Mutex<SessionState>,
}

impl SessionContext {
    fn new(config: GatewayConfig, profile_key: String) -> Self {
        let mutex_config = FileMutexConfig {
            stale_after: config.file_mutex_stale,
        };
        let action_lock = ActionLock::new(&config.coord_dir, &profile_key, mutex_config.clone());
        let mut registry = WindowRegistry::new(&config.coord_dir, &profile_key, mutex_config);
        registry.stale_threshold = config.registry_stale;

        Self {
            coord_dir: config.coord_dir.clone(),
            profile_key,
            action_lock,
            registry,
            intra_lock: Mutex::new(()),
            state: Mutex::new(SessionState::new()),
            config,
        }
    }

    pub fn ensure_agent_tag(&self) -> &'static str {
        crate::agent_identity::agent_tag()
    }

    pub async fn is_driver_initialized(&self) -> bool {
        self.state.lock().await.driver.is_some()
    }

    pub async fn is_window_ready(&self) -> bool {
        let state = self.state.lock().await;
        state.driver.is_some() && state.target_id.is_some()
    }

    /// Clear `target_id`/`window_id` only; the driver and debug endpoint
    /// remain intact so the same process can open another window later
    /// (spec §4.9 `close_window` step 4).
    pub async fn reset_window_state(&self) {
        let mut state = self.state.lock().await;
        state.target_id = None;
        state.window_id = None;
    }

    /// Quit the driver if any and clear all endpoint/window fields. Used
    /// only by the force-close-all path (spec §4.9).
    pub async fn tear_down(&self) {
        let mut state = self.state.lock().await;
        state.driver = None;
        state.target_id = None;
        state.window_id = None;
    }
}

static CONTEXT: OnceLock<Mutex<Option<&'static SessionContext>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<&'static SessionContext>> {
    CONTEXT.get_or_init(|| Mutex::new(None))
}

/// Return the process-wide singleton, creating it from `config`/`profile_key`
/// on first call. Subsequent calls ignore their arguments and return the
/// existing context (spec §4.7).
pub async fn get_context(config: &GatewayConfig, profile_key: &str) -> &'static SessionContext {
    let mut guard = slot().lock().await;
    if let Some(ctx) = *guard {
        return ctx;
    }
    let ctx: &'static SessionContext = Box::leak(Box::new(SessionContext::new(config.clone(), profile_key.to_string())));
    *guard = Some(ctx);
    ctx
}

/// Return the process-wide singleton if one has already been created,
/// without creating it. Used to gather diagnostics on an error path that
/// may have failed before `get_context` ever ran (e.g. `config_error`),
/// where standing up a fresh context just to describe the failure would be
/// misleading.
pub async fn peek_context() -> Option<&'static SessionContext> {
    *slot().lock().await
}

/// Test-only: drop the cached singleton so the next `get_context` builds a
/// fresh one. Leaks the old context's memory (acceptable — test-only, and
/// the process doesn't live long enough for it to matter).
#[cfg(any(test, feature = "test-util"))]
pub async fn reset_context() {
    let mut guard = slot().lock().await;
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_context_has_no_driver_or_window() {
        reset_context().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.coord_dir = dir.path().to_path_buf();

        let ctx = get_context(&config, "pk").await;
        assert!(!ctx.is_driver_initialized().await);
        assert!(!ctx.is_window_ready().await);
    }

    #[tokio::test]
    async fn get_context_is_idempotent_per_process() {
        reset_context().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.coord_dir = dir.path().to_path_buf();

        let a = get_context(&config, "pk").await as *const SessionContext;
        let b = get_context(&config, "pk").await as *const SessionContext;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn reset_window_state_preserves_driver_field_absence() {
        reset_context().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.coord_dir = dir.path().to_path_buf();

        let ctx = get_context(&config, "pk").await;
        {
            let mut state = ctx.state.lock().await;
            state.target_id = Some("T1".to_string());
            state.window_id = Some(1);
        }
        ctx.reset_window_state().await;
        let state = ctx.state.lock().await;
        assert!(state.target_id.is_none());
        assert!(state.window_id.is_none());
    }
}

//! Thin wrapper around the chromiumoxide driver: launch-or-attach, health
//! check, and per-target window operations. Everything above this module
//! talks to the browser only through [`DriverSession`], so the coordination
//! core stays agnostic to the CDP crate's exact API surface.
//!
//! Grounded in `src/browser/wrapper.rs`'s `BrowserWrapper` (handler task
//! lifecycle, Drop-based cleanup) and `src/manager.rs`'s health-check-then-
//! relaunch idiom, generalized from a single owned browser to one that may
//! be either freshly launched or attached to over CDP.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::GetWindowForTargetParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use crate::browser_setup;
use crate::errors::{StartupError, WindowError};
use crate::window_registry::TargetProbe;

/// An owned or attached chromiumoxide driver, plus the endpoint it was
/// reached at. Dropping aborts the event-handler task; it does NOT close
/// the browser process when attached (only the launcher should kill it).
pub struct DriverSession {
    browser: Browser,
    handler: JoinHandle<()>,
    debug_host: String,
    debug_port: u16,
    owns_process: bool,
}

impl DriverSession {
    pub fn debug_endpoint(&self) -> (String, u16) {
        (self.debug_host.clone(), self.debug_port)
    }

    pub fn owns_process(&self) -> bool {
        self.owns_process
    }

    /// Launch a fresh browser bound to `user_data_dir`, with the supplied
    /// stealth/profile configuration, on a fixed debug port so later
    /// attachers can rendezvous with it.
    pub async fn launch(
        user_data_dir: PathBuf,
        headless: bool,
        disable_security: bool,
        port: u16,
        binary_path: Option<PathBuf>,
    ) -> Result<Self, StartupError> {
        let (browser, handler) = browser_setup::launch_browser_on_port(
            headless,
            Some(user_data_dir),
            disable_security,
            port,
            binary_path,
        )
        .await
        .map_err(|e| StartupError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            browser,
            handler,
            debug_host: "127.0.0.1".to_string(),
            debug_port: port,
            owns_process: true,
        })
    }

    /// Attach to an already-running browser's debug endpoint.
    pub async fn attach(host: &str, port: u16) -> Result<Self, StartupError> {
        let ws_url = format!("ws://{host}:{port}/devtools/browser");
        let (browser, mut handler) = Browser::connect(&ws_url)
            .await
            .map_err(|e| StartupError::AttachFailed(host.to_string(), port, e.to_string()))?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    trace!(error = %e, "attached browser handler event error");
                }
            }
            info!("attached browser handler task completed");
        });

        Ok(Self {
            browser,
            handler: handler_task,
            debug_host: host.to_string(),
            debug_port: port,
            owns_process: false,
        })
    }

    /// Cheap liveness check used by the Startup Arbiter's rendezvous
    /// fast-path and by diagnostics (spec §4.5, §4.7).
    pub async fn health_check(&self) -> bool {
        self.browser.version().await.is_ok()
    }

    /// Create a new top-level browser window (not a tab in an existing
    /// window) and return its `(target_id, window_id)`.
    pub async fn new_window(&self, url: &str) -> Result<(String, i64), WindowError> {
        let params = CreateTargetParams::builder()
            .url(url)
            .new_window(true)
            .build()
            .map_err(WindowError::CreateFailed)?;

        let target_id = self
            .browser
            .new_tab(params)
            .await
            .map_err(|e| WindowError::CreateFailed(e.to_string()))?
            .target_id()
            .clone();

        let window_params = GetWindowForTargetParams::builder()
            .target_id(target_id.clone())
            .build();
        let window_id = self
            .browser
            .execute(window_params)
            .await
            .map_err(|e| WindowError::Driver(e.to_string()))?
            .result
            .window_id
            .0 as i64;

        Ok((target_id.inner().clone(), window_id))
    }

    /// Best-effort close of a single target by id. Failures are logged and
    /// swallowed — callers treat this as advisory cleanup, never a
    /// correctness-critical step (spec §4.4, §4.9).
    pub async fn close_target(&self, target_id: &str) {
        let pages = match self.browser.pages().await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(target_id, error = %e, "failed to list pages while closing target");
                return;
            }
        };

        for page in pages {
            if page.target_id().inner() == target_id
                && let Err(e) = page.close().await
            {
                warn!(target_id, error = %e, "failed to close target");
            }
        }
    }

    pub async fn target_exists_async(&self, target_id: &str) -> bool {
        match self.browser.pages().await {
            Ok(pages) => pages.iter().any(|p| p.target_id().inner() == target_id),
            Err(e) => {
                warn!(target_id, error = %e, "failed to list pages while probing target");
                false
            }
        }
    }

    /// Resolve the live `Page` handle for `target_id`, the handle every
    /// tool handler drives DOM operations through.
    pub async fn page_for_target(
        &self,
        target_id: &str,
    ) -> Result<chromiumoxide::Page, WindowError> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| WindowError::Driver(e.to_string()))?;

        pages
            .into_iter()
            .find(|p| p.target_id().inner() == target_id)
            .ok_or(WindowError::RevalidationFailed)
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        self.handler.abort();
        if self.owns_process {
            info!("dropping owned DriverSession; browser process will be killed by chromiumoxide");
        } else {
            info!("dropping attached DriverSession; leaving shared browser process running");
        }
    }
}

/// Bridges [`DriverSession`]'s async target operations to the synchronous
/// [`TargetProbe`] trait the Window Registry's `scan_and_clean` expects.
/// Requires a multi-threaded tokio runtime (this crate's default `tokio`
/// feature set), since it blocks the calling thread on an async call.
pub struct DriverProbe<'a> {
    pub driver: &'a DriverSession,
    pub handle: tokio::runtime::Handle,
}

impl TargetProbe for DriverProbe<'_> {
    fn target_exists(&self, target_id: &str) -> bool {
        tokio::task::block_in_place(|| self.handle.block_on(self.driver.target_exists_async(target_id)))
    }

    fn best_effort_close(&self, target_id: &str) {
        tokio::task::block_in_place(|| self.handle.block_on(self.driver.close_target(target_id)));
    }
}

/// Poll a freshly launched process's debug port until it answers, bounded
/// by `timeout` (spec §4.6 step "launch").
pub async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> Result<(), StartupError> {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if crate::rendezvous::probe_port(host, port, Duration::from_millis(250)).await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(StartupError::Timeout(timeout))
}

//! C9 — Window Lifecycle: `ensure_window`, `close_window`, `force_close_all`
//! (spec §4.9). Operates on a [`SessionContext`]'s state under its
//! intra-process lock; callers (the Exclusive-Access Protocol) are
//! responsible for holding that lock for the duration.

use tracing::{info, warn};

use crate::driver::{DriverProbe, DriverSession};
use crate::errors::WindowError;
use crate::session_context::SessionContext;

const BLANK_URL: &str = "about:blank";

/// Validate the current target, or create and register a fresh window
/// (spec §4.9 `ensure_window`).
pub async fn ensure_window(ctx: &SessionContext) -> Result<(), WindowError> {
    {
        let state = ctx.state.lock().await;
        if let (Some(driver), Some(target_id)) = (state.driver.as_ref(), state.target_id.as_ref())
            && driver.target_exists_async(target_id).await
        {
            return Ok(());
        }
    }

    // Cleanup pass: remove orphaned registry entries before creating a new
    // window, so a crashed agent's leftover window doesn't linger forever.
    {
        let state = ctx.state.lock().await;
        if let Some(driver) = state.driver.as_ref() {
            let probe = DriverProbe {
                driver,
                handle: tokio::runtime::Handle::current(),
            };
            let removed = ctx.registry.scan_and_clean(&probe);
            if !removed.is_empty() {
                info!(count = removed.len(), "cleaned up orphaned window registry entries");
            }
        }
    }

    let (target_id, window_id) = {
        let state = ctx.state.lock().await;
        let driver = state
            .driver
            .as_ref()
            .ok_or_else(|| WindowError::Driver("driver not initialized".to_string()))?;
        create_and_bind(driver).await?
    };

    {
        let mut state = ctx.state.lock().await;
        state.target_id = Some(target_id.clone());
        state.window_id = Some(window_id);
    }

    ctx.registry.register(ctx.ensure_agent_tag(), &target_id, window_id);

    Ok(())
}

async fn create_and_bind(driver: &DriverSession) -> Result<(String, i64), WindowError> {
    let (target_id, window_id) = driver.new_window(BLANK_URL).await?;

    // Poll briefly until the driver's own handle list reflects the new
    // target (spec §4.9 step 4: "poll briefly, default 20 x 50ms").
    let mut attempts = 0;
    while attempts < 20 {
        if driver.target_exists_async(&target_id).await {
            return Ok((target_id, window_id));
        }
        attempts += 1;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    Err(WindowError::RevalidationFailed)
}

/// `close_window()` (spec §4.9): returns `false` if there was no window to
/// close.
pub async fn close_window(ctx: &SessionContext) -> bool {
    let target_id = {
        let state = ctx.state.lock().await;
        match state.target_id.clone() {
            Some(id) => id,
            None => return false,
        }
    };

    {
        let state = ctx.state.lock().await;
        if let Some(driver) = state.driver.as_ref() {
            driver.close_target(&target_id).await;
        }
    }

    ctx.registry.unregister(ctx.ensure_agent_tag());
    ctx.reset_window_state().await;
    true
}

/// Result of a `force_close_all()` sweep: pids successfully signalled, and
/// any per-process failures encountered along the way.
pub struct ForceCloseOutcome {
    pub killed_processes: Vec<u32>,
    pub errors: Vec<String>,
}

/// `force_close_all()` (spec §4.9): quit the driver, best-effort kill the
/// shared browser process family, tear down context, release the Action
/// Lock, and delete this profile's coordination files.
pub async fn force_close_all(ctx: &SessionContext) -> ForceCloseOutcome {
    let owner = ctx.ensure_agent_tag();

    let user_data_dir = ctx
        .config
        .resolve_browser_family()
        .0
        .cloned()
        .or_else(|| ctx.config.primary_user_data_dir.clone());
    let outcome = match user_data_dir {
        Some(user_data_dir) => kill_browser_family(&user_data_dir),
        None => ForceCloseOutcome {
            killed_processes: Vec::new(),
            errors: Vec::new(),
        },
    };

    ctx.tear_down().await;

    if !ctx.action_lock.release(owner).await {
        warn!(owner, "force_close_all: action lock was not held by this owner");
    }

    for suffix in [
        "softlock.json",
        "softlock.mutex",
        "startup.mutex",
        "window_registry.json",
        "rendezvous.json",
    ] {
        let path = ctx.coord_dir.join(format!("{}.{suffix}", ctx.profile_key));
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "failed to remove coordination file during force_close_all");
        }
    }

    outcome
}

/// Terminate any OS process whose executable name looks like a Chrome/
/// Chromium family browser and whose command line references this
/// profile's `user_data_dir` (spec §4.9 `force_close_all` step 2).
fn kill_browser_family(user_data_dir: &std::path::Path) -> ForceCloseOutcome {
    use sysinfo::System;

    let user_data_dir_str = user_data_dir.to_string_lossy();
    let mut system = System::new_all();
    system.refresh_all();

    let mut killed_processes = Vec::new();
    let mut errors = Vec::new();

    for (pid, process) in system.processes() {
        let name = process.name().to_string_lossy().to_ascii_lowercase();
        let is_browser_family = ["chrome", "chromium", "google-chrome"]
            .iter()
            .any(|needle| name.contains(needle));
        if !is_browser_family {
            continue;
        }

        let cmdline_matches = process
            .cmd()
            .iter()
            .any(|arg| arg.to_string_lossy().contains(user_data_dir_str.as_ref()));
        if !cmdline_matches {
            continue;
        }

        let pid_u32 = pid.as_u32();
        info!(pid = pid_u32, "force_close_all: terminating matching browser process");
        if process.kill() {
            killed_processes.push(pid_u32);
        } else {
            let message = format!("failed to signal pid {pid_u32} for termination");
            warn!(pid = pid_u32, "force_close_all: {message}");
            errors.push(message);
        }
    }

    ForceCloseOutcome { killed_processes, errors }
}

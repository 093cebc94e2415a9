//! C6 — Startup Arbiter: ensures exactly one shared browser process is
//! running in developer mode for a profile, and that every Session Context
//! ends with a valid `(debug_host, debug_port, driver)` (spec §4.6).
//!
//! Grounded in `src/manager.rs`'s `BrowserManager::get_or_launch` (health
//! check before reuse, `OnceLock`-free lazy launch under a lock) and
//! `src/browser_setup.rs`'s launch sequence, generalized into an explicit
//! multi-step election so concurrent processes converge on one browser.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::cdp_probe;
use crate::config::GatewayConfig;
use crate::driver::DriverSession;
use crate::errors::StartupError;
use crate::file_mutex::{self, FileMutexConfig};
use crate::rendezvous::RendezvousFile;

/// A small fixed set of extra ports tried during permissive attach, beyond
/// the configured default (spec §4.6 step 5). Kept short and well-known,
/// matching the CDP ecosystem's usual ports.
const PERMISSIVE_CANDIDATE_PORTS: &[u16] = &[9222, 9223, 9229];

pub struct StartupOutcome {
    pub driver: DriverSession,
}

/// Run the full election algorithm once. Callers (Session Context) invoke
/// this only when a driver is not already present.
pub async fn ensure_browser(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &Path,
) -> Result<StartupOutcome, StartupError> {
    let rendezvous = RendezvousFile::new(&config.coord_dir, profile_key, config.rendezvous_ttl);
    let probe_timeout = Duration::from_millis(500);

    // Step 1 — fast path.
    if let Some((host, port)) = rendezvous.read_and_probe(probe_timeout).await {
        info!(host, port, "rendezvous fast path hit, attaching");
        match DriverSession::attach(&host, port).await {
            Ok(driver) => return Ok(StartupOutcome { driver }),
            Err(e) => warn!(error = %e, "rendezvous endpoint probed live but attach failed, falling through"),
        }
    }

    // Step 2 — acquire startup mutex.
    let startup_mutex_path = config.coord_dir.join(format!("{profile_key}.startup.mutex"));
    let mutex_config = FileMutexConfig {
        stale_after: config.file_mutex_stale,
    };

    let guard = match file_mutex::acquire_async(&startup_mutex_path, config.startup_mutex_wait, &mutex_config).await
    {
        Ok(guard) => guard,
        Err(_) => {
            // Another process may have finished meanwhile.
            if let Some((host, port)) = rendezvous.read_and_probe(probe_timeout).await
                && let Ok(driver) = DriverSession::attach(&host, port).await
            {
                return Ok(StartupOutcome { driver });
            }
            return Err(StartupError::Contended);
        }
    };

    let result = run_under_mutex(config, profile_key, user_data_dir, &rendezvous, probe_timeout).await;
    guard.release();
    result
}

async fn run_under_mutex(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &Path,
    rendezvous: &RendezvousFile,
    probe_timeout: Duration,
) -> Result<StartupOutcome, StartupError> {
    // Step 3 — re-check under mutex.
    if let Some((host, port)) = rendezvous.read_and_probe(probe_timeout).await
        && let Ok(driver) = DriverSession::attach(&host, port).await
    {
        info!(host, port, "rendezvous valid after acquiring startup mutex");
        return Ok(StartupOutcome { driver });
    }

    // Step 4 — discovery via the browser's own active-port file, if the
    // profile directory contains one (Chrome/Chromium write `DevToolsActivePort`
    // next to the profile when launched with remote debugging enabled).
    // A candidate discovered this way is validated with a real `/json/version`
    // fetch rather than a bare TCP probe, since the active-port file could in
    // principle be stale and now point at an unrelated listener.
    if let Some(port) = read_active_port_file(user_data_dir)
        && cdp_probe::fetch_version_info("127.0.0.1", port, probe_timeout).await.is_ok()
        && let Ok(driver) = DriverSession::attach("127.0.0.1", port).await
    {
        info!(port, "discovered existing browser via active-port file");
        persist_rendezvous(rendezvous, "127.0.0.1", port);
        return Ok(StartupOutcome { driver });
    }

    // Step 5 — permissive attach.
    if config.attach_any_profile {
        for &port in PERMISSIVE_CANDIDATE_PORTS {
            if cdp_probe::fetch_version_info("127.0.0.1", port, probe_timeout).await.is_ok()
                && let Ok(driver) = DriverSession::attach("127.0.0.1", port).await
            {
                info!(port, "permissive attach succeeded");
                persist_rendezvous(rendezvous, "127.0.0.1", port);
                return Ok(StartupOutcome { driver });
            }
        }
    }

    // Step 6 — launch.
    let port = config.fixed_debug_port.unwrap_or(config.default_debug_port);
    let (_, binary_path) = config.resolve_browser_family();
    info!(port, "no existing browser found, launching a new one");
    let driver = DriverSession::launch(
        user_data_dir.to_path_buf(),
        config.headless,
        config.disable_security,
        port,
        binary_path.cloned(),
    )
    .await?;

    crate::driver::wait_for_port("127.0.0.1", port, config.launch_timeout).await?;

    // Step 7 — attach and persist. DriverSession::launch already attaches
    // (chromiumoxide drives the process it spawned directly), so we just
    // persist rendezvous for the next process.
    persist_rendezvous(rendezvous, "127.0.0.1", port);

    Ok(StartupOutcome { driver })
}

fn persist_rendezvous(rendezvous: &RendezvousFile, host: &str, port: u16) {
    if let Err(e) = rendezvous.write(host, port) {
        warn!(error = %e, "failed to persist rendezvous file");
    }
}

/// Look for Chrome/Chromium's `DevToolsActivePort` file, which the browser
/// itself writes at the top of the user-data-dir the first line being the
/// port number.
fn read_active_port_file(user_data_dir: &Path) -> Option<u16> {
    let path = user_data_dir.join("DevToolsActivePort");
    let contents = std::fs::read_to_string(path).ok()?;
    contents.lines().next()?.trim().parse().ok()
}
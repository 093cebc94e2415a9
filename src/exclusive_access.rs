//! C8 — Exclusive-Access Protocol: the wrapper applied to every tool
//! handler (spec §4.8). Drives Session Context through
//! `IDLE → CONFIG_OK → INTRA_LOCKED → ACTION_LOCKED → WINDOW_READY →
//! RUNNING → COMPLETED`. A failing path releases everything acquired so
//! far; a successful one leaves the Action Lock in place for `owner` to
//! expire by TTL (see `run`'s step 8) while still releasing the
//! intra-process lock.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, WindowError};
use crate::session_context::{self, SessionContext};
use crate::startup_arbiter;
use crate::window_lifecycle;

/// Run `handler` under the full exclusive-access wrapper for the profile
/// identified by `profile_key`/`user_data_dir`. Returns whatever the
/// handler returns, or a `GatewayError` from a step before the handler ran.
pub async fn run<F, Fut, T>(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    handler: F,
) -> Result<T, GatewayError>
where
    F: FnOnce(&'static SessionContext) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    // Step 1 — early config validation.
    if profile_key.is_empty() {
        return Err(GatewayError::Config("profile_key must not be empty".to_string()));
    }
    if config.strict_profile && !user_data_dir.exists() {
        return Err(GatewayError::Config(format!(
            "profile directory does not exist: {}",
            user_data_dir.display()
        )));
    }

    let ctx = session_context::get_context(config, profile_key).await;

    // Step 2 — ensure agent tag.
    let owner = ctx.ensure_agent_tag();

    // Step 3 — acquire intra-process lock, held for the whole call.
    let _intra_guard = ctx.intra_lock.lock().await;

    // Step 4 — acquire Action Lock.
    let outcome = ctx
        .action_lock
        .acquire(owner, config.action_lock_ttl, config.action_lock_wait)
        .await;
    if !outcome.acquired {
        return Err(GatewayError::LockBusy {
            current_owner: outcome.current_owner.unwrap_or_default(),
            expires_at: outcome.expires_at.unwrap_or_default(),
        });
    }

    // Step 5 — ensure driver and window.
    if let Err(e) = ensure_driver_and_window(ctx, config, user_data_dir).await {
        ctx.action_lock.release(owner).await;
        return Err(e);
    }

    // Step 6 — invoke handler, renewing the lease periodically.
    let result = run_with_renewal(ctx, owner, config.action_lock_ttl, handler).await;

    // Step 8 — release on failure only. A successful call (including
    // `start_session`/`close_window`) leaves the Action Lock in place to
    // expire by TTL rather than deleting it immediately: spec.md's S1
    // scenario requires the softlock still hold `owner`'s lease right after
    // `start_session`, and its §9 reconciliation note makes the same call
    // for `close_window` explicit ("the softlock still holds an (expiring)
    // lease from the closer ... explicit release via the `unlock` handler is
    // available but not automatic"). A handler error, by contrast, releases
    // immediately per the propagation policy. Intra lock releases
    // unconditionally on drop of `_intra_guard`.
    if result.is_err() {
        ctx.action_lock.release(owner).await;
    }

    result
}

/// A lighter variant for handlers that only need the intra-process lock
/// and a config check — `unlock` (releasing a lease by definition cannot
/// itself require holding the Action Lock) and `force_close_all` (must
/// work even when no driver/window currently exists, rather than standing
/// one up just to tear it down).
pub async fn run_bare<F, Fut, T>(
    config: &GatewayConfig,
    profile_key: &str,
    handler: F,
) -> Result<T, GatewayError>
where
    F: FnOnce(&'static SessionContext) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if profile_key.is_empty() {
        return Err(GatewayError::Config("profile_key must not be empty".to_string()));
    }

    let ctx = session_context::get_context(config, profile_key).await;
    let _intra_guard = ctx.intra_lock.lock().await;
    handler(ctx).await
}

async fn ensure_driver_and_window(
    ctx: &'static SessionContext,
    config: &GatewayConfig,
    user_data_dir: &std::path::Path,
) -> Result<(), GatewayError> {
    // Health-check an existing driver before trusting it: a crashed browser
    // process leaves a driver handle that looks present but answers nothing,
    // so re-elect via the Startup Arbiter rather than failing outright.
    let needs_startup = {
        let state = ctx.state.lock().await;
        match state.driver.as_ref() {
            Some(driver) => !driver.health_check().await,
            None => true,
        }
    };

    if needs_startup {
        let outcome = startup_arbiter::ensure_browser(config, &ctx.profile_key, user_data_dir).await?;
        let mut state = ctx.state.lock().await;
        state.driver = Some(outcome.driver);
        // Any window this process thought it owned lived in the replaced
        // browser; it no longer exists, so the next step must recreate it.
        state.target_id = None;
        state.window_id = None;
    }

    window_lifecycle::ensure_window(ctx).await.map_err(|e| match e {
        WindowError::Driver(msg) => GatewayError::DriverNotInitialized(msg),
        other => GatewayError::Window(other),
    })
}

async fn run_with_renewal<F, Fut, T>(
    ctx: &'static SessionContext,
    owner: &'static str,
    ttl: Duration,
    handler: F,
) -> Result<T, GatewayError>
where
    F: FnOnce(&'static SessionContext) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let renew_interval = (ttl / 2).max(Duration::from_millis(100));
    let mut ticker = tokio::time::interval(renew_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately; consume it so renewal only happens
    // after at least one interval has elapsed.
    ticker.tick().await;

    let handler_future = handler(ctx);
    tokio::pin!(handler_future);

    loop {
        tokio::select! {
            result = &mut handler_future => {
                return result;
            }
            _ = ticker.tick() => {
                if !ctx.action_lock.renew(owner, ttl, &ctx.registry).await {
                    warn!(owner, "action lock renewal failed mid-handler, aborting with lock_lost");
                    return Err(GatewayError::LockLost);
                }
            }
        }
    }
}

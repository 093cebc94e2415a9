//! `start_session`, `close_window`, `force_close_all`, `unlock` (spec §6).

use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::GatewayError;
use crate::exclusive_access;
use crate::tools::envelope;
use crate::tools::snapshot;
use crate::window_lifecycle;

#[derive(Serialize)]
struct StartSessionReply {
    session_id: String,
    debugger: String,
    lock_ttl_seconds: u64,
    snapshot: Option<snapshot::Snapshot>,
}

pub async fn start_session(config: &GatewayConfig, profile_key: &str, user_data_dir: &std::path::Path) -> Value {
    let result: Result<StartSessionReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, |ctx| async move {
            let state = ctx.state.lock().await;
            let driver = state
                .driver
                .as_ref()
                .ok_or_else(|| GatewayError::DriverNotInitialized("no driver after startup".to_string()))?;
            let (host, port) = driver.debug_endpoint();

            let snapshot = if let Some(target_id) = state.target_id.clone() {
                match driver.page_for_target(&target_id).await {
                    Ok(page) => Some(snapshot::capture(&page, ctx.config.snapshot_max_chars).await),
                    Err(_) => None,
                }
            } else {
                None
            };

            Ok(StartSessionReply {
                session_id: ctx.ensure_agent_tag().to_string(),
                debugger: format!("{host}:{port}"),
                lock_ttl_seconds: ctx.config.action_lock_ttl.as_secs(),
                snapshot,
            })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

#[derive(Serialize)]
struct CloseWindowReply {
    closed: bool,
}

pub async fn close_window(config: &GatewayConfig, profile_key: &str, user_data_dir: &std::path::Path) -> Value {
    let result: Result<CloseWindowReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, |ctx| async move {
            Ok(CloseWindowReply {
                closed: window_lifecycle::close_window(ctx).await,
            })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

#[derive(Serialize)]
struct ForceCloseAllReply {
    killed_processes: Vec<u32>,
    errors: Vec<String>,
}

pub async fn force_close_all(config: &GatewayConfig, profile_key: &str) -> Value {
    let result: Result<ForceCloseAllReply, GatewayError> =
        exclusive_access::run_bare(config, profile_key, |ctx| async move {
            let outcome = window_lifecycle::force_close_all(ctx).await;
            Ok(ForceCloseAllReply {
                killed_processes: outcome.killed_processes,
                errors: outcome.errors,
            })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

#[derive(Serialize)]
struct UnlockReply {
    released: bool,
}

pub async fn unlock(config: &GatewayConfig, profile_key: &str) -> Value {
    let result: Result<UnlockReply, GatewayError> =
        exclusive_access::run_bare(config, profile_key, |ctx| async move {
            let owner = ctx.ensure_agent_tag();
            Ok(UnlockReply {
                released: ctx.action_lock.release(owner).await,
            })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

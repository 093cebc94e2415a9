//! `navigate` (spec §6).

use std::time::Duration;

use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::GatewayError;
use crate::exclusive_access;
use crate::tools::envelope;
use crate::tools::snapshot::{self, Snapshot};

pub struct NavigateArgs {
    pub url: String,
    pub wait_for: WaitUntil,
    pub timeout_sec: u64,
}

#[derive(Clone, Copy)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
}

impl WaitUntil {
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            other => Err(GatewayError::Config(format!("unknown wait_for: {other}"))),
        }
    }
}

pub async fn navigate(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: NavigateArgs,
) -> Value {
    let result: Result<Snapshot, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
                return Err(GatewayError::Config("url must start with http:// or https://".to_string()));
            }

            let state = ctx.state.lock().await;
            let driver = state
                .driver
                .as_ref()
                .ok_or_else(|| GatewayError::DriverNotInitialized("no driver".to_string()))?;
            let target_id = state
                .target_id
                .clone()
                .ok_or_else(|| GatewayError::Window(crate::errors::WindowError::AttachTimeout))?;
            let page = driver
                .page_for_target(&target_id)
                .await
                .map_err(GatewayError::Window)?;

            let timeout = Duration::from_secs(args.timeout_sec);
            tokio::time::timeout(timeout, page.goto(&args.url))
                .await
                .map_err(|_| GatewayError::Timeout(format!("navigate to {} timed out", args.url)))?
                .map_err(|e| GatewayError::Internal(format!("navigation failed: {e}")))?;

            match args.wait_for {
                WaitUntil::Load => {
                    let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;
                }
                WaitUntil::DomContentLoaded => {
                    // chromiumoxide's wait_for_navigation already waits for the
                    // load event; DOMContentLoaded is a strictly earlier point
                    // we don't have a dedicated wait for, so this is a no-op
                    // beyond the goto() above, which blocks until navigation
                    // commits.
                }
            }

            Ok(snapshot::capture(&page, ctx.config.snapshot_max_chars).await)
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

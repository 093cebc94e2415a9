//! `wait_for_element`, `click`, `fill`, `send_keys`, `scroll` (spec §6).

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, WindowError};
use crate::exclusive_access;
use crate::tools::envelope;
use crate::tools::selector::{find_element, SelectorType};
use crate::tools::snapshot::{self, Snapshot};

async fn active_page(ctx: &crate::session_context::SessionContext) -> Result<chromiumoxide::Page, GatewayError> {
    let state = ctx.state.lock().await;
    let driver = state
        .driver
        .as_ref()
        .ok_or_else(|| GatewayError::DriverNotInitialized("no driver".to_string()))?;
    let target_id = state
        .target_id
        .clone()
        .ok_or(GatewayError::Window(WindowError::AttachTimeout))?;
    driver.page_for_target(&target_id).await.map_err(GatewayError::Window)
}

pub struct SelectorArgs {
    pub selector: String,
    pub selector_type: String,
    pub timeout_sec: u64,
    pub iframe_selector: Option<String>,
}

#[derive(Serialize)]
struct FoundReply {
    found: bool,
}

pub async fn wait_for_element(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: SelectorArgs,
) -> Value {
    let result: Result<FoundReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = active_page(ctx).await?;
            let selector_type = SelectorType::parse(&args.selector_type)?;
            let timeout = Duration::from_secs(args.timeout_sec);
            let found = find_element(&page, &args.selector, selector_type, args.iframe_selector.as_deref(), timeout)
                .await
                .is_ok();
            Ok(FoundReply { found })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

pub async fn click(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: SelectorArgs,
) -> Value {
    let result: Result<Snapshot, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = active_page(ctx).await?;
            let selector_type = SelectorType::parse(&args.selector_type)?;
            let timeout = Duration::from_secs(args.timeout_sec);
            let element = find_element(&page, &args.selector, selector_type, args.iframe_selector.as_deref(), timeout).await?;

            element
                .click()
                .await
                .map_err(|e| GatewayError::ElementNotInteractable(e.to_string()))?;

            Ok(snapshot::capture(&page, ctx.config.snapshot_max_chars).await)
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

pub struct FillArgs {
    pub selector: SelectorArgs,
    pub text: String,
    pub clear_first: bool,
}

pub async fn fill(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: FillArgs,
) -> Value {
    let result: Result<Snapshot, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = active_page(ctx).await?;
            let selector_type = SelectorType::parse(&args.selector.selector_type)?;
            let timeout = Duration::from_secs(args.selector.timeout_sec);
            let element = find_element(
                &page,
                &args.selector.selector,
                selector_type,
                args.selector.iframe_selector.as_deref(),
                timeout,
            )
            .await?;

            element
                .click()
                .await
                .map_err(|e| GatewayError::ElementNotInteractable(e.to_string()))?;

            if args.clear_first {
                element
                    .call_js_fn("function() { this.value = ''; }", false)
                    .await
                    .map_err(|e| GatewayError::ElementNotInteractable(e.to_string()))?;
            }

            element
                .type_str(&args.text)
                .await
                .map_err(|e| GatewayError::ElementNotInteractable(e.to_string()))?;

            Ok(snapshot::capture(&page, ctx.config.snapshot_max_chars).await)
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

pub struct SendKeysArgs {
    pub key: String,
    pub selector: Option<String>,
    pub selector_type: String,
}

#[derive(Serialize)]
struct EmptyReply {}

pub async fn send_keys(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: SendKeysArgs,
) -> Value {
    let result: Result<EmptyReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = active_page(ctx).await?;

            if let Some(selector) = args.selector.as_ref() {
                let selector_type = SelectorType::parse(&args.selector_type)?;
                let element = find_element(&page, selector, selector_type, None, Duration::from_secs(10)).await?;
                element
                    .press_key(&args.key)
                    .await
                    .map_err(|e| GatewayError::ElementNotInteractable(e.to_string()))?;
            } else {
                page.press_key(&args.key)
                    .await
                    .map_err(|e| GatewayError::Internal(format!("send_keys failed: {e}")))?;
            }

            Ok(EmptyReply {})
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

pub async fn scroll(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    x: f64,
    y: f64,
) -> Value {
    let result: Result<EmptyReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = active_page(ctx).await?;
            page.evaluate(format!("window.scrollTo({x}, {y});"))
                .await
                .map_err(|e| GatewayError::Internal(format!("scroll failed: {e}")))?;
            Ok(EmptyReply {})
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

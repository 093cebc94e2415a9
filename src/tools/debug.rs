//! `debug_element` and `get_diagnostics` (spec §6).

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::{Diagnostics, GatewayError};
use crate::exclusive_access;
use crate::tools::envelope;
use crate::tools::selector::{find_element, SelectorType};

#[derive(Serialize)]
pub struct ElementDiagnostics {
    pub found: bool,
    pub tag_name: Option<String>,
    pub visible: Option<bool>,
    pub bounding_box: Option<Value>,
}

pub struct DebugElementArgs {
    pub selector: String,
    pub selector_type: String,
    pub iframe_selector: Option<String>,
}

pub async fn debug_element(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    args: DebugElementArgs,
) -> Value {
    let result: Result<ElementDiagnostics, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let state = ctx.state.lock().await;
            let driver = state
                .driver
                .as_ref()
                .ok_or_else(|| GatewayError::DriverNotInitialized("no driver".to_string()))?;
            let target_id = state
                .target_id
                .clone()
                .ok_or(GatewayError::Window(crate::errors::WindowError::AttachTimeout))?;
            let page = driver
                .page_for_target(&target_id)
                .await
                .map_err(GatewayError::Window)?;
            drop(state);

            let selector_type = SelectorType::parse(&args.selector_type)?;
            let found = find_element(
                &page,
                &args.selector,
                selector_type,
                args.iframe_selector.as_deref(),
                Duration::from_secs(5),
            )
            .await;

            match found {
                Ok(element) => {
                    let tag_name = element
                        .describe_node()
                        .await
                        .ok()
                        .map(|n| n.node_name.clone());
                    let bounding_box = element
                        .bounding_box()
                        .await
                        .ok()
                        .and_then(|b| serde_json::to_value(b).ok());
                    let visible = bounding_box
                        .as_ref()
                        .map(|_| true)
                        .or(Some(false));

                    Ok(ElementDiagnostics {
                        found: true,
                        tag_name,
                        visible,
                        bounding_box,
                    })
                }
                Err(_) => Ok(ElementDiagnostics {
                    found: false,
                    tag_name: None,
                    visible: None,
                    bounding_box: None,
                }),
            }
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

#[derive(Serialize)]
struct ContextState {
    driver_initialized: bool,
    window_ready: bool,
    agent_tag: String,
}

#[derive(Serialize)]
struct DiagnosticsReply {
    diagnostics: Diagnostics,
    context_state: ContextState,
}

pub async fn get_diagnostics(config: &GatewayConfig, profile_key: &str) -> Value {
    let result: Result<DiagnosticsReply, GatewayError> =
        exclusive_access::run_bare(config, profile_key, |ctx| async move {
            let state = ctx.state.lock().await;
            let debug_endpoint = state.driver.as_ref().map(|d| {
                let (host, port) = d.debug_endpoint();
                format!("{host}:{port}")
            });

            let diagnostics = Diagnostics {
                driver_initialized: state.driver.is_some(),
                window_ready: state.driver.is_some() && state.target_id.is_some(),
                debug_endpoint,
                registry_entry_count: Some(ctx.registry.len()),
                last_error_class: None,
            };

            let context_state = ContextState {
                driver_initialized: diagnostics.driver_initialized,
                window_ready: diagnostics.window_ready,
                agent_tag: ctx.ensure_agent_tag().to_string(),
            };

            Ok(DiagnosticsReply { diagnostics, context_state })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

//! `take_screenshot` (spec §6). Returns either a base64 PNG or a path the
//! image was written to, grounded in the teacher's base64-encoding and
//! viewport-dimension pattern.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chromiumoxide::page::ScreenshotParams;
use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, WindowError};
use crate::exclusive_access;
use crate::tools::envelope;

#[derive(Serialize)]
struct ScreenshotReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

pub async fn take_screenshot(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    return_base64: bool,
    path: Option<String>,
) -> Value {
    let result: Result<ScreenshotReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let state = ctx.state.lock().await;
            let driver = state
                .driver
                .as_ref()
                .ok_or_else(|| GatewayError::DriverNotInitialized("no driver".to_string()))?;
            let target_id = state
                .target_id
                .clone()
                .ok_or(GatewayError::Window(WindowError::AttachTimeout))?;
            let page = driver
                .page_for_target(&target_id)
                .await
                .map_err(GatewayError::Window)?;

            let image = page
                .screenshot(ScreenshotParams::builder().build())
                .await
                .map_err(|e| GatewayError::Internal(format!("screenshot failed: {e}")))?;

            if let Some(path) = path {
                std::fs::write(&path, &image).map_err(|e| GatewayError::Io(e.to_string()))?;
                Ok(ScreenshotReply {
                    image_base64: if return_base64 { Some(BASE64.encode(&image)) } else { None },
                    path: Some(path),
                })
            } else {
                Ok(ScreenshotReply {
                    image_base64: Some(BASE64.encode(&image)),
                    path: None,
                })
            }
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

//! Cookie operations (spec §6: "— / name / cookie spec" inputs, "cookies /
//! ok" outputs): list all, get by name, set, delete.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, WindowError};
use crate::exclusive_access;
use crate::tools::envelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Serialize)]
struct CookiesReply {
    cookies: Vec<CookieSpec>,
}

async fn page_for(
    ctx: &crate::session_context::SessionContext,
) -> Result<chromiumoxide::Page, GatewayError> {
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

pub async fn get_cookies(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    name: Option<String>,
) -> Value {
    let result: Result<CookiesReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = page_for(ctx).await?;
            let cookies = page
                .get_cookies()
                .await
                .map_err(|e| GatewayError::Internal(format!("get_cookies failed: {e}")))?;

            let cookies: Vec<CookieSpec> = cookies
                .into_iter()
                .filter(|c| name.as_deref().is_none_or(|n| n == c.name))
                .map(|c| CookieSpec {
                    name: c.name,
                    value: c.value,
                    domain: Some(c.domain),
                    path: Some(c.path),
                })
                .collect();

            Ok(CookiesReply { cookies })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

#[derive(Serialize)]
struct OkReply {
    ok: bool,
}

pub async fn set_cookie(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    cookie: CookieSpec,
) -> Value {
    let result: Result<OkReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = page_for(ctx).await?;
            let url = page.url().await.ok().flatten();

            let mut params = chromiumoxide::cdp::browser_protocol::network::CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value);
            if let Some(domain) = cookie.domain {
                params = params.domain(domain);
            }
            if let Some(path) = cookie.path {
                params = params.path(path);
            } else if let Some(url) = url {
                params = params.url(url);
            }

            let param = params
                .build()
                .map_err(|e| GatewayError::Config(format!("invalid cookie spec: {e}")))?;

            page.set_cookie(param)
                .await
                .map_err(|e| GatewayError::Internal(format!("set_cookie failed: {e}")))?;

            Ok(OkReply { ok: true })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

pub async fn delete_cookie(
    config: &GatewayConfig,
    profile_key: &str,
    user_data_dir: &std::path::Path,
    name: String,
) -> Value {
    let result: Result<OkReply, GatewayError> =
        exclusive_access::run(config, profile_key, user_data_dir, move |ctx| async move {
            let page = page_for(ctx).await?;
            let params = chromiumoxide::cdp::browser_protocol::network::DeleteCookiesParams::builder()
                .name(name)
                .build()
                .map_err(|e| GatewayError::Config(format!("invalid delete_cookie request: {e}")))?;
            page.execute(params)
                .await
                .map_err(|e| GatewayError::Internal(format!("delete_cookie failed: {e}")))?;
            Ok(OkReply { ok: true })
        })
        .await;

    envelope::diagnosed(profile_key, result).await
}

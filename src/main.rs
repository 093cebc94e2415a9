//! Stdio demonstration harness.
//!
//! Reads newline-delimited JSON commands from stdin, runs them through the
//! coordination core via `browser_gateway`'s tool handlers, and writes the
//! `{ok, ...}` envelope back to stdout as a single JSON line. This binary
//! is a thin wrapper around the library: no HTTP transport, no tool
//! registry, no session-token bookkeeping — just enough plumbing to drive
//! the gateway from a shell for manual testing.
//!
//! Example session (one command per line on stdin):
//! ```text
//! {"cmd":"start_session"}
//! {"cmd":"navigate","url":"https://example.com"}
//! {"cmd":"click","selector":"#submit"}
//! {"cmd":"close_window"}
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use browser_gateway::tools;
use browser_gateway::{profile_key, GatewayConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

#[derive(Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    StartSession,
    Navigate {
        url: String,
        #[serde(default = "default_wait_for")]
        wait_for: String,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
    },
    Click {
        selector: String,
        #[serde(default = "default_selector_type")]
        selector_type: String,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        #[serde(default)]
        iframe_selector: Option<String>,
    },
    Fill {
        selector: String,
        #[serde(default = "default_selector_type")]
        selector_type: String,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        #[serde(default)]
        iframe_selector: Option<String>,
        text: String,
        #[serde(default)]
        clear_first: bool,
    },
    WaitForElement {
        selector: String,
        #[serde(default = "default_selector_type")]
        selector_type: String,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        #[serde(default)]
        iframe_selector: Option<String>,
    },
    Screenshot {
        #[serde(default)]
        return_base64: bool,
        #[serde(default)]
        path: Option<String>,
    },
    SendKeys {
        key: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default = "default_selector_type")]
        selector_type: String,
    },
    Scroll {
        x: f64,
        y: f64,
    },
    GetCookies {
        #[serde(default)]
        name: Option<String>,
    },
    SetCookie {
        cookie: tools::CookieSpec,
    },
    DeleteCookie {
        name: String,
    },
    DebugElement {
        selector: String,
        #[serde(default = "default_selector_type")]
        selector_type: String,
        #[serde(default)]
        iframe_selector: Option<String>,
    },
    CloseWindow,
    Unlock,
    ForceCloseAll,
    GetDiagnostics,
}

fn default_wait_for() -> String {
    "load".to_string()
}

fn default_timeout_sec() -> u64 {
    10
}

fn default_selector_type() -> String {
    "css".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::from_env();
    let user_data_dir = config
        .resolve_browser_family()
        .0
        .cloned()
        .ok_or_else(|| anyhow!("KODEGEN_BROWSER_PRIMARY_USER_DATA_DIR (or a beta/canary dir) must be set"))?;
    let key = profile_key::profile_key(&user_data_dir, Some(&config.profile_name), config.strict_profile)
        .map_err(|e| anyhow!("invalid profile configuration: {e}"))?;

    info!(profile_key = %key, user_data_dir = %user_data_dir.display(), "gateway demo harness starting");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Command>(line) {
            Ok(command) => dispatch(&config, &key, &user_data_dir, command).await,
            Err(e) => {
                error!(error = %e, "malformed command line");
                serde_json::json!({"ok": false, "error": "config_error", "message": e.to_string()})
            }
        };

        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    Ok(())
}

async fn dispatch(config: &GatewayConfig, key: &str, user_data_dir: &PathBuf, command: Command) -> Value {
    match command {
        Command::StartSession => tools::start_session(config, key, user_data_dir).await,
        Command::Navigate { url, wait_for, timeout_sec } => {
            let wait_for = match tools::WaitUntil::parse(&wait_for) {
                Ok(w) => w,
                Err(e) => return serde_json::json!({"ok": false, "error": "config_error", "message": e.to_string()}),
            };
            tools::navigate(
                config,
                key,
                user_data_dir,
                tools::NavigateArgs { url, wait_for, timeout_sec },
            )
            .await
        }
        Command::Click { selector, selector_type, timeout_sec, iframe_selector } => {
            tools::click(
                config,
                key,
                user_data_dir,
                tools::SelectorArgs { selector, selector_type, timeout_sec, iframe_selector },
            )
            .await
        }
        Command::Fill { selector, selector_type, timeout_sec, iframe_selector, text, clear_first } => {
            tools::fill(
                config,
                key,
                user_data_dir,
                tools::FillArgs {
                    selector: tools::SelectorArgs { selector, selector_type, timeout_sec, iframe_selector },
                    text,
                    clear_first,
                },
            )
            .await
        }
        Command::WaitForElement { selector, selector_type, timeout_sec, iframe_selector } => {
            tools::wait_for_element(
                config,
                key,
                user_data_dir,
                tools::SelectorArgs { selector, selector_type, timeout_sec, iframe_selector },
            )
            .await
        }
        Command::Screenshot { return_base64, path } => {
            tools::take_screenshot(config, key, user_data_dir, return_base64, path).await
        }
        Command::SendKeys { key: pressed_key, selector, selector_type } => {
            tools::send_keys(
                config,
                key,
                user_data_dir,
                tools::SendKeysArgs { key: pressed_key, selector, selector_type },
            )
            .await
        }
        Command::Scroll { x, y } => tools::scroll(config, key, user_data_dir, x, y).await,
        Command::GetCookies { name } => tools::get_cookies(config, key, user_data_dir, name).await,
        Command::SetCookie { cookie } => tools::set_cookie(config, key, user_data_dir, cookie).await,
        Command::DeleteCookie { name } => tools::delete_cookie(config, key, user_data_dir, name).await,
        Command::DebugElement { selector, selector_type, iframe_selector } => {
            tools::debug_element(
                config,
                key,
                user_data_dir,
                tools::DebugElementArgs { selector, selector_type, iframe_selector },
            )
            .await
        }
        Command::CloseWindow => tools::close_window(config, key, user_data_dir).await,
        Command::Unlock => tools::unlock(config, key).await,
        Command::ForceCloseAll => tools::force_close_all(config, key).await,
        Command::GetDiagnostics => tools::get_diagnostics(config, key).await,
    }
}

//! Resolved configuration object consumed by the coordination core (spec §1,
//! §6). Mirrors the teacher's `Config`/`BrowserConfig`/`WindowConfig`
//! pattern in the crate root: serde defaults plus a hand-written `Default`,
//! loaded once at the boundary and threaded through as `&GatewayConfig` —
//! no component reads the environment itself.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "KODEGEN_BROWSER_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Required unless a family-specific dir (beta/canary) is configured.
    pub primary_user_data_dir: Option<PathBuf>,

    #[serde(default = "default_profile_name")]
    pub profile_name: String,

    pub browser_binary_path: Option<PathBuf>,
    pub beta_user_data_dir: Option<PathBuf>,
    pub beta_binary_path: Option<PathBuf>,
    pub canary_user_data_dir: Option<PathBuf>,
    pub canary_binary_path: Option<PathBuf>,

    pub fixed_debug_port: Option<u16>,

    #[serde(default)]
    pub attach_any_profile: bool,

    #[serde(default = "default_coord_dir")]
    pub coord_dir: PathBuf,

    #[serde(default = "default_action_lock_ttl")]
    pub action_lock_ttl: Duration,

    #[serde(default = "default_action_lock_wait")]
    pub action_lock_wait: Duration,

    #[serde(default = "default_file_mutex_stale")]
    pub file_mutex_stale: Duration,

    #[serde(default = "default_registry_stale")]
    pub registry_stale: Duration,

    #[serde(default = "default_rendezvous_ttl")]
    pub rendezvous_ttl: Duration,

    #[serde(default = "default_snapshot_max_chars")]
    pub snapshot_max_chars: usize,

    #[serde(default)]
    pub strict_profile: bool,

    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub disable_security: bool,

    #[serde(default = "default_startup_mutex_wait")]
    pub startup_mutex_wait: Duration,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout: Duration,

    #[serde(default = "default_default_debug_port")]
    pub default_debug_port: u16,
}

fn default_profile_name() -> String {
    "Default".to_string()
}

fn default_coord_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kodegen-browser-gateway")
}

fn default_action_lock_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_action_lock_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_file_mutex_stale() -> Duration {
    Duration::from_secs(60)
}

fn default_registry_stale() -> Duration {
    Duration::from_secs(300)
}

fn default_rendezvous_ttl() -> Duration {
    Duration::from_secs(86_400)
}

fn default_snapshot_max_chars() -> usize {
    20_000
}

fn default_headless() -> bool {
    true
}

fn default_startup_mutex_wait() -> Duration {
    Duration::from_secs(8)
}

fn default_launch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_default_debug_port() -> u16 {
    9222
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary_user_data_dir: None,
            profile_name: default_profile_name(),
            browser_binary_path: None,
            beta_user_data_dir: None,
            beta_binary_path: None,
            canary_user_data_dir: None,
            canary_binary_path: None,
            fixed_debug_port: None,
            attach_any_profile: false,
            coord_dir: default_coord_dir(),
            action_lock_ttl: default_action_lock_ttl(),
            action_lock_wait: default_action_lock_wait(),
            file_mutex_stale: default_file_mutex_stale(),
            registry_stale: default_registry_stale(),
            rendezvous_ttl: default_rendezvous_ttl(),
            snapshot_max_chars: default_snapshot_max_chars(),
            strict_profile: false,
            headless: default_headless(),
            disable_security: false,
            startup_mutex_wait: default_startup_mutex_wait(),
            launch_timeout: default_launch_timeout(),
            default_debug_port: default_default_debug_port(),
        }
    }
}

impl GatewayConfig {
    /// Resolve `(user_data_dir, binary_path)` honoring the documented
    /// preference order: beta > canary > stable (spec §6).
    pub fn resolve_browser_family(&self) -> (Option<&PathBuf>, Option<&PathBuf>) {
        if self.beta_user_data_dir.is_some() || self.beta_binary_path.is_some() {
            (self.beta_user_data_dir.as_ref(), self.beta_binary_path.as_ref())
        } else if self.canary_user_data_dir.is_some() || self.canary_binary_path.is_some() {
            (
                self.canary_user_data_dir.as_ref(),
                self.canary_binary_path.as_ref(),
            )
        } else {
            (self.primary_user_data_dir.as_ref(), self.browser_binary_path.as_ref())
        }
    }

    /// Read `KODEGEN_BROWSER_*`-prefixed environment variables over top of
    /// [`GatewayConfig::default`]. This is the only ambient env reader in
    /// the crate; everything else takes `&GatewayConfig` (spec §1, §6).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_path("PRIMARY_USER_DATA_DIR") {
            config.primary_user_data_dir = Some(v);
        }
        if let Some(v) = env_string("PROFILE_NAME") {
            config.profile_name = v;
        }
        if let Some(v) = env_path("BROWSER_BINARY_PATH") {
            config.browser_binary_path = Some(v);
        }
        if let Some(v) = env_path("BETA_USER_DATA_DIR") {
            config.beta_user_data_dir = Some(v);
        }
        if let Some(v) = env_path("BETA_BINARY_PATH") {
            config.beta_binary_path = Some(v);
        }
        if let Some(v) = env_path("CANARY_USER_DATA_DIR") {
            config.canary_user_data_dir = Some(v);
        }
        if let Some(v) = env_path("CANARY_BINARY_PATH") {
            config.canary_binary_path = Some(v);
        }
        if let Some(v) = env_u16("FIXED_DEBUG_PORT") {
            config.fixed_debug_port = Some(v);
        }
        if let Some(v) = env_bool("ATTACH_ANY_PROFILE") {
            config.attach_any_profile = v;
        }
        if let Some(v) = env_path("COORD_DIR") {
            config.coord_dir = v;
        }
        if let Some(v) = env_secs("ACTION_LOCK_TTL") {
            config.action_lock_ttl = v;
        }
        if let Some(v) = env_secs("ACTION_LOCK_WAIT") {
            config.action_lock_wait = v;
        }
        if let Some(v) = env_secs("FILE_MUTEX_STALE") {
            config.file_mutex_stale = v;
        }
        if let Some(v) = env_secs("REGISTRY_STALE") {
            config.registry_stale = v;
        }
        if let Some(v) = env_secs("RENDEZVOUS_TTL") {
            config.rendezvous_ttl = v;
        }
        if let Some(v) = env_string("SNAPSHOT_MAX_CHARS").and_then(|s| s.parse().ok()) {
            config.snapshot_max_chars = v;
        }
        if let Some(v) = env_bool("STRICT_PROFILE") {
            config.strict_profile = v;
        }
        if let Some(v) = env_bool("HEADLESS") {
            config.headless = v;
        }
        if let Some(v) = env_bool("DISABLE_SECURITY") {
            config.disable_security = v;
        }

        config
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn env_string(suffix: &str) -> Option<String> {
    env_var(suffix).filter(|s| !s.is_empty())
}

fn env_path(suffix: &str) -> Option<PathBuf> {
    env_string(suffix).map(PathBuf::from)
}

fn env_u16(suffix: &str) -> Option<u16> {
    env_string(suffix).and_then(|s| s.parse().ok())
}

fn env_secs(suffix: &str) -> Option<Duration> {
    env_string(suffix).and_then(|s| s.parse().ok()).map(Duration::from_secs)
}

fn env_bool(suffix: &str) -> Option<bool> {
    env_string(suffix).and_then(|s| match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec_table() {
        let config = GatewayConfig::default();
        assert_eq!(config.profile_name, "Default");
        assert_eq!(config.action_lock_ttl, Duration::from_secs(30));
        assert_eq!(config.action_lock_wait, Duration::from_secs(60));
        assert_eq!(config.file_mutex_stale, Duration::from_secs(60));
        assert_eq!(config.registry_stale, Duration::from_secs(300));
        assert_eq!(config.rendezvous_ttl, Duration::from_secs(86_400));
        assert!(!config.strict_profile);
    }

    #[test]
    #[serial]
    fn from_env_overrides_defaults() {
        unsafe {
            std::env::set_var("KODEGEN_BROWSER_PROFILE_NAME", "Work");
            std::env::set_var("KODEGEN_BROWSER_ACTION_LOCK_TTL", "45");
            std::env::set_var("KODEGEN_BROWSER_STRICT_PROFILE", "true");
        }

        let config = GatewayConfig::from_env();
        assert_eq!(config.profile_name, "Work");
        assert_eq!(config.action_lock_ttl, Duration::from_secs(45));
        assert!(config.strict_profile);

        unsafe {
            std::env::remove_var("KODEGEN_BROWSER_PROFILE_NAME");
            std::env::remove_var("KODEGEN_BROWSER_ACTION_LOCK_TTL");
            std::env::remove_var("KODEGEN_BROWSER_STRICT_PROFILE");
        }
    }

    #[test]
    fn family_preference_order_is_beta_then_canary_then_stable() {
        let mut config = GatewayConfig::default();
        config.primary_user_data_dir = Some(PathBuf::from("/stable"));
        config.canary_user_data_dir = Some(PathBuf::from("/canary"));
        config.beta_user_data_dir = Some(PathBuf::from("/beta"));

        let (dir, _bin) = config.resolve_browser_family();
        assert_eq!(dir, Some(&PathBuf::from("/beta")));

        config.beta_user_data_dir = None;
        let (dir, _bin) = config.resolve_browser_family();
        assert_eq!(dir, Some(&PathBuf::from("/canary")));

        config.canary_user_data_dir = None;
        let (dir, _bin) = config.resolve_browser_family();
        assert_eq!(dir, Some(&PathBuf::from("/stable")));
    }
}

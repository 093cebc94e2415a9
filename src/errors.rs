//! Error taxonomy for the coordination core.
//!
//! Each component owns a narrow `thiserror` enum; [`GatewayError`] is the
//! crate-wide union the Exclusive-Access Protocol converts into the
//! `error` string taxonomy of the tool-reply envelope (see
//! [`crate::tools::envelope`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileKeyError {
    #[error("user_data_dir must not be empty")]
    EmptyUserDataDir,

    #[error("profile directory does not exist: {0}")]
    MissingProfileDir(String),
}

#[derive(Error, Debug)]
pub enum FileMutexError {
    #[error("timed out waiting for mutex file {0} after {1:?}")]
    Timeout(String, std::time::Duration),

    #[error("io error on mutex file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ActionLockError {
    #[error("io error on softlock file: {0}")]
    Io(#[from] std::io::Error),

    #[error("softlock file contains invalid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("file mutex error while mutating softlock: {0}")]
    Mutex(#[from] FileMutexError),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("io error on window registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("window registry file contains invalid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("file mutex error while mutating registry: {0}")]
    Mutex(#[from] FileMutexError),
}

#[derive(Error, Debug)]
pub enum RendezvousError {
    #[error("io error on rendezvous file: {0}")]
    Io(#[from] std::io::Error),

    #[error("rendezvous file contains invalid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("could not acquire startup mutex within bound")]
    Contended,

    #[error("browser launched but debug port never opened within {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to find or download a browser executable: {0}")]
    BrowserNotFound(String),

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("failed to attach driver to debug endpoint {0}:{1}: {2}")]
    AttachFailed(String, u16, String),

    #[error(transparent)]
    FileMutex(#[from] FileMutexError),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("failed to create a new browser window: {0}")]
    CreateFailed(String),

    #[error("could not bind driver to newly created target within the polling budget")]
    AttachTimeout,

    #[error("driver could not confirm the new target after switching")]
    RevalidationFailed,

    #[error("driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Diagnostics snapshot attached to error replies whenever available (spec §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostics {
    pub driver_initialized: bool,
    pub window_ready: bool,
    pub debug_endpoint: Option<String>,
    pub registry_entry_count: Option<usize>,
    pub last_error_class: Option<String>,
}

impl Diagnostics {
    /// Snapshot the process-wide context for `profile_key` if one already
    /// exists (spec §7: "attached on error whenever available" — nothing is
    /// available before a context has ever been created for this process,
    /// e.g. a `config_error` that fired before `get_context` ran).
    pub async fn gather(error: &GatewayError, profile_key: &str) -> Option<Self> {
        let ctx = crate::session_context::peek_context().await?;
        if ctx.profile_key != profile_key {
            return None;
        }

        let state = ctx.state.lock().await;
        let debug_endpoint = state.driver.as_ref().map(|d| {
            let (host, port) = d.debug_endpoint();
            format!("{host}:{port}")
        });

        Some(Diagnostics {
            driver_initialized: state.driver.is_some(),
            window_ready: state.driver.is_some() && state.target_id.is_some(),
            debug_endpoint,
            registry_entry_count: Some(ctx.registry.len()),
            last_error_class: Some(error.error_code().to_string()),
        })
    }
}

/// Crate-wide error, carrying enough information for the Exclusive-Access
/// Protocol to pick the right `error` string and attach diagnostics.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock busy: held by {current_owner} until {expires_at}")]
    LockBusy {
        current_owner: String,
        expires_at: i64,
    },

    #[error("lock lost: renewal observed a different owner")]
    LockLost,

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("driver not initialized: {0}")]
    DriverNotInitialized(String),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element not interactable: {0}")]
    ElementNotInteractable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("coordination file io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The stable `error` string surfaced in the tool-reply envelope (spec §7).
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config_error",
            GatewayError::LockBusy { .. } => "lock_busy",
            GatewayError::LockLost => "lock_lost",
            GatewayError::Startup(StartupError::Contended) => "startup_contended",
            GatewayError::Startup(StartupError::Timeout(_)) => "startup_timeout",
            GatewayError::Startup(_) => "driver_not_initialized",
            GatewayError::DriverNotInitialized(_) => "driver_not_initialized",
            GatewayError::Window(_) => "window_lost",
            GatewayError::ElementNotFound(_) => "element_not_found",
            GatewayError::ElementNotInteractable(_) => "element_not_interactable",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Io(_) => "io_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl From<ActionLockError> for GatewayError {
    fn from(err: ActionLockError) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        GatewayError::Io(err.to_string())
    }
}

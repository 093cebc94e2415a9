//! Tool handlers for the shared-browser coordination gateway (spec §6).
//!
//! Each handler is a thin function: build/validate arguments, run the body
//! through the Exclusive-Access Protocol (`crate::exclusive_access`), and
//! return the `{ok, ...}` envelope (`crate::tools::envelope`). The teacher's
//! `Tool` trait (`kodegen_mcp_schema`) lives in an internal workspace crate
//! unavailable here, so the envelope is hand-rolled instead (see DESIGN.md).

pub mod cookies;
pub mod debug;
pub mod envelope;
pub mod interact;
pub mod navigate;
pub mod screenshot;
pub mod selector;
pub mod session;
pub mod snapshot;

pub use cookies::{delete_cookie, get_cookies, set_cookie, CookieSpec};
pub use debug::{debug_element, get_diagnostics, DebugElementArgs};
pub use interact::{click, fill, scroll, send_keys, wait_for_element, FillArgs, SelectorArgs, SendKeysArgs};
pub use navigate::{navigate, NavigateArgs, WaitUntil};
pub use screenshot::take_screenshot;
pub use session::{close_window, force_close_all, start_session, unlock};

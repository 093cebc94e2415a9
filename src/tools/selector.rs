//! Shared selector resolution for the interaction tool handlers:
//! `selector_type` in `{"css", "xpath", "id"}`, with optional
//! `iframe_selector` to scope the lookup inside a frame (spec §6 tool
//! table).

use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;

use crate::errors::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorType {
    Css,
    Xpath,
    Id,
}

impl SelectorType {
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "css" => Ok(Self::Css),
            "xpath" => Ok(Self::Xpath),
            "id" => Ok(Self::Id),
            other => Err(GatewayError::Config(format!("unknown selector_type: {other}"))),
        }
    }

    fn to_css_or_xpath(self, selector: &str) -> (bool, String) {
        match self {
            Self::Css => (false, selector.to_string()),
            Self::Xpath => (true, selector.to_string()),
            Self::Id => (false, format!("#{selector}")),
        }
    }
}

/// Resolve `selector`/`selector_type` (optionally scoped to an iframe) to a
/// single live element, polling until `timeout` elapses.
pub async fn find_element(
    page: &Page,
    selector: &str,
    selector_type: SelectorType,
    iframe_selector: Option<&str>,
    timeout: Duration,
) -> Result<Element, GatewayError> {
    let (is_xpath, resolved) = selector_type.to_css_or_xpath(selector);

    if let Some(iframe_selector) = iframe_selector {
        let frame_element = poll_find_on_page(page, iframe_selector, false, timeout)
            .await
            .map_err(|_| GatewayError::ElementNotFound(iframe_selector.to_string()))?;
        return poll_find_within(&frame_element, &resolved, is_xpath, timeout)
            .await
            .map_err(|_| GatewayError::ElementNotFound(selector.to_string()));
    }

    poll_find_on_page(page, &resolved, is_xpath, timeout)
        .await
        .map_err(|_| GatewayError::ElementNotFound(selector.to_string()))
}

async fn poll_find_on_page(page: &Page, selector: &str, is_xpath: bool, timeout: Duration) -> Result<Element, ()> {
    let start = std::time::Instant::now();
    loop {
        let found = if is_xpath {
            page.find_xpath(selector).await
        } else {
            page.find_element(selector).await
        };

        if let Ok(element) = found {
            return Ok(element);
        }

        if start.elapsed() >= timeout {
            return Err(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Descendant lookup scoped to an already-resolved element (used for the
/// `iframe_selector`-scoped case). `xpath` lookups are not supported
/// within a scoped element; such a combination falls through to "not
/// found" rather than silently searching the whole document.
async fn poll_find_within(scope: &Element, selector: &str, is_xpath: bool, timeout: Duration) -> Result<Element, ()> {
    if is_xpath {
        return Err(());
    }

    let start = std::time::Instant::now();
    loop {
        if let Ok(element) = scope.find_element(selector).await {
            return Ok(element);
        }
        if start.elapsed() >= timeout {
            return Err(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

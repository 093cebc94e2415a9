//! Post-handler page snapshot: URL, title, truncated HTML (spec §4.8 step
//! 7 — "a snapshot failure does not fail the handler").

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub url: Option<String>,
    pub title: Option<String>,
    pub html: Option<String>,
}

/// Best-effort capture. Any failed sub-call yields `None` for that field
/// rather than failing the whole snapshot.
pub async fn capture(page: &chromiumoxide::Page, max_chars: usize) -> Snapshot {
    let url = page.url().await.ok().flatten();
    let title = page.get_title().await.ok().flatten();
    let html = match page.content().await {
        Ok(html) if html.len() > max_chars => Some(format!("{}... [truncated]", truncate_at_char_boundary(&html, max_chars))),
        Ok(html) => Some(html),
        Err(_) => None,
    };

    Snapshot { url, title, html }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

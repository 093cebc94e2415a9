//! Minimal CDP HTTP helpers used by the Startup Arbiter to discover and
//! validate a debug endpoint without depending on a general HTTP client.
//!
//! Grounded in the teacher's own low-dependency bias for throwaway HTTP
//! calls; since `reqwest` was dropped (see DESIGN.md), this issues a raw
//! HTTP/1.1 GET over a plain `TcpStream` against `/json/version`, which is
//! all chromiumoxide itself needs to resolve a `webSocketDebuggerUrl`.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub use crate::rendezvous::probe_port;

#[derive(Debug, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser")]
    pub browser: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("timed out")]
    Timeout,

    #[error("malformed HTTP response from debug endpoint")]
    MalformedResponse,

    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// GET `http://{host}:{port}/json/version` and parse out the websocket
/// debugger URL. Used both when discovering a freshly launched browser's
/// endpoint and when validating a candidate port during permissive attach
/// (spec §4.6 step 5).
pub async fn fetch_version_info(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<VersionInfo, ProbeError> {
    tokio::time::timeout(timeout, fetch_version_info_inner(host, port))
        .await
        .map_err(|_| ProbeError::Timeout)?
}

async fn fetch_version_info_inner(host: &str, port: u16) -> Result<VersionInfo, ProbeError> {
    let mut stream = TcpStream::connect((host, port)).await?;
    let request = format!(
        "GET /json/version HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: close\r\nAccept: application/json\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let text = String::from_utf8_lossy(&raw);

    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .ok_or(ProbeError::MalformedResponse)?;

    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn parses_version_endpoint_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let body = r#"{"Browser":"HeadlessChrome/120.0","webSocketDebuggerUrl":"ws://127.0.0.1:1234/devtools/browser/abc"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        let info = fetch_version_info("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(info.web_socket_debugger_url, "ws://127.0.0.1:1234/devtools/browser/abc");
        assert_eq!(info.browser.as_deref(), Some("HeadlessChrome/120.0"));
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        let err = fetch_version_info("127.0.0.1", 1, Duration::from_millis(200)).await;
        assert!(err.is_err());
    }
}

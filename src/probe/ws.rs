//! WebSocket probe implementation using a raw HTTP/1.1 Upgrade handshake.
//!
//! The probe only needs the status line of the server's handshake
//! response, so the request is crafted by hand over a plain TCP stream
//! rather than pulling in a full WebSocket client.

use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{CheckOutcome, EndpointSpec};

// RFC 6455 sample nonce. The probe never completes the session, so a
// fixed key is sufficient; only the response status line is inspected.
const WS_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Run a WebSocket handshake check. Address is `host:port` with an
/// optional path, e.g. `chat.example.com:443/socket`.
///
/// Connect and the upgrade exchange share one deadline: the whole
/// check is bounded by `spec.timeout`.
pub async fn run_ws_check(spec: &EndpointSpec) -> Result<CheckOutcome, String> {
    let (host, path) = split_address(&spec.address);
    let request = build_upgrade_request(host, path);

    let start = Instant::now();
    let handshake = async {
        let mut stream = TcpStream::connect(host).await.map_err(|e| e.to_string())?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| e.to_string())?;

        // Enough for the status line plus a handful of headers
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await.map_err(|e| e.to_string())?;
        parse_status_line(&buf[..n])
    };

    let code = tokio::time::timeout(spec.timeout(), handshake)
        .await
        .map_err(|_| format!("timed out after {}ms", spec.timeout_ms))??;

    Ok(CheckOutcome {
        code: Some(code),
        latency_ms: start.elapsed().as_millis() as u64,
    })
}

fn split_address(address: &str) -> (&str, &str) {
    match address.find('/') {
        Some(idx) => (&address[..idx], &address[idx..]),
        None => (address, "/"),
    }
}

fn build_upgrade_request(host: &str, path: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {WS_KEY}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// Extract the status code from an HTTP/1.x response head.
fn parse_status_line(response: &[u8]) -> Result<u16, String> {
    let text = std::str::from_utf8(response).map_err(|_| "non-UTF-8 response".to_string())?;
    let line = text.lines().next().ok_or("empty response")?;

    let mut parts = line.split_whitespace();
    let version = parts.next().ok_or("malformed status line")?;
    if !version.starts_with("HTTP/1.") {
        return Err(format!("not an HTTP response: {:?}", line));
    }
    parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| format!("malformed status line: {:?}", line))
}

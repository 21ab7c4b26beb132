//! TCP probe implementation: a successful connect is the health signal.

use std::time::Instant;
use tokio::net::TcpStream;

use super::{CheckOutcome, EndpointSpec};

/// Run a TCP connect check. No status code exists at this layer, so the
/// outcome carries latency only.
pub async fn run_tcp_check(spec: &EndpointSpec) -> Result<CheckOutcome, String> {
    let start = Instant::now();

    let connect = TcpStream::connect(spec.address.as_str());
    let stream = tokio::time::timeout(spec.timeout(), connect)
        .await
        .map_err(|_| format!("timed out after {}ms", spec.timeout_ms))?
        .map_err(|e| e.to_string())?;

    // Dropping the stream closes the handshake connection.
    drop(stream);

    Ok(CheckOutcome {
        code: None,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CheckType;
    use tokio::net::TcpListener;

    fn spec(address: &str) -> EndpointSpec {
        EndpointSpec {
            name: "db".to_string(),
            address: address.to_string(),
            check: CheckType::Tcp,
            method: None,
            timeout_ms: 500,
            expected_codes: Vec::new(),
            max_response_time_ms: None,
        }
    }

    #[tokio::test]
    async fn test_tcp_check_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = run_tcp_check(&spec(&addr.to_string())).await.unwrap();
        assert!(outcome.code.is_none());
    }

    #[tokio::test]
    async fn test_tcp_check_unresolvable_host() {
        let result = run_tcp_check(&spec("definitely-not-a-real-host.invalid:80")).await;
        assert!(result.is_err());
    }
}

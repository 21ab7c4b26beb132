//! HTTP probe implementation.

use std::time::Instant;

use super::{CheckOutcome, EndpointSpec};

/// Run an HTTP check against the spec's address.
///
/// Returns the response status and latency, or a short error string for
/// timeout/network failures.
pub async fn run_http_check(spec: &EndpointSpec) -> Result<CheckOutcome, String> {
    let url = if spec.address.starts_with("http://") || spec.address.starts_with("https://") {
        spec.address.clone()
    } else {
        format!("https://{}", spec.address)
    };

    let client = reqwest::Client::builder()
        .timeout(spec.timeout())
        .build()
        .map_err(|e| e.to_string())?;

    let method = spec
        .method
        .as_deref()
        .unwrap_or("GET")
        .parse::<reqwest::Method>()
        .map_err(|_| format!("bad method {:?}", spec.method))?;

    let start = Instant::now();
    let response = client.request(method, &url).send().await.map_err(|e| {
        if e.is_timeout() {
            format!("timed out after {}ms", spec.timeout_ms)
        } else {
            e.to_string()
        }
    })?;

    Ok(CheckOutcome {
        code: Some(response.status().as_u16()),
        latency_ms: start.elapsed().as_millis() as u64,
    })
}

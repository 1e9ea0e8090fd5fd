//! HTTP client creation and JSON request handling for registry APIs.

use anyhow::{anyhow, Result};
use reqwest::{cookie::Jar, header};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::TARGET_WEB_REQUEST;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Create a client with either standard or browser emulation settings
pub fn create_http_client(browser_emulation: bool) -> Result<reqwest::Client> {
    let cookie_store = Jar::default();
    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .cookie_provider(Arc::new(cookie_store))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::default());

    // Registries behind anti-bot filters reject obvious library user agents
    if browser_emulation {
        debug!(target: TARGET_WEB_REQUEST, "Creating browser emulation HTTP client");
        builder = builder.user_agent(BROWSER_USER_AGENT);
    } else {
        debug!(target: TARGET_WEB_REQUEST, "Creating standard HTTP client");
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
}

/// POSTs `payload` as JSON and returns the decoded JSON body.
///
/// Non-success statuses and timeouts are errors.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    extra_headers: &[(&'static str, &'static str)],
    payload: &Value,
) -> Result<Value> {
    debug!(target: TARGET_WEB_REQUEST, "POST {}", url);

    let mut request = client
        .post(url)
        .header(header::ACCEPT, "application/json, text/plain, */*")
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .json(payload);
    for (name, value) in extra_headers {
        request = request.header(*name, *value);
    }

    let response = match timeout(REQUEST_TIMEOUT, request.send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(err)) => return Err(anyhow!("Request failed: {}", err)),
        Err(_) => {
            return Err(anyhow!(
                "Request timed out after {} seconds",
                REQUEST_TIMEOUT.as_secs()
            ))
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("HTTP error: {}", status));
    }

    debug!(target: TARGET_WEB_REQUEST, "Request to {} succeeded with status {}", url, status);

    match timeout(REQUEST_TIMEOUT, response.json::<Value>()).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(err)) => Err(anyhow!("Failed to decode JSON response: {}", err)),
        Err(_) => Err(anyhow!("Timed out reading response body")),
    }
}

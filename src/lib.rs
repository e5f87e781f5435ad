#![deny(clippy::unwrap_used)]

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod pricing;
pub mod record;
pub mod vendor_code;
pub mod wb;

static DEFAULT_ACCEPT_ENCODING: &str = "br;q=1.0, gzip;q=0.6, deflate;q=0.4, *;q=0.2";

/// Builds the shared HTTP client: fixed per-call timeout, transient failures
/// retried with exponential backoff.
pub fn build_client(http: &config::HttpConfig) -> Result<ClientWithMiddleware, anyhow::Error> {
    let mut map = HeaderMap::new();
    map.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
    );
    let client = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(http.timeout_secs))
        .timeout(Duration::from_secs(http.timeout_secs))
        .use_rustls_tls()
        .default_headers(map)
        .build()
        .context("Unable to build HTTP client")?;
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(http.max_retries);
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

pub fn format_duration(duration: &std::time::Duration) -> String {
    let mut res = vec![];
    let hours = duration.as_millis() / 1000 / 60 / 60;
    let minutes = duration.as_millis() / 1000 / 60 % 60;
    let seconds = duration.as_millis() / 1000 % 60;
    let whole_millis = duration.as_millis();
    if hours > 0 {
        res.push(format!("{hours}h"));
    }
    if minutes > 0 {
        res.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        res.push(format!("{seconds}s"));
    }
    if whole_millis < 1000 {
        res.push(format!("{whole_millis}ms"));
    }
    itertools::intersperse(res, " ".to_string()).collect()
}

use crate::config::FetchConfig;
use crate::error::ScrapeError;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "aste_watch/0.1 (+https://example.invalid)";

pub trait Fetcher {
    fn settle(&self, url: &str) -> Result<String, ScrapeError>;
}

pub fn build_client(fetch: &FetchConfig, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (k, v) in &fetch.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .with_context(|| format!("invalid header name {k}"))?;
        let value =
            HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
        headers.insert(name, value);
    }

    let user_agent = fetch.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

    Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(fetch.max_redirects))
        .default_headers(headers)
        .build()
        .context("failed to build reqwest client")
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn from_config(fetch: &FetchConfig) -> Result<Self> {
        let client = build_client(fetch, Duration::from_secs(fetch.timeout_secs))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn settle(&self, url: &str) -> Result<String, ScrapeError> {
        let failed = |detail: String| ScrapeError::FetchFailed {
            url: url.to_string(),
            detail,
        };

        let response = self.client.get(url).send().map_err(|err| failed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("status {status}")));
        }

        let settled = response.url().to_string();
        debug!(%url, %settled, %status, "link fetched");
        Ok(settled)
    }
}

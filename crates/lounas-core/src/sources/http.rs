use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::warn;

use crate::{Error, Result};

/// Shared HTTP client for upstream menu sites.
///
/// Every request has a bounded timeout and is retried once on a transient
/// failure (connect error, timeout, 502/503/504).
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            retry_delay: Duration::from_millis(500),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// `Mozilla/5.0 (compatible; Lounasbotti/<ver>; +<git url>)`
    pub fn user_agent(git_url: Option<&str>) -> String {
        let version = env!("CARGO_PKG_VERSION");
        match git_url {
            Some(url) => format!("Mozilla/5.0 (compatible; Lounasbotti/{version}; +{url})"),
            None => format!("Mozilla/5.0 (compatible; Lounasbotti/{version})"),
        }
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self.send(url, query).await?;
        resp.text()
            .await
            .map_err(|e| Error::SourceFetch(format!("reading body from {url}: {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::SourceParse(format!("invalid json from {url}: {e}")))
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let result = self.client.get(url).query(query).send().await;
            let retryable = match &result {
                Ok(resp) => matches!(resp.status().as_u16(), 502..=504),
                Err(e) => e.is_timeout() || e.is_connect(),
            };
            if retryable && attempts < MAX_RETRIES {
                attempts += 1;
                warn!("Transient failure fetching {url}, retrying once");
                sleep(self.retry_delay).await;
                continue;
            }

            let resp = result.map_err(|e| Error::SourceFetch(format!("GET {url}: {e}")))?;
            if !resp.status().is_success() {
                return Err(Error::SourceFetch(format!(
                    "Response {} from {url}",
                    resp.status()
                )));
            }
            return Ok(resp);
        }
    }
}

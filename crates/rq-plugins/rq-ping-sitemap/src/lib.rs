//! # rq-ping-sitemap
//!
//! `reqwest` implementation of `SearchPinger`: tells a search engine that the
//! sitemap changed after every save.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rq_core::traits::SearchPinger;

pub const GOOGLE_PING_ENDPOINT: &str = "https://www.google.com/webmasters/tools/ping";

pub struct SitemapPinger {
    client: reqwest::Client,
    endpoint: String,
    sitemap_url: String,
}

impl SitemapPinger {
    pub fn new(endpoint: &str, sitemap_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("could not build ping client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            sitemap_url: sitemap_url.to_string(),
        })
    }

    /// Full ping URL, exposed for logging.
    pub fn ping_url(&self) -> anyhow::Result<reqwest::Url> {
        reqwest::Url::parse_with_params(&self.endpoint, &[("sitemap", self.sitemap_url.as_str())])
            .with_context(|| format!("invalid ping endpoint {}", self.endpoint))
    }
}

#[async_trait]
impl SearchPinger for SitemapPinger {
    async fn ping(&self) -> anyhow::Result<()> {
        let url = self.ping_url()?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("ping to {url} answered {status}");
        }
        tracing::debug!(%url, "pinged search engine");
        Ok(())
    }
}

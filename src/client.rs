use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::sync::EventSource;
use crate::types::{ChannelId, Event, IngestAck};

/// HTTP client for the capture server's webhook API.
#[derive(Clone)]
pub struct HookClient {
    client: Client,
    base_url: Arc<str>,
}

impl HookClient {
    pub fn new(base_url: impl Into<Arc<str>>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        let base_url = normalize_base_url(base_url);
        Url::parse(&base_url).with_context(|| format!("invalid server url {base_url}"))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/webhook/{channel}` with the channel percent-encoded as one segment.
    pub fn channel_url(&self, channel: &ChannelId) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).context("parsing server url")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("server url {} cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(["api", "webhook", channel.as_str()]);
        Ok(url)
    }

    pub async fn send_expect(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
        ok: impl FnOnce(StatusCode) -> bool,
    ) -> Result<Response> {
        let resp = req.send().await.context(context)?;
        let status = resp.status();
        if ok(status) {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "{} status={} body_sample={}",
            context,
            status,
            truncate_body_snippet(&text, 500)
        );
    }

    pub async fn send_ok(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<Response> {
        self.send_expect(req, context, |s| s.is_success()).await
    }

    async fn json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<T> {
        let resp = self.send_ok(req, context).await?;
        resp.json().await.context(context)
    }

    /// Every event the server currently holds for `channel`.
    pub async fn list_events(&self, channel: &ChannelId) -> Result<Vec<Event>> {
        let url = self.channel_url(channel)?;
        self.json(self.client.request(Method::GET, url), "listing channel events")
            .await
    }

    /// Fire a JSON payload at the channel, as an external webhook sender would.
    pub async fn send_json(&self, channel: &ChannelId, body: &Value) -> Result<IngestAck> {
        let url = self.channel_url(channel)?;
        self.json(self.client.request(Method::POST, url).json(body), "sending webhook")
            .await
    }
}

#[async_trait]
impl EventSource for HookClient {
    async fn fetch_events(&self, channel: &ChannelId) -> Result<Vec<Event>> {
        self.list_events(channel).await
    }
}

pub fn normalize_base_url(base_url: impl Into<Arc<str>>) -> Arc<str> {
    let base_url: Arc<str> = base_url.into();
    if base_url.ends_with('/') {
        Arc::<str>::from(base_url.trim_end_matches('/').to_string())
    } else {
        base_url
    }
}

fn truncate_body_snippet(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::Client as ReqwestClient;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::auto_block::AutoBlock;
use crate::domain::errors::FetchError;
use crate::domain::models::{Config, HttpClientConfig, Payload, RemoteBody};
use crate::domain::ports::{FetchRequest, OriginClient, OriginResponse, STATUS_OK};

/// `IMF-fixdate`, the preferred HTTP-date format.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// reqwest-backed [`OriginClient`].
///
/// 200 bodies are handed out as one-shot streams straight off the
/// connection. Other bodies are discarded.
pub struct HttpOriginClient {
    http_client: ReqwestClient,
    auto_block: Arc<AutoBlock>,
}

impl HttpOriginClient {
    pub fn new(config: &HttpClientConfig, auto_block: Arc<AutoBlock>) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            auto_block,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let auto_block = AutoBlock::new(config.proxy.remote_url.clone(), config.auto_block.clone());
        Self::new(&config.http, Arc::new(auto_block))
    }

    pub fn auto_block(&self) -> &Arc<AutoBlock> {
        &self.auto_block
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, FetchError> {
        self.auto_block.check(Utc::now())?;

        let mut builder = self.http_client.get(request.url.clone());
        if let Some(since) = request.if_modified_since {
            builder = builder.header(header::IF_MODIFIED_SINCE, format_http_date(since));
        }
        if let Some(etag) = &request.if_none_match {
            builder = builder.header(header::IF_NONE_MATCH, quote_etag(etag));
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                self.auto_block.record_failure(Utc::now());
                return Err(FetchError::Transient {
                    url: request.url.to_string(),
                    message: err.to_string(),
                });
            }
        };
        self.auto_block.record_success();

        let status = response.status().as_u16();
        let headers = response.headers();
        let mut origin_response = OriginResponse::with_status(status);
        origin_response.last_modified = parse_last_modified(headers, &request);
        origin_response.etag = header_str(headers, header::ETAG).map(unquote_etag);
        origin_response.content_type = header_str(headers, header::CONTENT_TYPE).map(str::to_string);

        debug!(url = %request.url, status, "origin responded");

        if status == STATUS_OK {
            let content_length = response.content_length();
            let stream = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
            origin_response.body = Some(Payload::Streaming(RemoteBody::new(
                stream.boxed(),
                content_length,
            )));
        }

        Ok(origin_response)
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_last_modified(headers: &HeaderMap, request: &FetchRequest) -> Option<DateTime<Utc>> {
    let value = header_str(headers, header::LAST_MODIFIED)?;
    match DateTime::parse_from_rfc2822(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            warn!(url = %request.url, value, error = %err, "ignoring unparseable Last-Modified");
            None
        }
    }
}

pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Strip the surrounding quotes of a strong entity tag. Weak tags are kept
/// verbatim.
pub fn unquote_etag(raw: &str) -> String {
    raw.strip_prefix('"')
        .and_then(|tag| tag.strip_suffix('"'))
        .unwrap_or(raw)
        .to_string()
}

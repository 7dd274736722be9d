//! Common test utilities for integration tests
//!
//! Provides a scripted origin, config fixtures and cache seeding helpers
//! shared by the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirror_proxy::adapters::MemoryContentStore;
use mirror_proxy::domain::models::{ContentAttributes, Payload, RemoteBody};
use mirror_proxy::domain::ports::{FetchRequest, OriginResponse};
use mirror_proxy::{Config, Content, ContentStore, FetchError, OriginClient, ProxyFacet, Resource};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config pointing at a fake origin with the given cooperation timeouts.
pub fn proxy_config(passive_timeout_secs: u64, active_timeout_secs: u64) -> Config {
    let mut config = Config::default();
    config.proxy.remote_url = "https://origin.test/repo/".to_string();
    config.cooperation.passive_timeout_secs = passive_timeout_secs;
    config.cooperation.active_timeout_secs = active_timeout_secs;
    config
}

/// A 200 response whose body is a fresh one-shot stream.
pub fn ok_response(body: &'static str) -> OriginResponse {
    OriginResponse::ok(Payload::Streaming(RemoteBody::from_bytes(body)))
}

type Scripted = Result<OriginResponse, FetchError>;

/// Origin double: answers from a script, then with a default body.
///
/// Every call is counted and recorded before the optional delay.
pub struct ScriptedOrigin {
    script: Mutex<VecDeque<Scripted>>,
    fallback_body: &'static str,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedOrigin {
    pub fn new() -> Self {
        Self {
            script: Mutex::default(),
            fallback_body: "artifact",
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_body(mut self, body: &'static str) -> Self {
        self.fallback_body = body;
        self
    }

    pub fn then(self, response: Scripted) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginClient for ScriptedOrigin {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ok_response(self.fallback_body)))
    }
}

/// Facet over a memory store and the given origin.
pub fn facet(
    config: &Config,
    origin: &Arc<ScriptedOrigin>,
) -> (ProxyFacet, Arc<MemoryContentStore>) {
    let store = Arc::new(MemoryContentStore::new(16 * 1024 * 1024));
    let facet = ProxyFacet::new(config, store.clone(), origin.clone()).unwrap();
    (facet, store)
}

/// Store `body` for `resource`, stamped as verified 30 days ago.
pub async fn seed_stale(
    facet: &ProxyFacet,
    store: &MemoryContentStore,
    resource: &Resource,
    body: &'static str,
    etag: &str,
    last_modified: DateTime<Utc>,
) -> Content {
    let verified_at = Utc::now() - TimeDelta::days(30);
    let cache_info = facet
        .controllers()
        .for_category(resource.category())
        .current(verified_at);
    let content = Content::buffered(body).with_attributes(ContentAttributes {
        last_modified: Some(last_modified),
        etag: Some(etag.to_string()),
        content_type: Some("application/java-archive".to_string()),
        cache_info: Some(cache_info),
    });
    store.store(resource, content).await.unwrap()
}

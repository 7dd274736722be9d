//! Time-based freshness policy for proxied content.
//!
//! A [`CacheController`] owns the max-age for one category of content and a
//! cache token. Content is stamped with a [`CacheInfo`] when it is fetched or
//! re-verified; the stamp is compared against the controller on every read.
//! Rotating the token (invalidation) makes every earlier stamp stale.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{CacheCategory, CacheInfo, Content, ProxyConfig};

/// Freshness policy for one category of content.
#[derive(Debug)]
pub struct CacheController {
    max_age_secs: AtomicI64,
    cache_token: RwLock<String>,
}

impl CacheController {
    pub fn new(max_age_secs: i64) -> Self {
        Self {
            max_age_secs: AtomicI64::new(max_age_secs),
            cache_token: RwLock::new(new_token()),
        }
    }

    pub fn max_age_secs(&self) -> i64 {
        self.max_age_secs.load(Ordering::Acquire)
    }

    pub fn cache_token(&self) -> String {
        self.cache_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stamp for content fetched or verified at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> CacheInfo {
        CacheInfo {
            last_verified: now,
            max_age_secs: self.max_age_secs(),
            cache_token: Some(self.cache_token()),
        }
    }

    /// Staleness verdict for a stamp.
    ///
    /// Missing stamps, stamps from an earlier token, and any stamp under a
    /// non-positive max-age are stale. Otherwise content is stale once its
    /// age reaches the max-age.
    pub fn is_stale(&self, cache_info: Option<&CacheInfo>, now: DateTime<Utc>) -> bool {
        let Some(info) = cache_info else {
            return true;
        };

        if let Some(token) = &info.cache_token {
            if *token != self.cache_token() {
                return true;
            }
        }

        let max_age = self.max_age_secs();
        if max_age <= 0 {
            return true;
        }

        match TimeDelta::try_seconds(max_age).and_then(|age| info.last_verified.checked_add_signed(age)) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Staleness verdict for an optional cached copy.
    pub fn is_content_stale(&self, content: Option<&Content>, now: DateTime<Utc>) -> bool {
        content.map_or(true, |c| self.is_stale(c.cache_info(), now))
    }

    /// Make every stamp issued so far stale.
    pub fn invalidate(&self) {
        let mut token = self
            .cache_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *token = new_token();
    }

    /// Apply a new max-age to subsequent checks.
    pub fn reconfigure(&self, max_age_secs: i64) {
        self.max_age_secs.store(max_age_secs, Ordering::Release);
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Cache controllers for content and metadata.
#[derive(Debug)]
pub struct CacheControllerHolder {
    content: CacheController,
    metadata: CacheController,
}

impl CacheControllerHolder {
    pub fn new(content: CacheController, metadata: CacheController) -> Self {
        Self { content, metadata }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            CacheController::new(config.content_max_age_secs()),
            CacheController::new(config.metadata_max_age_secs()),
        )
    }

    pub fn content(&self) -> &CacheController {
        &self.content
    }

    pub fn metadata(&self) -> &CacheController {
        &self.metadata
    }

    pub fn for_category(&self, category: CacheCategory) -> &CacheController {
        match category {
            CacheCategory::Content => &self.content,
            CacheCategory::Metadata => &self.metadata,
        }
    }

    pub fn reconfigure(&self, config: &ProxyConfig) {
        self.content.reconfigure(config.content_max_age_secs());
        self.metadata.reconfigure(config.metadata_max_age_secs());
        debug!(
            content_max_age_secs = config.content_max_age_secs(),
            metadata_max_age_secs = config.metadata_max_age_secs(),
            "cache controllers reconfigured"
        );
    }

    pub fn invalidate_caches(&self) {
        self.content.invalidate();
        self.metadata.invalidate();
    }
}

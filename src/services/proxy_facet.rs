//! Proxy cache facet.
//!
//! Serves a resource from the local store while it is fresh. Stale or missing
//! content is revalidated or fetched from the origin under cooperation, so
//! concurrent requests for one resource share a single origin fetch. Origin
//! failures degrade to the stale copy whenever one exists.

use chrono::Utc;
use reqwest::Url;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::domain::errors::{ProxyError, ProxyResult, StoreError};
use crate::domain::models::{Config, Content, ContentAttributes, Resource};
use crate::domain::ports::{ContentStore, FetchRequest, OriginClient, OriginResponse};
use crate::services::cooperation::Cooperation;
use crate::services::freshness::CacheControllerHolder;

/// Parse a remote URL, forcing a trailing slash so relative paths resolve
/// beneath it.
pub fn normalize_remote_url(remote_url: &str) -> ProxyResult<Url> {
    let normalized = if remote_url.ends_with('/') {
        remote_url.to_string()
    } else {
        format!("{remote_url}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|e| ProxyError::Configuration(format!("invalid remote url {remote_url}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ProxyError::Configuration(format!(
            "remote url {remote_url} cannot be used as a base"
        )));
    }
    Ok(url)
}

struct FacetState {
    remote_url: Url,
    cooperation: Cooperation<Option<Content>>,
}

struct Inner {
    store: Arc<dyn ContentStore>,
    origin: Arc<dyn OriginClient>,
    controllers: CacheControllerHolder,
    state: RwLock<FacetState>,
}

/// Entry point for proxied reads. Cheap to clone.
#[derive(Clone)]
pub struct ProxyFacet {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProxyFacet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFacet")
            .field("remote_url", &self.remote_url().as_str())
            .field("cooperation", &self.cooperation())
            .finish_non_exhaustive()
    }
}

impl ProxyFacet {
    pub fn new(
        config: &Config,
        store: Arc<dyn ContentStore>,
        origin: Arc<dyn OriginClient>,
    ) -> ProxyResult<Self> {
        let state = FacetState {
            remote_url: normalize_remote_url(&config.proxy.remote_url)?,
            cooperation: Cooperation::from_config(&config.cooperation),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                origin,
                controllers: CacheControllerHolder::from_config(&config.proxy),
                state: RwLock::new(state),
            }),
        })
    }

    pub fn remote_url(&self) -> Url {
        self.read_state(|state| state.remote_url.clone())
    }

    pub fn cooperation(&self) -> Cooperation<Option<Content>> {
        self.read_state(|state| state.cooperation.clone())
    }

    pub fn controllers(&self) -> &CacheControllerHolder {
        &self.inner.controllers
    }

    /// Apply new configuration. A changed remote URL invalidates every
    /// cached copy.
    pub fn update(&self, config: &Config) -> ProxyResult<()> {
        let remote_url = normalize_remote_url(&config.proxy.remote_url)?;

        let previous = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            state.cooperation = state.cooperation.with_timeouts(
                config.cooperation.passive_timeout(),
                config.cooperation.active_timeout(),
            );
            std::mem::replace(&mut state.remote_url, remote_url.clone())
        };

        self.inner.controllers.reconfigure(&config.proxy);

        if previous != remote_url {
            info!(previous = %previous, remote_url = %remote_url, "remote url changed");
            self.invalidate_caches();
        }
        Ok(())
    }

    /// Mark every cached copy stale.
    pub fn invalidate_caches(&self) {
        info!(remote_url = %self.remote_url(), "invalidating proxy caches");
        self.inner.controllers.invalidate_caches();
    }

    /// Fetch a resource, from the local store when fresh, otherwise from the
    /// origin. `None` means the origin had no content and nothing is cached.
    pub async fn get(&self, resource: &Resource) -> ProxyResult<Option<Content>> {
        let cached = self.lookup(resource).await?;
        if !self.is_stale(resource, cached.as_ref()) {
            debug!(resource = %resource, "serving fresh cached content");
            return Ok(cached);
        }

        let cooperation = self.cooperation();
        if !cooperation.is_enabled() {
            return self.fetch_and_store(resource, cached, false).await;
        }

        let facet = self.clone();
        let requested = resource.clone();
        cooperation
            .cooperate(resource.cooperation_key(), move |check_cache| {
                let facet = facet.clone();
                let resource = requested.clone();
                let stale = cached.clone();
                async move {
                    if check_cache {
                        facet.recheck_and_fetch(&resource).await
                    } else {
                        facet.fetch_and_store(&resource, stale, true).await
                    }
                }
            })
            .await
    }

    fn read_state<R>(&self, f: impl FnOnce(&FacetState) -> R) -> R {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn is_stale(&self, resource: &Resource, content: Option<&Content>) -> bool {
        self.inner
            .controllers
            .for_category(resource.category())
            .is_content_stale(content, Utc::now())
    }

    async fn lookup(&self, resource: &Resource) -> ProxyResult<Option<Content>> {
        match self.inner.store.lookup(resource).await {
            Ok(content) => Ok(content),
            Err(err) if err.is_inconsistency() => {
                warn!(resource = %resource, error = %err, "cached asset has no blob, treating as not cached");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A takeover after a passive timeout: another request may have filled
    /// the cache in the meantime.
    async fn recheck_and_fetch(&self, resource: &Resource) -> ProxyResult<Option<Content>> {
        let latest = self.lookup(resource).await?;
        if !self.is_stale(resource, latest.as_ref()) {
            debug!(resource = %resource, "cache filled while waiting, skipping origin fetch");
            return Ok(latest);
        }
        self.fetch_and_store(resource, latest, true).await
    }

    fn resolve(&self, resource: &Resource) -> ProxyResult<Url> {
        let base = self.remote_url();
        let segments: Vec<&str> = resource.path().split('/').collect();
        if segments.iter().any(|segment| matches!(*segment, "." | "..")) {
            return Err(ProxyError::BadRequest(format!(
                "{resource} resolves outside of {base}"
            )));
        }

        // Segments are percent-encoded, so `?` and `#` stay part of the path.
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProxyError::Configuration(format!("remote url {base} cannot be used as a base"))
            })?
            .pop_if_empty()
            .extend(segments);
        if !resource.query().is_empty() {
            url.query_pairs_mut().extend_pairs(resource.query());
        }
        Ok(url)
    }

    async fn fetch_and_store(
        &self,
        resource: &Resource,
        mut stale: Option<Content>,
        cooperating: bool,
    ) -> ProxyResult<Option<Content>> {
        let request = FetchRequest::new(self.resolve(resource)?).revalidating(stale.as_ref());
        debug!(
            resource = %resource,
            url = %request.url,
            conditional = request.is_conditional(),
            "fetching from origin"
        );

        let response = match self.inner.origin.fetch(request.clone()).await {
            Ok(response) => response,
            Err(err) => return degrade(resource, stale, err.into()),
        };

        let fetched = self
            .handle_response(resource, &request, &response, stale.as_mut(), cooperating)
            .await;

        let outcome = match fetched {
            Ok(Some(content)) => Ok(Some(content)),
            Ok(None) => Ok(stale),
            Err(err) => degrade(resource, stale, err),
        };

        let returns_remote = match (&outcome, &response.body) {
            (Ok(Some(content)), Some(body)) => {
                content.shares_stream_with(&Content::new(body.clone()))
            }
            _ => false,
        };
        if !returns_remote && response.release() {
            debug!(resource = %resource, "released unused origin body");
        }

        outcome
    }

    /// `Ok(None)` means the origin produced no new content and the stale copy
    /// (possibly refreshed in place) is the answer.
    async fn handle_response(
        &self,
        resource: &Resource,
        request: &FetchRequest,
        response: &OriginResponse,
        stale: Option<&mut Content>,
        cooperating: bool,
    ) -> ProxyResult<Option<Content>> {
        let controller = self.inner.controllers.for_category(resource.category());

        if response.is_ok() {
            let body = response.body.clone().ok_or_else(|| {
                ProxyError::InvalidResponse(format!("{} returned 200 without a body", request.url))
            })?;
            let remote = Content::new(body).with_attributes(ContentAttributes {
                last_modified: response.last_modified,
                etag: response.etag.clone(),
                content_type: response.content_type.clone(),
                cache_info: Some(controller.current(Utc::now())),
            });

            let stored = self.inner.store.store(resource, remote.clone()).await?;
            debug!(resource = %resource, "stored fresh content from origin");

            if cooperating && stored.shares_stream_with(&remote) {
                // Every waiter needs its own readable copy.
                let copy = stored.materialize().await.map_err(StoreError::from)?;
                return Ok(Some(copy));
            }
            return Ok(Some(stored));
        }

        if response.is_not_modified() {
            let stale = stale.ok_or_else(|| {
                ProxyError::InvalidResponse(format!(
                    "{} returned 304 for an unconditional request",
                    request.url
                ))
            })?;
            let cache_info = controller.current(Utc::now());
            self.inner
                .store
                .indicate_verified(resource, stale, &cache_info)
                .await?;
            stale.set_cache_info(cache_info);
            debug!(resource = %resource, "origin verified cached content");
            return Ok(None);
        }

        if response.is_definitive_failure() {
            return Err(ProxyError::UpstreamService {
                status: response.status,
                url: request.url.to_string(),
            });
        }

        debug!(
            resource = %resource,
            status = response.status,
            "origin returned no content"
        );
        Ok(None)
    }
}

fn degrade(
    resource: &Resource,
    stale: Option<Content>,
    err: ProxyError,
) -> ProxyResult<Option<Content>> {
    if !err.is_degradable() {
        return Err(err);
    }
    match stale {
        Some(stale) => {
            warn!(resource = %resource, error = %err, "origin failed, serving stale content");
            Ok(Some(stale))
        }
        None => {
            warn!(resource = %resource, error = %err, "origin failed and nothing is cached");
            Err(err)
        }
    }
}

//! Integration tests for the proxy facet over the in-memory store.
//!
//! Test coverage:
//! - Single origin fetch for concurrent requests
//! - Bounded fetch count when the leader outlives the passive timeout
//! - Conditional revalidation (304) and stale fallback
//! - Disabled cooperation, invalidation and metadata max-age

mod common;

use chrono::{TimeZone, Utc};
use common::{facet, ok_response, proxy_config, seed_stale, ScriptedOrigin};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use mirror_proxy::domain::ports::OriginResponse;
use mirror_proxy::{ContentStore, FetchError, ProxyError, Resource};

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_fetch_once() {
    common::setup_test_logging();
    let origin = Arc::new(ScriptedOrigin::new().with_delay(Duration::from_secs(2)));
    let (facet, _store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");

    let results = join_all((0..20).map(|_| facet.get(&resource))).await;

    assert_eq!(origin.calls(), 1);
    for result in results {
        let content = result.unwrap().unwrap();
        assert!(content.is_reusable());
        assert_eq!(content.into_bytes().await.unwrap(), "artifact");
    }
    assert_eq!(facet.cooperation().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_leader_bounds_origin_fetches() {
    let passive = Duration::from_secs(1);
    let leader_duration = Duration::from_secs(5);
    let origin = Arc::new(ScriptedOrigin::new().with_delay(leader_duration));
    let (facet, _store) = facet(&proxy_config(passive.as_secs(), 60), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");

    let mut handles = Vec::new();
    for _ in 0..10 {
        let facet = facet.clone();
        let resource = resource.clone();
        handles.push(tokio::spawn(async move { facet.get(&resource).await }));
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    for handle in handles {
        let content = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(content.into_bytes().await.unwrap(), "artifact");
    }

    let bound = leader_duration.as_secs().div_ceil(passive.as_secs()) as usize + 1;
    assert!(origin.calls() >= 2, "expected a takeover fetch");
    assert!(origin.calls() <= bound, "{} fetches exceeds {bound}", origin.calls());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cooperation_fetches_per_request() {
    let origin = Arc::new(ScriptedOrigin::new().with_delay(Duration::from_secs(1)));
    let (facet, _store) = facet(&proxy_config(0, 10), &origin);
    let resource = Resource::new("a/b/c.tgz");

    let results = join_all((0..5).map(|_| facet.get(&resource))).await;

    assert!(results.into_iter().all(|r| r.unwrap().is_some()));
    assert_eq!(origin.calls(), 5);
}

#[tokio::test]
async fn test_not_modified_refreshes_stamp_and_keeps_payload() {
    let last_modified = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::not_modified())));
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");
    let stale = seed_stale(&facet, &store, &resource, "cached", "v1", last_modified).await;

    let served = facet.get(&resource).await.unwrap().unwrap();

    let request = &origin.requests()[0];
    assert_eq!(request.if_none_match.as_deref(), Some("v1"));
    assert_eq!(request.if_modified_since, Some(last_modified));

    assert!(served.cache_info().unwrap().last_verified > stale.cache_info().unwrap().last_verified);
    assert_eq!(served.attributes().etag.as_deref(), Some("v1"));
    assert_eq!(served.attributes().last_modified, Some(last_modified));
    assert_eq!(served.into_bytes().await.unwrap(), "cached");

    // The store now holds the refreshed stamp, so the next read is a hit.
    let _ = facet.get(&resource).await.unwrap();
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_server_error_serves_stale() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(503))));
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");
    seed_stale(&facet, &store, &resource, "cached", "v1", Utc::now()).await;

    let served = facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(served.into_bytes().await.unwrap(), "cached");
}

#[tokio::test]
async fn test_server_error_without_cache_fails() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(503))));
    let (facet, _store) = facet(&proxy_config(600, 10), &origin);

    let err = facet.get(&Resource::new("missing.jar")).await.unwrap_err();
    assert!(matches!(err, ProxyError::UpstreamService { status: 503, .. }));
}

#[tokio::test]
async fn test_blocked_remote_serves_stale() {
    let origin = Arc::new(ScriptedOrigin::new().then(Err(FetchError::RemoteBlocked {
        remote: "https://origin.test/repo/".to_string(),
        until: Utc::now(),
    })));
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");
    seed_stale(&facet, &store, &resource, "cached", "v1", Utc::now()).await;

    let served = facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(served.into_bytes().await.unwrap(), "cached");
}

#[tokio::test]
async fn test_not_found_returns_none() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(404))));
    let (facet, _store) = facet(&proxy_config(600, 10), &origin);

    assert!(facet.get(&Resource::new("nope.jar")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_blob_refetches_unconditionally() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(ok_response("refetched"))));
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");
    seed_stale(&facet, &store, &resource, "cached", "v1", Utc::now()).await;
    assert!(store.discard_blob(&resource).await);

    let served = facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(served.into_bytes().await.unwrap(), "refetched");
    assert!(!origin.requests()[0].is_conditional());
}

#[tokio::test]
async fn test_invalidate_caches_forces_revalidation() {
    let origin = Arc::new(
        ScriptedOrigin::new()
            .then(Ok(ok_response("v1").with_etag("e1")))
            .then(Ok(OriginResponse::not_modified())),
    );
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");

    facet.get(&resource).await.unwrap().unwrap();
    facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(origin.calls(), 1);

    facet.invalidate_caches();
    let served = facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(origin.calls(), 2);
    assert_eq!(origin.requests()[1].if_none_match.as_deref(), Some("e1"));
    assert_eq!(served.into_bytes().await.unwrap(), "v1");

    let stored = store.lookup(&resource).await.unwrap().unwrap();
    assert!(!facet
        .controllers()
        .content()
        .is_stale(stored.cache_info(), Utc::now()));
}

#[tokio::test]
async fn test_metadata_uses_its_own_max_age() {
    let origin = Arc::new(ScriptedOrigin::new().with_body("<metadata/>"));
    let mut config = proxy_config(600, 10);
    config.proxy.metadata_max_age_minutes = 0;
    let (facet, _store) = facet(&config, &origin);

    let metadata = Resource::classified("org/acme/lib/maven-metadata.xml");
    let jar = Resource::classified("org/acme/lib/1.0/lib-1.0.jar");

    for _ in 0..3 {
        facet.get(&metadata).await.unwrap().unwrap();
        facet.get(&jar).await.unwrap().unwrap();
    }

    let metadata_fetches = origin
        .requests()
        .iter()
        .filter(|request| request.url.path().ends_with("maven-metadata.xml"))
        .count();
    assert_eq!(metadata_fetches, 3);
    assert_eq!(origin.calls(), 4);
}

#[tokio::test]
async fn test_update_to_new_remote_invalidates() {
    let origin = Arc::new(ScriptedOrigin::new());
    let config = proxy_config(600, 10);
    let (facet, _store) = facet(&config, &origin);
    let resource = Resource::new("org/acme/lib/1.0/lib-1.0.jar");

    facet.get(&resource).await.unwrap().unwrap();
    facet.update(&config).unwrap();
    facet.get(&resource).await.unwrap().unwrap();
    assert_eq!(origin.calls(), 1);

    let mut moved = config.clone();
    moved.proxy.remote_url = "https://mirror.test/repo".to_string();
    facet.update(&moved).unwrap();
    facet.get(&resource).await.unwrap().unwrap();

    assert_eq!(origin.calls(), 2);
    assert_eq!(
        origin.requests()[1].url.as_str(),
        "https://mirror.test/repo/org/acme/lib/1.0/lib-1.0.jar"
    );
}

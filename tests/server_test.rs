//! HTTP surface tests driven through the axum router without a socket.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use common::{facet, ok_response, proxy_config, seed_stale, ScriptedOrigin};
use std::sync::Arc;
use tower::ServiceExt;

use mirror_proxy::domain::ports::OriginResponse;
use mirror_proxy::infrastructure::server::{router, AppState};
use mirror_proxy::Resource;

fn app(origin: &Arc<ScriptedOrigin>) -> (Router, mirror_proxy::ProxyFacet) {
    let (facet, _store) = facet(&proxy_config(600, 10), origin);
    (router(AppState { facet: facet.clone() }), facet)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_get_serves_origin_content_with_headers() {
    let origin = Arc::new(
        ScriptedOrigin::new().then(Ok(ok_response("jar bytes").with_etag("abc"))),
    );
    let (app, _facet) = app(&origin);

    let (status, headers, body) = send(&app, "GET", "/repository/org/acme/lib-1.0.jar").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "jar bytes");
    assert_eq!(headers[header::ETAG], "\"abc\"");
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
}

#[tokio::test]
async fn test_query_parameters_reach_origin() {
    let origin = Arc::new(ScriptedOrigin::new());
    let (app, _facet) = app(&origin);

    let (status, _, _) = send(&app, "GET", "/repository/index.json?arch=arm64").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        origin.requests()[0].url.as_str(),
        "https://origin.test/repo/index.json?arch=arm64"
    );
}

#[tokio::test]
async fn test_not_found_maps_to_404() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(404))));
    let (app, _facet) = app(&origin);

    let (status, _, _) = send(&app, "GET", "/repository/missing.jar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(502))));
    let (app, _facet) = app(&origin);

    let (status, _, body) = send(&app, "GET", "/repository/broken.jar").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("502"), "{body}");
}

#[tokio::test]
async fn test_invalidate_endpoint_forces_revalidation() {
    let origin = Arc::new(
        ScriptedOrigin::new()
            .then(Ok(ok_response("v1").with_etag("e1")))
            .then(Ok(OriginResponse::not_modified())),
    );
    let (app, _facet) = app(&origin);

    send(&app, "GET", "/repository/lib.jar").await;
    send(&app, "GET", "/repository/lib.jar").await;
    assert_eq!(origin.calls(), 1);

    let (status, _, body) = send(&app, "POST", "/admin/invalidate").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["invalidated"], true);

    let (status, _, body) = send(&app, "GET", "/repository/lib.jar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "v1");
    assert_eq!(origin.calls(), 2);
    assert_eq!(origin.requests()[1].if_none_match.as_deref(), Some("e1"));
}

#[tokio::test]
async fn test_stale_copy_served_when_origin_fails() {
    let origin = Arc::new(ScriptedOrigin::new().then(Ok(OriginResponse::with_status(503))));
    let (facet, store) = facet(&proxy_config(600, 10), &origin);
    let app = router(AppState { facet: facet.clone() });
    let resource = Resource::classified("org/acme/lib-1.0.jar");
    seed_stale(&facet, &store, &resource, "cached", "v1", Utc::now()).await;

    let (status, headers, body) = send(&app, "GET", "/repository/org/acme/lib-1.0.jar").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "cached");
    assert_eq!(headers[header::ETAG], "\"v1\"");
    assert_eq!(headers[header::CONTENT_TYPE], "application/java-archive");
    assert!(headers.contains_key(header::LAST_MODIFIED));
}

#[tokio::test]
async fn test_healthz_reports_remote() {
    let origin = Arc::new(ScriptedOrigin::new());
    let (app, _facet) = app(&origin);

    let (status, _, body) = send(&app, "GET", "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["remote_url"], "https://origin.test/repo/");
    assert_eq!(json["in_flight"], 0);
}

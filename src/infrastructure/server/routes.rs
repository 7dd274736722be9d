//! HTTP routes in front of the proxy facet.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::adapters::http::origin_client::{format_http_date, quote_etag};
use crate::domain::errors::ProxyError;
use crate::domain::models::{Content, Payload, Resource};
use crate::services::ProxyFacet;

const OCTET_STREAM: &str = "application/octet-stream";

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub facet: ProxyFacet,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/repository/{*path}", get(get_resource))
        .route("/admin/invalidate", post(invalidate))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn get_resource(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let resource = params
        .into_iter()
        .fold(Resource::classified(&path), |resource, (name, value)| {
            resource.with_param(name, value)
        });
    debug!(resource = %resource, category = resource.category().as_str(), "proxy request");

    match state.facet.get(&resource).await {
        Ok(Some(content)) => content_response(content),
        Ok(None) => (StatusCode::NOT_FOUND, format!("{resource} not found\n")).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn invalidate(State(state): State<AppState>) -> Json<InvalidateResponse> {
    state.facet.invalidate_caches();
    Json(InvalidateResponse { invalidated: true })
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        remote_url: state.facet.remote_url().to_string(),
        in_flight: state.facet.cooperation().in_flight(),
    })
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    invalidated: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    remote_url: String,
    in_flight: usize,
}

fn content_response(content: Content) -> Response {
    let mut headers = HeaderMap::new();
    let attributes = content.attributes();

    let content_type = attributes.content_type.as_deref().unwrap_or(OCTET_STREAM);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static(OCTET_STREAM)),
    );
    if let Some(last_modified) = attributes.last_modified {
        if let Ok(value) = HeaderValue::from_str(&format_http_date(last_modified)) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    if let Some(etag) = &attributes.etag {
        if let Ok(value) = HeaderValue::from_str(&quote_etag(etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    let body = match content.payload() {
        Payload::Buffered(bytes) => Body::from(bytes.clone()),
        Payload::Streaming(remote) => match remote.take() {
            Some(stream) => Body::from_stream(stream),
            None => {
                error!("content body was consumed before it could be served");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    (StatusCode::OK, headers, body).into_response()
}

/// Maps proxy failures onto HTTP statuses.
pub struct ApiError(pub ProxyError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ProxyError::UpstreamService { .. }
            | ProxyError::Transient(_)
            | ProxyError::RemoteBlocked { .. }
            | ProxyError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            ProxyError::CooperationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::CooperationAborted { .. }
            | ProxyError::Store(_)
            | ProxyError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "proxy request failed");
        }
        (status, format!("{}\n", self.0)).into_response()
    }
}

use crate::domain::errors::FetchError;
use crate::domain::models::{Content, Payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Conditional GET against the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL of the resource on the origin
    pub url: Url,

    /// Sent as `If-Modified-Since` when present
    pub if_modified_since: Option<DateTime<Utc>>,

    /// Sent as `If-None-Match` (quoted) when present
    pub if_none_match: Option<String>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            if_modified_since: None,
            if_none_match: None,
        }
    }

    /// Add revalidation validators taken from a stale cached copy.
    pub fn revalidating(mut self, stale: Option<&Content>) -> Self {
        if let Some(stale) = stale {
            self.if_modified_since = stale.attributes().last_modified;
            self.if_none_match.clone_from(&stale.attributes().etag);
        }
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.if_modified_since.is_some() || self.if_none_match.is_some()
    }
}

/// What the origin answered.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,

    /// Present for `200` responses
    pub body: Option<Payload>,

    pub last_modified: Option<DateTime<Utc>>,

    /// Entity tag without surrounding quotes
    pub etag: Option<String>,

    pub content_type: Option<String>,
}

impl OriginResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            body: None,
            last_modified: None,
            etag: None,
            content_type: None,
        }
    }

    pub fn ok(body: Payload) -> Self {
        Self {
            body: Some(body),
            ..Self::with_status(STATUS_OK)
        }
    }

    pub fn not_modified() -> Self {
        Self::with_status(STATUS_NOT_MODIFIED)
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub const fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub const fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }

    /// Statuses the proxy reports as a definitive upstream failure.
    pub const fn is_definitive_failure(&self) -> bool {
        matches!(self.status, 401 | 402 | 407) || self.status >= 500
    }

    /// Release any body this response still holds. Returns true only for
    /// the call that actually dropped a streaming body.
    pub fn release(&self) -> bool {
        match &self.body {
            Some(Payload::Streaming(body)) => body.release(),
            _ => false,
        }
    }
}

/// Port for conditional fetches from the upstream origin.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ContentAttributes, RemoteBody};
    use chrono::TimeZone;

    #[test]
    fn test_revalidating_copies_validators() {
        let last_modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let stale = Content::buffered("x").with_attributes(ContentAttributes {
            last_modified: Some(last_modified),
            etag: Some("v1".to_string()),
            ..Default::default()
        });
        let url = Url::parse("https://origin.test/repo/a.jar").unwrap();

        let request = FetchRequest::new(url.clone()).revalidating(Some(&stale));
        assert!(request.is_conditional());
        assert_eq!(request.if_modified_since, Some(last_modified));
        assert_eq!(request.if_none_match.as_deref(), Some("v1"));

        assert!(!FetchRequest::new(url).revalidating(None).is_conditional());
    }

    #[test]
    fn test_definitive_failures() {
        for status in [401, 402, 407, 500, 502, 503, 599] {
            assert!(OriginResponse::with_status(status).is_definitive_failure(), "{status}");
        }
        for status in [200, 304, 400, 403, 404, 410] {
            assert!(!OriginResponse::with_status(status).is_definitive_failure(), "{status}");
        }
    }

    #[test]
    fn test_release_drops_streaming_body_once() {
        let body = RemoteBody::from_bytes("unused");
        let response = OriginResponse::ok(Payload::Streaming(body.clone()));

        assert!(response.release());
        assert!(body.is_consumed());
        assert!(!response.release());

        assert!(!OriginResponse::not_modified().release());
        assert!(!OriginResponse::ok(Payload::Buffered("x".into())).release());
    }
}

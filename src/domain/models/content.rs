//! Cached content, its payload, and the attributes the proxy stamps on it.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// Freshness stamp recorded when content is fetched or re-verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// When the content was last fetched or confirmed unchanged by the origin.
    pub last_verified: DateTime<Utc>,
    /// Max-age in effect when the stamp was issued.
    pub max_age_secs: i64,
    /// Token of the cache controller that issued the stamp.
    pub cache_token: Option<String>,
}

/// Attributes carried alongside a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAttributes {
    /// Origin `Last-Modified`, if it sent a parseable one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Origin entity tag, without surrounding quotes.
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub cache_info: Option<CacheInfo>,
}

type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// A one-shot body still attached to an origin response.
///
/// Clones share the same underlying stream: the body can be consumed or
/// released once, whichever happens first.
#[derive(Clone)]
pub struct RemoteBody {
    stream: Arc<Mutex<Option<BodyStream>>>,
    content_length: Option<u64>,
}

impl RemoteBody {
    pub fn new(stream: BodyStream, content_length: Option<u64>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(Some(stream))),
            content_length,
        }
    }

    /// Body that yields the given bytes in a single chunk.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(
            stream::once(async move { Ok::<_, io::Error>(bytes) }).boxed(),
            Some(len),
        )
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Take the stream out, leaving the body consumed.
    pub fn take(&self) -> Option<BodyStream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Drop the underlying stream. Returns true only for the call that
    /// actually released it.
    pub fn release(&self) -> bool {
        self.take().is_some()
    }

    pub fn is_consumed(&self) -> bool {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// True if both handles refer to the same origin stream.
    pub fn same_body(&self, other: &RemoteBody) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
    }
}

impl fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Bytes behind a [`Content`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// Fully buffered, reusable by any number of readers.
    Buffered(Bytes),
    /// Single-use origin body.
    Streaming(RemoteBody),
}

impl Payload {
    pub fn len(&self) -> Option<u64> {
        match self {
            Payload::Buffered(bytes) => Some(bytes.len() as u64),
            Payload::Streaming(body) => body.content_length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Read the whole payload into memory.
    pub async fn read_all(&self) -> io::Result<Bytes> {
        match self {
            Payload::Buffered(bytes) => Ok(bytes.clone()),
            Payload::Streaming(body) => {
                let mut stream = body.take().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "remote body already consumed")
                })?;
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Read the whole payload unless it is larger than `limit` bytes.
    ///
    /// `None` means the payload is too large. A stream declaring an oversized
    /// length is released unread; otherwise reading stops at the first chunk
    /// that crosses the limit.
    pub async fn read_limited(&self, limit: u64) -> io::Result<Option<Bytes>> {
        if self.len().is_some_and(|len| len > limit) {
            if let Payload::Streaming(body) = self {
                body.release();
            }
            return Ok(None);
        }
        let Payload::Streaming(body) = self else {
            return self.read_all().await.map(Some);
        };

        let mut stream = body.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "remote body already consumed")
        })?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (buf.len() + chunk.len()) as u64 > limit {
                return Ok(None);
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Some(buf.freeze()))
    }
}

/// Content served by the proxy: a payload plus its attributes.
#[derive(Debug, Clone)]
pub struct Content {
    payload: Payload,
    attributes: ContentAttributes,
}

impl Content {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            attributes: ContentAttributes::default(),
        }
    }

    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        Self::new(Payload::Buffered(bytes.into()))
    }

    pub fn streaming(body: RemoteBody) -> Self {
        Self::new(Payload::Streaming(body))
    }

    pub fn with_attributes(mut self, attributes: ContentAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn attributes(&self) -> &ContentAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut ContentAttributes {
        &mut self.attributes
    }

    pub fn cache_info(&self) -> Option<&CacheInfo> {
        self.attributes.cache_info.as_ref()
    }

    pub fn set_cache_info(&mut self, cache_info: CacheInfo) {
        self.attributes.cache_info = Some(cache_info);
    }

    /// True if the payload can be handed to several readers.
    pub fn is_reusable(&self) -> bool {
        matches!(self.payload, Payload::Buffered(_))
    }

    /// True if both contents are backed by the same one-shot origin body.
    pub fn shares_stream_with(&self, other: &Content) -> bool {
        match (&self.payload, &other.payload) {
            (Payload::Streaming(a), Payload::Streaming(b)) => a.same_body(b),
            _ => false,
        }
    }

    /// Buffer the payload in memory, keeping the attributes.
    pub async fn materialize(&self) -> io::Result<Content> {
        if self.is_reusable() {
            return Ok(self.clone());
        }
        let bytes = self.payload.read_all().await?;
        Ok(Content::buffered(bytes).with_attributes(self.attributes.clone()))
    }

    /// Release an unconsumed origin body. Buffered payloads are untouched.
    pub fn release(&self) -> bool {
        match &self.payload {
            Payload::Streaming(body) => body.release(),
            Payload::Buffered(_) => false,
        }
    }

    /// Consume the content, returning its bytes.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        self.payload.read_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_content_is_reusable() {
        let content = Content::buffered("hello");
        assert!(content.is_reusable());
        assert_eq!(content.payload().read_all().await.unwrap(), "hello");
        assert_eq!(content.payload().read_all().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_streaming_body_consumed_once() {
        let content = Content::streaming(RemoteBody::from_bytes("once"));
        let copy = content.clone();
        assert!(content.shares_stream_with(&copy));

        assert_eq!(content.payload().read_all().await.unwrap(), "once");
        let err = copy.payload().read_all().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_materialize_keeps_attributes() {
        let attributes = ContentAttributes {
            etag: Some("abc".to_string()),
            ..Default::default()
        };
        let remote =
            Content::streaming(RemoteBody::from_bytes("payload")).with_attributes(attributes.clone());

        let copy = remote.materialize().await.unwrap();
        assert!(copy.is_reusable());
        assert!(!copy.shares_stream_with(&remote));
        assert_eq!(copy.attributes(), &attributes);
        assert_eq!(copy.into_bytes().await.unwrap(), "payload");
    }

    #[test]
    fn test_release_exactly_once() {
        let content = Content::streaming(RemoteBody::from_bytes("x"));
        assert!(content.release());
        assert!(!content.release());
        assert!(!Content::buffered("y").release());
    }
}

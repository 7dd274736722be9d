use crate::domain::errors::StoreError;
use crate::domain::models::{CacheInfo, Content, Resource};
use async_trait::async_trait;

/// Port for the local copy of proxied content.
///
/// Implementations must be safe to call concurrently for different
/// resources. Concurrent calls for the same resource are only made when
/// cooperation is disabled.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up the cached copy of a resource.
    ///
    /// `StoreError::MissingBlob` signals an inconsistent store and is treated
    /// by the proxy as a cache miss.
    async fn lookup(&self, resource: &Resource) -> Result<Option<Content>, StoreError>;

    /// Persist content freshly fetched from the origin.
    ///
    /// Returns the stored copy. A store that cannot hand out an independent
    /// copy may return the fetched content itself.
    async fn store(&self, resource: &Resource, content: Content) -> Result<Content, StoreError>;

    /// Record that the origin confirmed the cached copy is unchanged.
    async fn indicate_verified(
        &self,
        resource: &Resource,
        content: &Content,
        cache_info: &CacheInfo,
    ) -> Result<(), StoreError>;
}

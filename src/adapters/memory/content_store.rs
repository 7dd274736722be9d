//! In-memory content store.
//!
//! Asset records (attributes plus a blob id) live in a `DashMap` keyed by the
//! resource's [`CooperationKey`], which keeps escaped query values apart. Blob bytes live in a weight-bounded moka cache, so large blobs
//! can be evicted while their record survives. Such a record is reported as
//! [`StoreError::MissingBlob`].

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::models::{
    CacheInfo, Content, ContentAttributes, CooperationKey, Resource, StorageConfig,
};
use crate::domain::ports::ContentStore;

#[derive(Debug, Clone)]
struct AssetRecord {
    blob_id: Uuid,
    attributes: ContentAttributes,
}

/// Weight-bounded in-memory [`ContentStore`].
pub struct MemoryContentStore {
    assets: DashMap<CooperationKey, AssetRecord>,
    blobs: Cache<Uuid, Bytes>,
    max_blob_bytes: u64,
}

impl MemoryContentStore {
    pub fn new(max_blob_bytes: u64) -> Self {
        let blobs = Cache::builder()
            .max_capacity(max_blob_bytes)
            .weigher(|_id: &Uuid, blob: &Bytes| u32::try_from(blob.len()).unwrap_or(u32::MAX))
            .build();

        Self {
            assets: DashMap::new(),
            blobs,
            max_blob_bytes,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.max_blob_bytes)
    }

    pub fn max_blob_bytes(&self) -> u64 {
        self.max_blob_bytes
    }

    /// Number of asset records, including those whose blob was evicted.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Drop the blob behind a resource while keeping its record.
    pub async fn discard_blob(&self, resource: &Resource) -> bool {
        let Some(blob_id) = self.assets.get(&asset_key(resource)).map(|record| record.blob_id) else {
            return false;
        };
        self.blobs.remove(&blob_id).await.is_some()
    }

    /// Remove a resource and its blob.
    pub async fn delete(&self, resource: &Resource) -> bool {
        match self.assets.remove(&asset_key(resource)) {
            Some((_, record)) => {
                self.blobs.invalidate(&record.blob_id).await;
                true
            }
            None => false,
        }
    }
}

fn asset_key(resource: &Resource) -> CooperationKey {
    resource.cooperation_key()
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn lookup(&self, resource: &Resource) -> Result<Option<Content>, StoreError> {
        let key = asset_key(resource);
        let Some(record) = self.assets.get(&key).map(|record| record.clone()) else {
            return Ok(None);
        };

        match self.blobs.get(&record.blob_id).await {
            Some(bytes) => Ok(Some(Content::buffered(bytes).with_attributes(record.attributes))),
            None => Err(StoreError::MissingBlob {
                path: resource.to_string(),
                blob_id: record.blob_id.to_string(),
            }),
        }
    }

    async fn store(&self, resource: &Resource, content: Content) -> Result<Content, StoreError> {
        let Some(bytes) = content.payload().read_limited(self.max_blob_bytes).await? else {
            return Err(StoreError::InvalidContent(format!(
                "{resource} is larger than the {} byte store",
                self.max_blob_bytes
            )));
        };

        let blob_id = Uuid::new_v4();
        self.blobs.insert(blob_id, bytes.clone()).await;

        let record = AssetRecord {
            blob_id,
            attributes: content.attributes().clone(),
        };
        if let Some(previous) = self.assets.insert(asset_key(resource), record) {
            self.blobs.invalidate(&previous.blob_id).await;
        }
        debug!(resource = %resource, blob_id = %blob_id, size = bytes.len(), "stored blob");

        Ok(Content::buffered(bytes).with_attributes(content.attributes().clone()))
    }

    async fn indicate_verified(
        &self,
        resource: &Resource,
        _content: &Content,
        cache_info: &CacheInfo,
    ) -> Result<(), StoreError> {
        if let Some(mut record) = self.assets.get_mut(&asset_key(resource)) {
            record.attributes.cache_info = Some(cache_info.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContentStore")
            .field("assets", &self.assets.len())
            .field("blob_bytes", &self.blobs.weighted_size())
            .field("max_blob_bytes", &self.max_blob_bytes)
            .finish()
    }
}

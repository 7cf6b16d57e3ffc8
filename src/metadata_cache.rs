//! Read-through cache of package metadata.

use crate::error::EarError;
use crate::metrics::METADATA_CACHE_LOOKUPS;
use crate::portal::{MetadataSource, PackageMetadata};

use hashbrown::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// A per-identifier cache of [PackageMetadata].
///
/// Entries never expire, so portal-side updates become visible only after a restart. Each key
/// owns a [OnceCell]: concurrent first lookups of the same identifier share a single upstream
/// fetch, and a failed fetch leaves the cell empty so the next lookup tries again.
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    /// A read-write lock synchronises access to the map, optimised for reads.
    entries: RwLock<HashMap<String, Arc<OnceCell<Arc<PackageMetadata>>>>>,
}

impl MetadataCache {
    /// Create an empty cache in front of `source`.
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the metadata of a package, fetching it on first use.
    ///
    /// # Arguments
    ///
    /// * `package_id`: Dataset identifier
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn resolve(&self, package_id: &str) -> Result<Arc<PackageMetadata>, EarError> {
        let cell = self.cell(package_id).await;
        if let Some(metadata) = cell.get() {
            METADATA_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
            return Ok(metadata.clone());
        }
        METADATA_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        cell.get_or_try_init(|| async { self.source.fetch(package_id).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Get or create the cell for a key.
    async fn cell(&self, package_id: &str) -> Arc<OnceCell<Arc<PackageMetadata>>> {
        // Common case: the key is already present.
        {
            let entries = self.entries.read().await;
            if let Some(cell) = entries.get(package_id) {
                return cell.clone();
            }
        }
        // Another task may have inserted the key since we dropped the read lock.
        let mut entries = self.entries.write().await;
        entries
            .entry(package_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

//! Backend client cache.
//!
//! Holds one constructed backend per `type:id` key for the life of the
//! process (or until the catalog moves on). Construction is single-flight
//! per key: concurrent first users of the same provider wait on one
//! construction, while different keys construct in parallel.
//!
//! Every slot is tagged with the catalog generation its provider config came
//! from. A caller routed on an older generation than the slot, or than the
//! last retired generation, gets a freshly built handle that is never stored,
//! so a reload cannot be undone by a request that was already in flight.
//!
//! Backed by [`DashMap`] for per-shard locking, with a `tokio::sync::OnceCell`
//! per key as the single-flight gate. The DashMap guard is always released
//! before awaiting the cell.

use std::cmp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::{BackendHandle, BackendRegistry};
use crate::config::ProviderConfig;
use crate::error::Result;

#[derive(Clone)]
struct Slot {
    generation: u64,
    cell: Arc<OnceCell<BackendHandle>>,
}

impl Slot {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cell: Arc::default(),
        }
    }
}

/// Lazily constructed, memoized backend handles.
pub struct BackendCache {
    registry: Arc<BackendRegistry>,
    handles: DashMap<String, Slot>,
    /// Oldest catalog generation whose handles may still be stored.
    floor: AtomicU64,
}

/// Cache key for a provider: `type:id`.
pub fn cache_key(provider: &ProviderConfig) -> String {
    format!("{}:{}", provider.provider_type, provider.id)
}

impl BackendCache {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            handles: DashMap::new(),
            floor: AtomicU64::new(0),
        }
    }

    /// The factory table used for construction.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Return the handle for `provider` as configured in catalog `generation`,
    /// constructing it on first use.
    ///
    /// A failed construction leaves the slot empty, so the next caller tries again.
    pub async fn get_or_create(
        &self,
        provider: &ProviderConfig,
        generation: u64,
    ) -> Result<BackendHandle> {
        let key = cache_key(provider);

        // Fast path: populated slot of the same generation, shard read lock only.
        if let Some(handle) = self
            .handles
            .get(&key)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.cell.get().cloned())
        {
            return Ok(handle);
        }

        // DashMap entry guard is released inside claim_slot, before any await.
        let Some(cell) = self.claim_slot(&key, generation) else {
            tracing::debug!(
                key = %key,
                generation,
                "Catalog generation superseded, building uncached backend client"
            );
            return self.registry.build(provider).await;
        };

        let handle = cell
            .get_or_try_init(|| async {
                tracing::info!(
                    key = %key,
                    provider_type = %provider.provider_type,
                    provider = %provider.id,
                    generation,
                    "Constructing backend client"
                );
                self.registry.build(provider).await
            })
            .await?;

        Ok(handle.clone())
    }

    /// The cell a caller of `generation` should initialize, or `None` when that
    /// generation is already superseded.
    fn claim_slot(&self, key: &str, generation: u64) -> Option<Arc<OnceCell<BackendHandle>>> {
        if generation < self.floor.load(Ordering::Acquire) {
            return None;
        }

        let mut slot = self
            .handles
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(generation));

        let order = slot.generation.cmp(&generation);
        match order {
            cmp::Ordering::Less => {
                *slot = Slot::new(generation);
                Some(slot.cell.clone())
            }
            cmp::Ordering::Equal => Some(slot.cell.clone()),
            cmp::Ordering::Greater => None,
        }
    }

    /// Drop every handle built for a generation older than `generation` and
    /// stop storing new ones for those generations.
    pub fn retire_before(&self, generation: u64) {
        self.floor.fetch_max(generation, Ordering::AcqRel);
        let before = self.len();
        self.handles.retain(|_, slot| slot.generation >= generation);
        tracing::info!(
            dropped = before.saturating_sub(self.len()),
            generation,
            "Backend client cache retired older generations"
        );
    }

    /// Drop every cached handle. In-flight requests keep the handles they hold.
    pub fn clear(&self) {
        let dropped = self.len();
        self.handles.clear();
        tracing::info!(dropped, "Backend client cache cleared");
    }

    /// Number of constructed handles currently cached.
    pub fn len(&self) -> usize {
        self.handles
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

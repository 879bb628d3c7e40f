//! Provider catalog: the live set of configured providers.
//!
//! Readers take an immutable snapshot per request so that a reload landing
//! mid-request never mixes old and new provider lists. A reload swaps the
//! whole snapshot and then notifies registered listeners.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::config::ProviderConfig;

type ChangeListener = Box<dyn Fn(&CatalogSnapshot) + Send + Sync>;

/// One immutable view of the catalog.
///
/// `generation` increases with every [`Catalog::replace`], so anything derived
/// from a snapshot can tell whether a newer catalog has since been installed.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub generation: u64,
    pub providers: Arc<[ProviderConfig]>,
}

/// Read-mostly holder of the current provider list.
pub struct Catalog {
    snapshot: RwLock<CatalogSnapshot>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl Catalog {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            snapshot: RwLock::new(CatalogSnapshot {
                generation: 0,
                providers: Arc::from(providers),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Current snapshot with its generation.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current provider snapshot. Cheap to clone; never changes underneath the caller.
    pub fn providers(&self) -> Arc<[ProviderConfig]> {
        self.snapshot().providers
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Register a listener invoked after every [`Catalog::replace`].
    pub fn on_change(&self, listener: impl Fn(&CatalogSnapshot) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Replace the whole provider list, bump the generation and notify listeners.
    pub fn replace(&self, providers: Vec<ProviderConfig>) {
        let next = {
            let mut guard = self
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.generation += 1;
            guard.providers = Arc::from(providers);
            guard.clone()
        };

        tracing::info!(
            providers = next.providers.len(),
            generation = next.generation,
            "Catalog replaced"
        );

        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(&next);
        }
    }
}

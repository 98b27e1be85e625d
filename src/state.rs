use std::sync::Arc;
use std::time::Instant;

use crate::store::{MarketplaceStore, MemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketplaceStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
        }
    }

    /// State backed by a fresh [`MemoryStore`]; used without a database and in tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

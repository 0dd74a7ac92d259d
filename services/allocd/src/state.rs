//! Application state shared across request handlers.

use std::sync::Arc;

use containerops_alloc::{Ipam, PortAllocator, TableStore};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ipam: Ipam,
    ports: PortAllocator,
}

impl AppState {
    /// Create application state over one table store.
    pub fn new(store: TableStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                ipam: Ipam::new(store.clone()),
                ports: PortAllocator::new(store),
            }),
        }
    }

    pub fn ipam(&self) -> &Ipam {
        &self.inner.ipam
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.inner.ports
    }
}

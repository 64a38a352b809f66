use fab_events::Bus;
use fab_store::Store;

/// Shared handles cloned into every request handler.
#[derive(Clone)]
pub(crate) struct AppState {
    bus: Bus,
    store: Store,
}

impl AppState {
    pub fn new(bus: Bus, store: Store) -> Self {
        AppState { bus, store }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

//! The DB-backed half of the Counter & Session Bus (§4.L): named counters
//! backing merge locks and batch triggers (`merges_since_e2e`,
//! `merges_since_docs`). Atomic RMW is delegated to the metadata store's
//! `INSERT ... ON CONFLICT DO UPDATE` (§5's ordering guarantee: no
//! interleaving value is ever observable between increment and read-back).

use crate::error::Error;
use crate::metadata::MetadataStore;

pub struct CounterBus {
    metadata: MetadataStore,
}

impl CounterBus {
    pub fn new(metadata: MetadataStore) -> Self {
        Self { metadata }
    }

    pub fn get(&self, name: &str) -> Result<i64, Error> {
        self.metadata.get_counter(name)
    }

    pub fn increment(&self, name: &str) -> Result<i64, Error> {
        self.metadata.increment_counter(name)
    }

    pub fn set(&self, name: &str, value: i64) -> Result<(), Error> {
        self.metadata.set_counter(name, value)
    }

    pub fn reset(&self, name: &str) -> Result<(), Error> {
        self.metadata.reset_counter(name)
    }

    pub fn list(&self) -> Result<Vec<(String, i64)>, Error> {
        self.metadata.list_counters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn n_increments_from_absent_reach_exactly_n() {
        let bus = CounterBus::new(MetadataStore::in_memory().unwrap());
        for _ in 0..25 {
            bus.increment("merges_since_e2e").unwrap();
        }
        assert_eq!(bus.get("merges_since_e2e").unwrap(), 25);
    }

    #[test]
    fn concurrent_increments_never_lose_an_update() {
        let metadata = MetadataStore::in_memory().unwrap();
        let bus = Arc::new(CounterBus::new(metadata));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        bus.increment("shared").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bus.get("shared").unwrap(), 200);
    }
}

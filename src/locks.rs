//! Per-contract serialization of the read-decide-commit step
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// One mutex per contract id, created on demand and dropped when idle.
///
/// Only local decide-and-commit work runs under a lock; callers must finish
/// any provider I/O before entering [`ContractLocks::run`].
#[derive(Default)]
pub struct ContractLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl ContractLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<T>(&self, contract_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.inner.entry(contract_id.to_string()).or_default().clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        drop(lock);
        // the map's own handle is the last one left when nobody else is waiting
        self.inner
            .remove_if(contract_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

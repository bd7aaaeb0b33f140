use super::error::JanusSSEError;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Key-value store backing the encrypted index, the result cache and client side counters.
///
/// A missing key is a normal outcome, reported as `Ok(None)`. Any other failure is fatal for the operation at hand
/// and must be reported as an error. Implementations must be safe for concurrent operations on distinct keys.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), JanusSSEError>;

    /// Removes `key`, returning whether it was present.
    fn remove(&self, key: &[u8]) -> Result<bool, JanusSSEError>;

    /// Fetches and removes `key`. Implementations able to do so atomically should override this, so that racing
    /// retrievals of the same key see the value at most once.
    fn take(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }

    fn len(&self) -> Result<usize, JanusSSEError>;

    fn is_empty(&self) -> Result<bool, JanusSSEError> {
        Ok(self.len()? == 0)
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), JanusSSEError> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<bool, JanusSSEError> {
        (**self).remove(key)
    }

    fn take(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        (**self).take(key)
    }

    fn len(&self) -> Result<usize, JanusSSEError> {
        (**self).len()
    }
}

/// Non-persistent store, keeping everything in a hash map behind a reader-writer lock.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

fn poisoned<T>(_: T) -> JanusSSEError {
    JanusSSEError::StoreIO(String::from("in-memory store lock is poisoned"))
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), JanusSSEError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<bool, JanusSSEError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn take(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key))
    }

    fn len(&self) -> Result<usize, JanusSSEError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod test {
    use super::{MemoryStore, Store};
    use std::sync::Arc;

    #[test]
    fn missing_key_is_not_an_error() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"absent"), Ok(None));
        assert_eq!(store.remove(b"absent"), Ok(false));
        assert_eq!(store.take(b"absent"), Ok(None));
    }

    #[test]
    fn put_get_take() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();

        assert_eq!(store.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        assert_eq!(store.len(), Ok(1));
        assert_eq!(store.take(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        assert_eq!(store.take(b"k"), Ok(None));
        assert_eq!(store.is_empty(), Ok(true));
    }

    #[test]
    fn concurrent_takes_see_value_at_most_once() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"k", b"v").unwrap();

        let hits = std::thread::scope(|s| {
            let handles = (0..8).map(|_| s.spawn(|| store.take(b"k").unwrap().is_some())).collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|&hit| hit).count()
        });

        assert_eq!(hits, 1);
    }
}

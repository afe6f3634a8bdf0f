use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use super::ReadModelError;

/// Key/value store abstraction for disposable read models.
pub trait ReadStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError>;
    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError>;
    fn remove(&self, key: &K) -> Result<(), ReadModelError>;
    fn list(&self) -> Result<Vec<V>, ReadModelError>;
    /// Drop every record (rebuild support).
    fn clear(&self) -> Result<(), ReadModelError>;
}

impl<K, V, S> ReadStore<K, V> for Arc<S>
where
    S: ReadStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError> {
        (**self).upsert(key, value)
    }

    fn remove(&self, key: &K) -> Result<(), ReadModelError> {
        (**self).remove(key)
    }

    fn list(&self) -> Result<Vec<V>, ReadModelError> {
        (**self).list()
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ReadModelError {
    ReadModelError::Backend("lock poisoned".to_string())
}

impl<K, V> ReadStore<K, V> for InMemoryReadStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<V>, ReadModelError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.clear();
        Ok(())
    }
}

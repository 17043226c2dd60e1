//! Capability sets and per-connection metadata.
//!
//! [`Features`] is keyed by type: a transport layer publishes, say, a
//! `PeerCertificate` struct and later stages look it up by that type.
//! [`Items`] is keyed by string and holds whatever out-of-band values the
//! stages of one pipeline agree on.
//!
//! Values are stored as `Arc<dyn Any + Send + Sync>` so a lookup hands out a
//! shared handle and the collections stay cheap to clone.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

/// An open, extensible set of connection capabilities keyed by type.
#[derive(Clone, Default)]
pub struct Features {
    entries: HashMap<TypeId, Value>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value`, returning the one it replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<Arc<T>> {
        self.entries
            .insert(TypeId::of::<T>(), Arc::new(value))
            .and_then(|old| old.downcast::<T>().ok())
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<Arc<T>> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Features").field("len", &self.entries.len()).finish()
    }
}

/// String-keyed metadata attached to a connection.
#[derive(Clone, Default)]
pub struct Items {
    entries: HashMap<String, Value>,
}

impl Items {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Items {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

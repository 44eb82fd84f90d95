//! Array keys and the registry that interns them.
//!
//! Keys are created once at startup through an [`ArrayKeyRegistry`] and then
//! passed around by value. Two keys are equal exactly when they came from the
//! same registration.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifier of one logical array stream (e.g. `RAW`, `PRED_AFFINITIES`).
///
/// Cloning is cheap. Equality, hashing and ordering use the numeric id only.
#[derive(Clone)]
pub struct ArrayKey {
    id: u32,
    name: Arc<str>,
}

impl ArrayKey {
    /// Registration index, unique within one registry.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name the key was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ArrayKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ArrayKey {}

impl Hash for ArrayKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ArrayKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArrayKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayKey({}#{})", self.name, self.id)
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<Arc<str>, ArrayKey>,
    keys: Vec<ArrayKey>,
}

/// Interns array key names.
///
/// Construct one per pipeline run and share it (`Arc<ArrayKeyRegistry>`)
/// with everything that needs to resolve keys by name, such as config loaders.
#[derive(Default)]
pub struct ArrayKeyRegistry {
    inner: RwLock<RegistryInner>,
}

impl ArrayKeyRegistry {
    /// Registry with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `name`, creating it on first use.
    pub fn register(&self, name: &str) -> Result<ArrayKey> {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidKeyName(name.to_string()));
        }

        if let Some(key) = self.inner.read().by_name.get(name) {
            return Ok(key.clone());
        }

        let mut inner = self.inner.write();
        // Another thread may have registered it between the two locks.
        if let Some(key) = inner.by_name.get(name) {
            return Ok(key.clone());
        }
        let name: Arc<str> = Arc::from(name);
        let key = ArrayKey {
            id: inner.keys.len() as u32,
            name: Arc::clone(&name),
        };
        inner.by_name.insert(name, key.clone());
        inner.keys.push(key.clone());
        tracing::debug!("Registered array key {:?}", key);
        Ok(key)
    }

    /// Key registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<ArrayKey> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn resolve(&self, name: &str) -> Result<ArrayKey> {
        self.get(name)
            .ok_or_else(|| Error::UnknownKey(name.to_string()))
    }

    /// All keys in registration order.
    pub fn keys(&self) -> Vec<ArrayKey> {
        self.inner.read().keys.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

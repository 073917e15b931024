//! Thread-safe intermediate value bag.

use parking_lot::RwLock;
use std::collections::HashMap;

/// The key/value map steps use to talk to each other.
///
/// Unlike a write-once bag, later writes replace earlier ones. [`reset`]
/// restores the snapshot taken at construction time.
///
/// [`reset`]: IntermediateValues::reset
#[derive(Debug, Default)]
pub struct IntermediateValues {
    data: RwLock<HashMap<String, serde_json::Value>>,
    initial: HashMap<String, serde_json::Value>,
}

impl IntermediateValues {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag whose reset snapshot is `initial`.
    #[must_use]
    pub fn from_initial(initial: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(initial.clone()),
            initial,
        }
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets a string value, if the key holds a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data
            .read()
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    }

    /// Gets a boolean value, treating a missing key as `false`.
    #[must_use]
    pub fn get_flag(&self, key: &str) -> bool {
        self.data
            .read()
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, replacing any previous one.
    pub fn add(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Sets several values under one lock.
    pub fn add_many(&self, values: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let mut data = self.data.write();
        for (key, value) in values {
            data.insert(key, value);
        }
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Restores the initial snapshot.
    pub fn reset(&self) {
        *self.data.write() = self.initial.clone();
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

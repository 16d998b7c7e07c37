//! # Attribute Store
//!
//! The shared, concurrently written key/value store that sensors publish into
//! and operators read from. It is the only channel between the two: a sensor
//! never holds a reference to an operator.
//!
//! Writes are last-write-wins per key. Each key is owned by exactly one
//! sensor by convention, so concurrent writers to the same key do not occur in
//! practice. The backing map is a [`DashMap`], so unrelated keys never contend
//! on a shared lock.
//!
//! [`AttributeKey`] wraps a key name with the Rust type stored under it, which
//! keeps callers from colliding on stringly-typed keys.

use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::warn;

/// One observed value along with who published it and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Value,
    pub publishing_sensors: BTreeSet<String>,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub hidden: bool,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            publishing_sensors: BTreeSet::new(),
            updated_at_ms: Utc::now().timestamp_millis(),
            hidden: false,
        }
    }

    pub fn published_by(mut self, sensor: impl Into<String>) -> Self {
        self.publishing_sensors.insert(sensor.into());
        self
    }

    pub fn with_sensors<I, S>(mut self, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.publishing_sensors
            .extend(sensors.into_iter().map(Into::into));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Decode the stored JSON into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }

    /// Time since the value was published
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.updated_at_ms;
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

/// Concurrent key/value store shared by sensors and operators
#[derive(Debug, Default)]
pub struct AttributeStore {
    entries: DashMap<String, Attribute>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `key` with a freshly published value
    pub fn set(&self, key: impl Into<String>, value: Value, sensor: &str) {
        let key = key.into();
        let attribute = Attribute::new(key.clone(), value).published_by(sensor);
        self.entries.insert(key, attribute);
    }

    pub fn insert(&self, attribute: Attribute) {
        self.entries.insert(attribute.key.clone(), attribute);
    }

    pub fn get(&self, key: &str) -> Option<Attribute> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from `required` that have never been published
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|key| !self.entries.contains_key(*key))
            .collect()
    }

    pub fn remove(&self, key: &str) -> Option<Attribute> {
        self.entries.remove(key).map(|(_, attribute)| attribute)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Point-in-time copy, sorted by key. Hidden attributes are left out
    /// unless `include_hidden` is set.
    pub fn snapshot(&self, include_hidden: bool) -> BTreeMap<String, Attribute> {
        self.entries
            .iter()
            .filter(|entry| include_hidden || !entry.value().hidden)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Replace everything with a previously captured snapshot
    pub fn restore(&self, snapshot: BTreeMap<String, Attribute>) {
        self.entries.clear();
        for (key, attribute) in snapshot {
            self.entries.insert(key, attribute);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A decoded attribute together with its publication metadata
#[derive(Debug, Clone)]
pub struct Observed<T> {
    pub value: T,
    pub updated_at_ms: i64,
    pub publishing_sensors: BTreeSet<String>,
}

impl<T> Observed<T> {
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.updated_at_ms;
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

/// Typed handle for one logical attribute
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

impl<T: Serialize + DeserializeOwned> AttributeKey<T> {
    /// Read and decode the value. A value that no longer decodes reads as
    /// absent, so a schema change never crashes an operator pass.
    pub fn get(&self, store: &AttributeStore) -> Option<T> {
        self.get_observed(store).map(|observed| observed.value)
    }

    pub fn get_observed(&self, store: &AttributeStore) -> Option<Observed<T>> {
        let attribute = store.get(self.name)?;
        match attribute.decode::<T>() {
            Ok(value) => Some(Observed {
                value,
                updated_at_ms: attribute.updated_at_ms,
                publishing_sensors: attribute.publishing_sensors,
            }),
            Err(e) => {
                warn!(
                    attribute = self.name,
                    error = %e,
                    "⚠️ ATTRIBUTES: Stored value does not decode, treating as absent"
                );
                None
            }
        }
    }

    pub fn set(&self, store: &AttributeStore, value: &T, sensor: &str) -> serde_json::Result<()> {
        store.set(self.name, serde_json::to_value(value)?, sensor);
        Ok(())
    }

    pub fn is_present(&self, store: &AttributeStore) -> bool {
        store.contains(self.name)
    }
}

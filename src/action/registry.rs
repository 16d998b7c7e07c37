//! In-flight registry.
//!
//! At most one non-terminal action per [`EquivalenceKey`] exists per cluster.
//! Reservation is a single compare-and-set on the map entry, so two
//! concurrent dispatches of equivalent actions cannot both pass the
//! duplicate check.

use super::states::ActionType;
use crate::identity::ActionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a piece of work: name, type and identifying parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EquivalenceKey {
    name: String,
    action_type: ActionType,
    attributes: String,
}

impl EquivalenceKey {
    pub fn new(name: impl Into<String>, action_type: ActionType, attributes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_type,
            attributes: attributes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EquivalenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.action_type, self.name, self.attributes)
    }
}

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: DashMap<EquivalenceKey, ActionId>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for `id`, or return the id that already holds it
    pub fn try_reserve(self: &Arc<Self>, key: EquivalenceKey, id: ActionId) -> Result<Reservation, ActionId> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => Err(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(Reservation {
                    registry: Arc::clone(self),
                    key,
                    id,
                })
            }
        }
    }

    pub fn holder(&self, key: &EquivalenceKey) -> Option<ActionId> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release(&self, key: &EquivalenceKey, id: ActionId) {
        self.entries.remove_if(key, |_, holder| *holder == id);
    }
}

/// Holds an in-flight slot until dropped
#[derive(Debug)]
pub struct Reservation {
    registry: Arc<InFlightRegistry>,
    key: EquivalenceKey,
    id: ActionId,
}

impl Reservation {
    pub fn key(&self) -> &EquivalenceKey {
        &self.key
    }

    pub fn id(&self) -> ActionId {
        self.id
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.id);
    }
}

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::property::{Property, PropertyKey, PropertyValue};

/// Change feed capacity used when a store is built without configuration.
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Notification emitted by a [`PropertyStore`] after an effective write.
///
/// Carries the changed property's identity and name plus the old and new
/// values in type-erased form. Slow subscribers can fall behind the feed and
/// observe a lag error, in which case they should re-read current state from
/// the store instead of relying on missed notifications.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Identity of the property that changed.
    pub key: PropertyKey,
    /// Display name of the property that changed.
    pub name: &'static str,
    /// Effective value before the write (the default if never written).
    pub old: Arc<dyn PropertyValue>,
    /// Value after the write.
    pub new: Arc<dyn PropertyValue>,
}

impl PropertyChange {
    /// Whether this change belongs to the given descriptor.
    pub fn is_property<T>(&self, property: &Property<T>) -> bool
    where
        T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        self.key == property.key()
    }

    /// Downcasts the old value to its concrete type.
    pub fn old_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.old.as_any().downcast_ref()
    }

    /// Downcasts the new value to its concrete type.
    pub fn new_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.new.as_any().downcast_ref()
    }
}

/// Sparse map from property identity to current value, with change
/// notification.
///
/// A store starts empty and adds an entry the first time a property is
/// written, so instances only pay storage for properties they actually
/// override. Reads of absent properties return the descriptor default.
/// Writing a value equal to the effective current value is a no-op that
/// fires nothing.
///
/// The store itself is not synchronized; owners that are mutated from one
/// context and read from another wrap it in a lock. Dropping the owner drops
/// the store and closes its change feed.
#[derive(Debug)]
pub struct PropertyStore {
    values: HashMap<PropertyKey, Arc<dyn PropertyValue>>,
    changes: broadcast::Sender<PropertyChange>,
}

impl PropertyStore {
    /// Creates an empty store whose change feed buffers `change_capacity`
    /// notifications per subscriber before lagging. A capacity below one is
    /// treated as one.
    pub fn new(change_capacity: usize) -> Self {
        let (changes, _initial_receiver) = broadcast::channel(change_capacity.max(1));
        Self {
            values: HashMap::new(),
            changes,
        }
    }

    /// Returns the stored value for `property`, or its default when the
    /// property was never written. Never fails.
    pub fn get<T>(&self, property: &Property<T>) -> T
    where
        T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        self.values
            .get(&property.key())
            .and_then(|value| value.as_any().downcast_ref::<T>())
            .cloned()
            .unwrap_or_else(|| property.default_value().clone())
    }

    /// Writes `value` for `property` and reports whether anything changed.
    ///
    /// When the new value equals the effective current value this is a no-op:
    /// no callback runs and no notification is sent. Otherwise the store is
    /// updated, the descriptor's change callback (if any) runs with the old
    /// and new values, and a single [`PropertyChange`] is broadcast.
    pub fn set<T>(&mut self, property: &Property<T>, value: T) -> bool
    where
        T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let old = self.get(property);
        if old == value {
            return false;
        }

        let new_value: Arc<dyn PropertyValue> = Arc::new(value.clone());
        self.values.insert(property.key(), Arc::clone(&new_value));
        property.invoke_on_changed(self, &old, &value);

        let change = PropertyChange {
            key: property.key(),
            name: property.name(),
            old: Arc::new(old),
            new: new_value,
        };
        // A send error only means nobody is subscribed right now.
        drop(self.changes.send(change));
        true
    }

    /// Subscribes to this store's change feed.
    ///
    /// Notifications arrive in the order the writes occurred. Only changes
    /// made after subscribing are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.changes.subscribe()
    }

    /// Number of properties that have been written at least once.
    pub fn written_len(&self) -> usize {
        self.values.len()
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_CAPACITY)
    }
}

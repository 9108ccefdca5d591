use core::fmt;
use std::any::Any;
use std::sync::Arc;

use uuid::Uuid;

use super::store::PropertyStore;

/// Opaque identity token for a [`Property`] descriptor.
///
/// Keys are allocated when a descriptor is constructed and are never reused,
/// so two descriptors are never equal unless they are the same descriptor,
/// even when they share a name and value type. The key is what a
/// [`PropertyStore`] uses as its map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyKey(Uuid);

impl PropertyKey {
    fn allocate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Type-erased value stored in a [`PropertyStore`].
///
/// Implemented automatically for every type that can act as a property value;
/// code should not implement this trait by hand.
pub trait PropertyValue: Any + Send + Sync {
    /// The value as [`Any`] for downcasting back to its concrete type.
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Value equality against another erased value.
    ///
    /// Values of different concrete types are never equal.
    fn eq_value(&self, other: &dyn PropertyValue) -> bool;

    /// Renders the value for change logs and debug output.
    fn fmt_value(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> PropertyValue for T
where
    T: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn eq_value(&self, other: &dyn PropertyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|value| value == self)
    }

    fn fmt_value(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{self:?}")
    }
}

impl fmt::Debug for dyn PropertyValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_value(formatter)
    }
}

/// Callback invoked by a [`PropertyStore`] after one of its values changed.
///
/// Receives the store that changed along with the old and new values. The
/// callback runs while the caller still holds whatever lock guards the store,
/// so it must not call back into the same store.
pub type ChangeCallback<T> = Arc<dyn Fn(&PropertyStore, &T, &T) + Send + Sync>;

/// Descriptor for one observable property.
///
/// A descriptor is created once per logical field and shared by every store
/// that holds a value for it. It carries the display name, the default value
/// returned by reads before any write, and an optional change callback.
/// Identity is the [`PropertyKey`]; the name plays no part in lookups.
pub struct Property<T> {
    key: PropertyKey,
    name: &'static str,
    default: T,
    on_changed: Option<ChangeCallback<T>>,
}

impl<T> Property<T>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a descriptor with a fresh identity and no change callback.
    pub fn new(name: &'static str, default: T) -> Self {
        Self {
            key: PropertyKey::allocate(),
            name,
            default,
            on_changed: None,
        }
    }

    /// Attaches a change callback to this descriptor.
    ///
    /// The callback fires after the store has been updated and before the
    /// change notification is broadcast.
    #[must_use]
    pub fn with_on_changed(mut self, callback: ChangeCallback<T>) -> Self {
        self.on_changed = Some(callback);
        self
    }

    /// The identity token used as the store map key.
    pub fn key(&self) -> PropertyKey {
        self.key
    }

    /// The display name carried on change notifications.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value reads observe before any write.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub(crate) fn invoke_on_changed(&self, store: &PropertyStore, old: &T, new: &T) {
        if let Some(callback) = &self.on_changed {
            callback(store, old, new);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Property")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

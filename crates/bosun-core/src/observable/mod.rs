//! Observable property framework.
//!
//! Properties are declared once as [`Property`] descriptors and read or
//! written through a [`PropertyStore`], which keeps only the values that were
//! actually written and falls back to each descriptor's default otherwise.
//! Every effective write emits a single typed [`PropertyChange`] on the
//! store's broadcast feed.

/// Property descriptors and the type-erased value trait.
pub mod property;
/// The sparse per-object value store and its change feed.
pub mod store;

pub use property::{ChangeCallback, Property, PropertyKey, PropertyValue};
pub use store::{DEFAULT_CHANGE_CAPACITY, PropertyChange, PropertyStore};

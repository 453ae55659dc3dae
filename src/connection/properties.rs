//! Per-connection key/value store.
//!
//! Values are stored type-erased. Typed reads downcast and report a
//! [`PropertyError::TypeMismatch`] rather than panicking when the stored
//! value has a different type.

use std::{
    any::{Any, type_name},
    sync::Arc,
};

use dashmap::DashMap;
use thiserror::Error;

/// Type-erased property value.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Errors returned by typed property reads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    /// No value is stored under the key.
    #[error("property not found: {key}")]
    Missing {
        /// Requested key.
        key: String,
    },
    /// A value exists but has a different type.
    #[error("property {key} is not a {expected}")]
    TypeMismatch {
        /// Requested key.
        key: String,
        /// Type the caller asked for.
        expected: &'static str,
    },
}

/// Concurrent property map scoped to one connection.
///
/// # Examples
///
/// ```
/// use wirepool::connection::{PropertyError, PropertyStore};
///
/// let props = PropertyStore::default();
/// props.set("user", String::from("ada"));
/// assert_eq!(props.get::<String>("user").expect("stored").as_str(), "ada");
/// assert!(matches!(
///     props.get::<u32>("user"),
///     Err(PropertyError::TypeMismatch { .. })
/// ));
/// ```
#[derive(Default)]
pub struct PropertyStore(DashMap<String, PropertyValue>);

impl PropertyStore {
    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Arc::new(value));
    }

    /// Read the value under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::Missing`] if nothing is stored and
    /// [`PropertyError::TypeMismatch`] if the value is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, PropertyError> {
        let value = self.get_raw(key).ok_or_else(|| PropertyError::Missing {
            key: key.to_owned(),
        })?;
        value.downcast::<T>().map_err(|_| PropertyError::TypeMismatch {
            key: key.to_owned(),
            expected: type_name::<T>(),
        })
    }

    /// Read the type-erased value under `key`.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<PropertyValue> {
        self.0.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return the value under `key`.
    pub fn remove(&self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key).map(|(_, value)| value)
    }

    /// Return `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.0.contains_key(key) }

    /// Number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` when no property is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.0.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_unstable();
        f.debug_struct("PropertyStore").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{PropertyError, PropertyStore};

    #[test]
    fn missing_key_is_reported() {
        let props = PropertyStore::default();
        assert_eq!(
            props.get::<u32>("absent").err(),
            Some(PropertyError::Missing {
                key: "absent".into()
            })
        );
    }

    #[test]
    fn overwrite_and_remove() {
        let props = PropertyStore::default();
        props.set("n", 1_u32);
        props.set("n", 2_u32);
        assert_eq!(*props.get::<u32>("n").expect("stored"), 2);
        assert_eq!(props.len(), 1);
        assert!(props.remove("n").is_some());
        assert!(!props.contains("n"));
        assert!(props.is_empty());
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let props = PropertyStore::default();
        props.set("n", 1_u32);
        assert!(matches!(
            props.get::<String>("n"),
            Err(PropertyError::TypeMismatch { expected, .. }) if expected.contains("String")
        ));
    }
}

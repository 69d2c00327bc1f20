//! Type-erased values passed between the engine and its resources.

use std::any::{type_name, Any};
use std::fmt;

use keel_core::{Error, Result};

/// An opaque value that remembers the name of its concrete type.
///
/// Current state, desired state, patch changes and context entries all travel
/// as payloads. Reading one back as the wrong type is a programming error and
/// surfaces as [`Error::WrongType`].
pub struct Payload {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Payload {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Name of the wrapped type.
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the wrapped value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Result<&T> {
        self.value
            .downcast_ref::<T>()
            .ok_or_else(|| Error::wrong_type(type_name::<T>(), self.type_name))
    }

    /// Mutably borrow the wrapped value as a `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T> {
        let actual = self.type_name;
        self.value
            .downcast_mut::<T>()
            .ok_or_else(|| Error::wrong_type(type_name::<T>(), actual))
    }

    /// Take the wrapped value out as a `T`.
    pub fn downcast<T: Any>(self) -> Result<T> {
        let actual = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::wrong_type(type_name::<T>(), actual))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_downcast_ref_matching_type() {
        let payload = Payload::new(vec!["a".to_string()]);
        assert!(payload.is::<Vec<String>>());
        assert_eq!(payload.downcast_ref::<Vec<String>>().unwrap().len(), 1);
    }

    #[test]
    fn test_downcast_ref_wrong_type_reports_both_names() {
        let payload = Payload::new(7_u32);
        let err = payload.downcast_ref::<String>().unwrap_err();
        assert!(err.is_wrong_type());
        assert!(err.to_string().contains("u32"));
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn test_downcast_by_value() {
        let payload = Payload::new(Some(5_i64));
        assert_eq!(payload.downcast::<Option<i64>>().unwrap(), Some(5));
    }
}

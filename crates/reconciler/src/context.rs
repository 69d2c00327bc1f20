//! Per-pass scratch state shared by the resources of one pipeline run.
//!
//! A [`ReconcileContext`] is created fresh at the start of every pass, handed
//! by `&mut` to each resource in order and dropped when the pass ends. Earlier
//! resources use it to hand discovered facts (a tenant client, a worker count)
//! to later ones. It also carries the three [`Signals`] that steer the
//! executor.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use keel_core::Result;
use ulid::Ulid;

use crate::payload::Payload;

/// Typed key into a [`ReconcileContext`].
///
/// Keys are usually declared once as constants next to the resource that
/// writes them:
///
/// ```ignore
/// pub const WORKER_COUNT: ContextKey<WorkerCount> = ContextKey::new("worker-count");
/// ```
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Declare a key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

/// Flags a resource raises to steer the rest of the pass.
///
/// All three start cleared and are independent of each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    reconciliation_canceled: bool,
    resource_canceled: bool,
    finalizers_kept: bool,
}

impl Signals {
    /// Stop evaluating the remaining resources of this pass. The pass still
    /// reports success.
    pub fn cancel_reconciliation(&mut self) {
        self.reconciliation_canceled = true;
    }

    pub const fn is_reconciliation_canceled(&self) -> bool {
        self.reconciliation_canceled
    }

    /// Abandon the remaining side effects of the current resource only.
    pub fn cancel_resource(&mut self) {
        self.resource_canceled = true;
    }

    pub const fn is_resource_canceled(&self) -> bool {
        self.resource_canceled
    }

    /// Reset by the executor once it has moved past the canceled resource.
    pub fn clear_resource_canceled(&mut self) {
        self.resource_canceled = false;
    }

    /// On a deletion pass, tell the caller to keep the deletion finalizer.
    pub fn keep_finalizers(&mut self) {
        self.finalizers_kept = true;
    }

    pub const fn are_finalizers_kept(&self) -> bool {
        self.finalizers_kept
    }

    /// Whether either cancellation flag is raised.
    pub const fn is_any_canceled(&self) -> bool {
        self.reconciliation_canceled || self.resource_canceled
    }
}

/// Scratch map and signals for one reconciliation pass.
pub struct ReconcileContext {
    invocation_id: Ulid,
    values: HashMap<&'static str, Payload>,
    signals: Signals,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileContext {
    /// Create an empty context with a fresh invocation id.
    pub fn new() -> Self {
        Self {
            invocation_id: Ulid::new(),
            values: HashMap::new(),
            signals: Signals::default(),
        }
    }

    /// Identifier shared by every metrics record of this pass.
    pub const fn invocation_id(&self) -> Ulid {
        self.invocation_id
    }

    /// Store a value, replacing whatever was stored under the same key.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: ContextKey<T>, value: T) {
        self.values.insert(key.name, Payload::new(value));
    }

    /// Read a value. A value of a different type under the same key name is a
    /// [`keel_core::Error::WrongType`].
    pub fn get<T: Any>(&self, key: ContextKey<T>) -> Result<Option<&T>> {
        self.values
            .get(key.name)
            .map(Payload::downcast_ref::<T>)
            .transpose()
    }

    pub fn get_mut<T: Any>(&mut self, key: ContextKey<T>) -> Result<Option<&mut T>> {
        self.values
            .get_mut(key.name)
            .map(Payload::downcast_mut::<T>)
            .transpose()
    }

    /// Remove and return a value.
    pub fn remove<T: Any>(&mut self, key: ContextKey<T>) -> Result<Option<T>> {
        self.values
            .remove(key.name)
            .map(Payload::downcast::<T>)
            .transpose()
    }

    pub fn contains<T>(&self, key: ContextKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    pub const fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut Signals {
        &mut self.signals
    }

    /// Shorthand for `signals_mut().cancel_reconciliation()`.
    pub fn cancel_reconciliation(&mut self) {
        self.signals.cancel_reconciliation();
    }

    /// Shorthand for `signals_mut().cancel_resource()`.
    pub fn cancel_resource(&mut self) {
        self.signals.cancel_resource();
    }

    /// Shorthand for `signals_mut().keep_finalizers()`.
    pub fn keep_finalizers(&mut self) {
        self.signals.keep_finalizers();
    }
}

impl fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&&'static str> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ReconcileContext")
            .field("invocation_id", &self.invocation_id)
            .field("keys", &keys)
            .field("signals", &self.signals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const COUNT: ContextKey<u32> = ContextKey::new("count");
    const COUNT_AS_TEXT: ContextKey<String> = ContextKey::new("count");

    #[test]
    fn test_new_context_has_cleared_signals() {
        let ctx = ReconcileContext::new();
        assert_eq!(*ctx.signals(), Signals::default());
        assert!(!ctx.signals().is_any_canceled());
        assert!(!ctx.signals().are_finalizers_kept());
    }

    #[test]
    fn test_insert_then_get() {
        let mut ctx = ReconcileContext::new();
        ctx.insert(COUNT, 3);
        assert_eq!(ctx.get(COUNT).unwrap(), Some(&3));
        assert!(ctx.contains(COUNT));
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let ctx = ReconcileContext::new();
        assert_eq!(ctx.get(COUNT).unwrap(), None);
    }

    #[test]
    fn test_get_with_mismatched_type_is_wrong_type() {
        let mut ctx = ReconcileContext::new();
        ctx.insert(COUNT, 3);
        let err = ctx.get(COUNT_AS_TEXT).unwrap_err();
        assert!(err.is_wrong_type());
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut ctx = ReconcileContext::new();
        ctx.insert(COUNT, 1);
        if let Some(count) = ctx.get_mut(COUNT).unwrap() {
            *count += 1;
        }
        assert_eq!(ctx.remove(COUNT).unwrap(), Some(2));
        assert!(!ctx.contains(COUNT));
    }

    #[test]
    fn test_signals_are_independent() {
        let mut ctx = ReconcileContext::new();
        ctx.cancel_resource();
        assert!(ctx.signals().is_resource_canceled());
        assert!(!ctx.signals().is_reconciliation_canceled());

        ctx.signals_mut().clear_resource_canceled();
        ctx.keep_finalizers();
        assert!(!ctx.signals().is_any_canceled());
        assert!(ctx.signals().are_finalizers_kept());
    }

    #[test]
    fn test_each_context_gets_its_own_invocation_id() {
        assert_ne!(
            ReconcileContext::new().invocation_id(),
            ReconcileContext::new().invocation_id()
        );
    }
}

//! Resource capability sets.
//!
//! A resource is one independent unit of convergence inside a pipeline. It
//! implements exactly one of two capability sets:
//!
//! - [`CrudResource`]: diff-based. The pipeline reads current and desired
//!   state, asks the resource for a [`Patch`] and applies each present slot.
//! - [`EnsureResource`]: idempotent convergence without a diff stage.
//!
//! Pipelines store resources as the tagged [`Resource`] variant. Typed CRUD
//! resources are erased into [`CrudOps`] so that resources with different
//! state types can live in one list.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Result;

use crate::context::ReconcileContext;
use crate::object::ManagedObject;
use crate::patch::Patch;
use crate::payload::Payload;

/// Diff-based resource with a concrete state type.
///
/// `current_state` must translate "does not exist yet" into an empty state
/// rather than an error. Side effects belong in the `apply_*` methods only,
/// since those are the calls the retry wrapper repeats.
#[async_trait]
pub trait CrudResource<O: ManagedObject>: Send + Sync + 'static {
    /// State exchanged between the stages, e.g. `Vec<ConfigMap>`.
    type State: Send + Sync + 'static;

    /// Stable resource name used in logs and metrics.
    fn name(&self) -> &str;

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Self::State>;

    async fn desired_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Self::State>;

    /// Compute the patch for a create/update pass.
    async fn new_update_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::State>>;

    /// Compute the patch for a deletion pass.
    async fn new_delete_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::State>>;

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Self::State,
    ) -> Result<()>;

    /// Many resources never update in place, so this defaults to a no-op.
    async fn apply_update_change(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &O,
        _change: &Self::State,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Self::State,
    ) -> Result<()>;
}

/// Resource that converges without an explicit diff.
#[async_trait]
pub trait EnsureResource<O: ManagedObject>: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()>;

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()>;
}

/// Type-erased form of [`CrudResource`].
///
/// This is the seam the wrappers decorate. Implementations other than the
/// adapter and the wrappers are rarely needed.
#[async_trait]
pub trait CrudOps<O: ManagedObject>: Send + Sync {
    fn name(&self) -> &str;

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload>;

    async fn desired_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload>;

    async fn new_update_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>>;

    async fn new_delete_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>>;

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()>;

    async fn apply_update_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()>;

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()>;
}

/// Erases a [`CrudResource`] into [`CrudOps`], checking payload types on the
/// way back in.
pub struct CrudAdapter<R> {
    inner: R,
}

impl<R> CrudAdapter<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<O, R> CrudOps<O> for CrudAdapter<R>
where
    O: ManagedObject,
    R: CrudResource<O>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        self.inner.current_state(ctx, obj).await.map(Payload::new)
    }

    async fn desired_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        self.inner.desired_state(ctx, obj).await.map(Payload::new)
    }

    async fn new_update_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        let current = current.downcast_ref::<R::State>()?;
        let desired = desired.downcast_ref::<R::State>()?;
        self.inner
            .new_update_patch(ctx, obj, current, desired)
            .await
            .map(|patch| patch.map(Payload::new))
    }

    async fn new_delete_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        let current = current.downcast_ref::<R::State>()?;
        let desired = desired.downcast_ref::<R::State>()?;
        self.inner
            .new_delete_patch(ctx, obj, current, desired)
            .await
            .map(|patch| patch.map(Payload::new))
    }

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let change = change.downcast_ref::<R::State>()?;
        self.inner.apply_create_change(ctx, obj, change).await
    }

    async fn apply_update_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let change = change.downcast_ref::<R::State>()?;
        self.inner.apply_update_change(ctx, obj, change).await
    }

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let change = change.downcast_ref::<R::State>()?;
        self.inner.apply_delete_change(ctx, obj, change).await
    }
}

/// A pipeline entry: one resource and the capability set it implements.
pub enum Resource<O: ManagedObject> {
    Crud(Arc<dyn CrudOps<O>>),
    Ensure(Arc<dyn EnsureResource<O>>),
}

impl<O: ManagedObject> Resource<O> {
    /// Wrap a typed diff-based resource.
    pub fn crud<R: CrudResource<O>>(resource: R) -> Self {
        Self::Crud(Arc::new(CrudAdapter::new(resource)))
    }

    /// Wrap an ensure-style resource.
    pub fn ensure<R: EnsureResource<O>>(resource: R) -> Self {
        Self::Ensure(Arc::new(resource))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Crud(ops) => ops.name(),
            Self::Ensure(ensure) => ensure.name(),
        }
    }

    pub const fn is_crud(&self) -> bool {
        matches!(self, Self::Crud(_))
    }
}

impl<O: ManagedObject> Clone for Resource<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Crud(ops) => Self::Crud(Arc::clone(ops)),
            Self::Ensure(ensure) => Self::Ensure(Arc::clone(ensure)),
        }
    }
}

impl<O: ManagedObject> std::fmt::Debug for Resource<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_crud() { "Crud" } else { "Ensure" };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}

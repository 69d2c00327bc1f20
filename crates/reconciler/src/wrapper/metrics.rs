//! Per-call instrumentation of resources.
//!
//! Every resource call is timed and reported to a [`MetricsRecorder`] as an
//! [`InvocationRecord`]. The wrapper only observes: results and errors pass
//! through untouched.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::Result;
use serde::Serialize;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::context::{ReconcileContext, Signals};
use crate::object::ManagedObject;
use crate::patch::Patch;
use crate::payload::Payload;
use crate::resource::{CrudOps, EnsureResource, Resource};

/// Resource call being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CurrentState,
    DesiredState,
    UpdatePatch,
    DeletePatch,
    ApplyCreate,
    ApplyUpdate,
    ApplyDelete,
    EnsureCreated,
    EnsureDeleted,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentState => "current_state",
            Self::DesiredState => "desired_state",
            Self::UpdatePatch => "update_patch",
            Self::DeletePatch => "delete_patch",
            Self::ApplyCreate => "apply_create",
            Self::ApplyUpdate => "apply_update",
            Self::ApplyDelete => "apply_delete",
            Self::EnsureCreated => "ensure_created",
            Self::EnsureDeleted => "ensure_deleted",
        }
    }
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    /// The call returned `Ok` but raised a cancellation signal.
    Canceled,
}

/// One measured resource call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRecord {
    pub invocation_id: Ulid,
    pub resource: String,
    pub operation: Operation,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: Outcome,
}

/// Sink for invocation records.
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, record: InvocationRecord);
}

/// Emits every record as a debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl MetricsRecorder for TracingRecorder {
    fn record(&self, record: InvocationRecord) {
        debug!(
            invocation_id = %record.invocation_id,
            resource = %record.resource,
            operation = record.operation.as_str(),
            duration_ms = record.duration.as_millis() as u64,
            outcome = ?record.outcome,
            "Resource call finished"
        );
    }
}

/// Keeps records in memory, for tests and status reporting.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    records: Mutex<Vec<InvocationRecord>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<InvocationRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records of one resource, in call order.
    pub fn records_for(&self, resource: &str) -> Vec<InvocationRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.resource == resource)
            .collect()
    }
}

impl MetricsRecorder for InMemoryRecorder {
    fn record(&self, record: InvocationRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => {
                warn!("Metrics recorder lock poisoned, recovering");
                poisoned.into_inner().push(record);
            }
        }
    }
}

/// Start of a measured call.
struct Timer {
    started_at: DateTime<Utc>,
    start: Instant,
    before: Signals,
}

impl Timer {
    fn start(ctx: &ReconcileContext) -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
            before: *ctx.signals(),
        }
    }

    fn finish<T>(
        self,
        recorder: &dyn MetricsRecorder,
        ctx: &ReconcileContext,
        resource: &str,
        operation: Operation,
        result: &Result<T>,
    ) {
        let after = ctx.signals();
        let raised_cancel = (after.is_resource_canceled() && !self.before.is_resource_canceled())
            || (after.is_reconciliation_canceled() && !self.before.is_reconciliation_canceled());

        let outcome = match result {
            Err(_) => Outcome::Error,
            Ok(_) if raised_cancel => Outcome::Canceled,
            Ok(_) => Outcome::Success,
        };

        recorder.record(InvocationRecord {
            invocation_id: ctx.invocation_id(),
            resource: resource.to_string(),
            operation,
            started_at: self.started_at,
            duration: self.start.elapsed(),
            outcome,
        });
    }
}

/// Instruments every call of a diff-based resource.
pub struct MetricsCrud<O: ManagedObject> {
    inner: Arc<dyn CrudOps<O>>,
    recorder: Arc<dyn MetricsRecorder>,
}

impl<O: ManagedObject> MetricsCrud<O> {
    pub fn new(inner: Arc<dyn CrudOps<O>>, recorder: Arc<dyn MetricsRecorder>) -> Self {
        Self { inner, recorder }
    }

    fn finish<T>(&self, timer: Timer, ctx: &ReconcileContext, op: Operation, result: &Result<T>) {
        timer.finish(self.recorder.as_ref(), ctx, self.inner.name(), op, result);
    }
}

#[async_trait]
impl<O: ManagedObject> CrudOps<O> for MetricsCrud<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        let timer = Timer::start(ctx);
        let result = self.inner.current_state(ctx, obj).await;
        self.finish(timer, ctx, Operation::CurrentState, &result);
        result
    }

    async fn desired_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        let timer = Timer::start(ctx);
        let result = self.inner.desired_state(ctx, obj).await;
        self.finish(timer, ctx, Operation::DesiredState, &result);
        result
    }

    async fn new_update_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        let timer = Timer::start(ctx);
        let result = self.inner.new_update_patch(ctx, obj, current, desired).await;
        self.finish(timer, ctx, Operation::UpdatePatch, &result);
        result
    }

    async fn new_delete_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        let timer = Timer::start(ctx);
        let result = self.inner.new_delete_patch(ctx, obj, current, desired).await;
        self.finish(timer, ctx, Operation::DeletePatch, &result);
        result
    }

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let timer = Timer::start(ctx);
        let result = self.inner.apply_create_change(ctx, obj, change).await;
        self.finish(timer, ctx, Operation::ApplyCreate, &result);
        result
    }

    async fn apply_update_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let timer = Timer::start(ctx);
        let result = self.inner.apply_update_change(ctx, obj, change).await;
        self.finish(timer, ctx, Operation::ApplyUpdate, &result);
        result
    }

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let timer = Timer::start(ctx);
        let result = self.inner.apply_delete_change(ctx, obj, change).await;
        self.finish(timer, ctx, Operation::ApplyDelete, &result);
        result
    }
}

/// Instruments both calls of an ensure-style resource.
pub struct MetricsEnsure<O: ManagedObject> {
    inner: Arc<dyn EnsureResource<O>>,
    recorder: Arc<dyn MetricsRecorder>,
}

impl<O: ManagedObject> MetricsEnsure<O> {
    pub fn new(inner: Arc<dyn EnsureResource<O>>, recorder: Arc<dyn MetricsRecorder>) -> Self {
        Self { inner, recorder }
    }
}

#[async_trait]
impl<O: ManagedObject> EnsureResource<O> for MetricsEnsure<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let timer = Timer::start(ctx);
        let result = self.inner.ensure_created(ctx, obj).await;
        timer.finish(
            self.recorder.as_ref(),
            ctx,
            self.inner.name(),
            Operation::EnsureCreated,
            &result,
        );
        result
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let timer = Timer::start(ctx);
        let result = self.inner.ensure_deleted(ctx, obj).await;
        timer.finish(
            self.recorder.as_ref(),
            ctx,
            self.inner.name(),
            Operation::EnsureDeleted,
            &result,
        );
        result
    }
}

impl<O: ManagedObject> Resource<O> {
    /// Decorate this resource with instrumentation.
    #[must_use]
    pub fn with_metrics(self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        match self {
            Self::Crud(ops) => Self::Crud(Arc::new(MetricsCrud::new(ops, recorder))),
            Self::Ensure(ensure) => Self::Ensure(Arc::new(MetricsEnsure::new(ensure, recorder))),
        }
    }
}

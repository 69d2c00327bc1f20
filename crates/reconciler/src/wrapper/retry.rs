//! Retry with exponential backoff around side-effecting resource calls.
//!
//! Only the `apply_*` and `ensure_*` calls are retried. Reads and patch
//! computation run once. Only transient errors are retried; anything else
//! propagates on the first failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel_core::{Error, Result};
use rand::Rng;
use tracing::{debug, warn};

use crate::context::ReconcileContext;
use crate::object::ManagedObject;
use crate::patch::Patch;
use crate::payload::Payload;
use crate::resource::{CrudOps, EnsureResource, Resource};

/// Backoff settings for one resource call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = a single attempt).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each delay by up to 25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Execute once, never retry.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            capped_ms * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    fn backoff<'a>(&'a self, resource: &'a str, operation: &'static str) -> Backoff<'a> {
        Backoff {
            policy: self,
            resource,
            operation,
            retries: 0,
        }
    }
}

/// Retry bookkeeping for a single call.
struct Backoff<'a> {
    policy: &'a RetryPolicy,
    resource: &'a str,
    operation: &'static str,
    retries: u32,
}

impl Backoff<'_> {
    /// Sleep before the next attempt, or hand the error back when it must
    /// propagate.
    async fn wait(&mut self, error: Error) -> Result<()> {
        if !error.is_transient() {
            debug!(
                resource = %self.resource,
                operation = self.operation,
                error = %error,
                "Error is not retryable"
            );
            return Err(error);
        }
        if self.retries >= self.policy.max_attempts {
            warn!(
                resource = %self.resource,
                operation = self.operation,
                attempts = self.retries.saturating_add(1),
                error = %error,
                "Retries exhausted"
            );
            return Err(error);
        }

        self.retries = self.retries.saturating_add(1);
        let delay = self.policy.delay_for(self.retries);
        warn!(
            resource = %self.resource,
            operation = self.operation,
            attempt = self.retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient error, retrying"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Retries the apply calls of a diff-based resource.
pub struct RetryCrud<O: ManagedObject> {
    inner: Arc<dyn CrudOps<O>>,
    policy: RetryPolicy,
}

impl<O: ManagedObject> RetryCrud<O> {
    pub fn new(inner: Arc<dyn CrudOps<O>>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<O: ManagedObject> CrudOps<O> for RetryCrud<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        self.inner.current_state(ctx, obj).await
    }

    async fn desired_state(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<Payload> {
        self.inner.desired_state(ctx, obj).await
    }

    async fn new_update_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        self.inner.new_update_patch(ctx, obj, current, desired).await
    }

    async fn new_delete_patch(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        current: &Payload,
        desired: &Payload,
    ) -> Result<Patch<Payload>> {
        self.inner.new_delete_patch(ctx, obj, current, desired).await
    }

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let mut backoff = self.policy.backoff(self.inner.name(), "apply_create_change");
        loop {
            match self.inner.apply_create_change(ctx, obj, change).await {
                Ok(()) => return Ok(()),
                Err(e) => backoff.wait(e).await?,
            }
        }
    }

    async fn apply_update_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let mut backoff = self.policy.backoff(self.inner.name(), "apply_update_change");
        loop {
            match self.inner.apply_update_change(ctx, obj, change).await {
                Ok(()) => return Ok(()),
                Err(e) => backoff.wait(e).await?,
            }
        }
    }

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &O,
        change: &Payload,
    ) -> Result<()> {
        let mut backoff = self.policy.backoff(self.inner.name(), "apply_delete_change");
        loop {
            match self.inner.apply_delete_change(ctx, obj, change).await {
                Ok(()) => return Ok(()),
                Err(e) => backoff.wait(e).await?,
            }
        }
    }
}

/// Retries both calls of an ensure-style resource.
pub struct RetryEnsure<O: ManagedObject> {
    inner: Arc<dyn EnsureResource<O>>,
    policy: RetryPolicy,
}

impl<O: ManagedObject> RetryEnsure<O> {
    pub fn new(inner: Arc<dyn EnsureResource<O>>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<O: ManagedObject> EnsureResource<O> for RetryEnsure<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let mut backoff = self.policy.backoff(self.inner.name(), "ensure_created");
        loop {
            match self.inner.ensure_created(ctx, obj).await {
                Ok(()) => return Ok(()),
                Err(e) => backoff.wait(e).await?,
            }
        }
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let mut backoff = self.policy.backoff(self.inner.name(), "ensure_deleted");
        loop {
            match self.inner.ensure_deleted(ctx, obj).await {
                Ok(()) => return Ok(()),
                Err(e) => backoff.wait(e).await?,
            }
        }
    }
}

impl<O: ManagedObject> Resource<O> {
    /// Decorate this resource with retry.
    #[must_use]
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        match self {
            Self::Crud(ops) => Self::Crud(Arc::new(RetryCrud::new(ops, policy))),
            Self::Ensure(ensure) => Self::Ensure(Arc::new(RetryEnsure::new(ensure, policy))),
        }
    }
}

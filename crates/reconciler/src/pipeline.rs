//! Ordered resource executor.
//!
//! A [`Pipeline`] runs its resources strictly in order for one object. Each
//! pass gets a fresh [`ReconcileContext`]. After every resource the executor
//! looks at the context signals:
//!
//! 1. `resource_canceled` is cleared and the pass moves on to the next
//!    resource.
//! 2. `reconciliation_canceled` ends the pass early with success.
//!
//! Any error aborts the pass and is returned to the caller.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use keel_core::{Error, Result, ResultExt};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::context::{ReconcileContext, Signals};
use crate::object::ManagedObject;
use crate::resource::{CrudOps, Resource};
use crate::version::VersionDescriptor;

/// Seeds the context before the first resource runs.
pub type ContextInitializer<O> =
    Arc<dyn Fn(&mut ReconcileContext, &O) -> Result<()> + Send + Sync>;

/// Result of a deletion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Some resource asked to keep the deletion finalizer.
    pub finalizers_kept: bool,
}

impl DeletionOutcome {
    /// Whether the caller may remove the deletion finalizer now.
    pub const fn remove_finalizer(&self) -> bool {
        !self.finalizers_kept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Create,
    Delete,
}

impl Pass {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// An immutable, ordered list of resources for one pipeline generation.
///
/// Pipelines hold no per-pass state and can run concurrently for different
/// objects.
pub struct Pipeline<O: ManagedObject> {
    descriptor: VersionDescriptor,
    resources: Vec<Resource<O>>,
    init_context: Option<ContextInitializer<O>>,
}

impl<O: ManagedObject> Pipeline<O> {
    /// Start building a pipeline for the given generation.
    pub fn builder(descriptor: VersionDescriptor) -> PipelineBuilder<O> {
        PipelineBuilder {
            descriptor,
            resources: Vec::new(),
            init_context: None,
        }
    }

    /// The generation this pipeline implements.
    pub const fn describe(&self) -> &VersionDescriptor {
        &self.descriptor
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(Resource::name).collect()
    }

    /// Run a create/update pass.
    pub async fn ensure_created(&self, obj: &O) -> Result<()> {
        self.run_instrumented(obj, Pass::Create).await.map(|_| ())
    }

    /// Run a deletion pass.
    pub async fn ensure_deleted(&self, obj: &O) -> Result<DeletionOutcome> {
        self.run_instrumented(obj, Pass::Delete)
            .await
            .map(|signals| DeletionOutcome {
                finalizers_kept: signals.are_finalizers_kept(),
            })
    }

    async fn run_instrumented(&self, obj: &O, pass: Pass) -> Result<Signals> {
        let span = info_span!(
            "reconcile",
            pipeline = %self.descriptor.name,
            version = %self.descriptor.version,
            object = %obj.id(),
            pass = pass.as_str(),
        );
        self.run(obj, pass).instrument(span).await
    }

    async fn run(&self, obj: &O, pass: Pass) -> Result<Signals> {
        let mut ctx = ReconcileContext::new();
        if let Some(init) = &self.init_context {
            init(&mut ctx, obj)?;
        }

        info!(invocation_id = %ctx.invocation_id(), "Reconciliation started");

        for resource in &self.resources {
            let name = resource.name();
            debug!(resource = %name, "Executing resource");

            let result = match resource {
                Resource::Crud(ops) => run_crud(ops.as_ref(), &mut ctx, obj, pass).await,
                Resource::Ensure(ensure) => match pass {
                    Pass::Create => ensure.ensure_created(&mut ctx, obj).await,
                    Pass::Delete => ensure.ensure_deleted(&mut ctx, obj).await,
                },
            };
            result.inspect_error(|e| warn!(resource = %name, error = %e, "Resource failed"))?;

            if ctx.signals().is_resource_canceled() {
                debug!(resource = %name, "Resource canceled");
                ctx.signals_mut().clear_resource_canceled();
            }
            if ctx.signals().is_reconciliation_canceled() {
                info!(resource = %name, "Reconciliation canceled");
                break;
            }
        }

        info!(
            finalizers_kept = ctx.signals().are_finalizers_kept(),
            "Reconciliation finished"
        );
        Ok(*ctx.signals())
    }
}

impl<O: ManagedObject> fmt::Debug for Pipeline<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("descriptor", &self.descriptor)
            .field("resources", &self.resource_names())
            .field("init_context", &self.init_context.is_some())
            .finish()
    }
}

/// Diff-based execution of one resource. Stops at the first stage after
/// which a cancellation signal is raised.
async fn run_crud<O: ManagedObject>(
    ops: &dyn CrudOps<O>,
    ctx: &mut ReconcileContext,
    obj: &O,
    pass: Pass,
) -> Result<()> {
    let current = ops.current_state(ctx, obj).await?;
    if ctx.signals().is_any_canceled() {
        return Ok(());
    }

    let desired = ops.desired_state(ctx, obj).await?;
    if ctx.signals().is_any_canceled() {
        return Ok(());
    }

    let patch = match pass {
        Pass::Create => ops.new_update_patch(ctx, obj, &current, &desired).await?,
        Pass::Delete => ops.new_delete_patch(ctx, obj, &current, &desired).await?,
    };
    if patch.is_empty() || ctx.signals().is_any_canceled() {
        return Ok(());
    }

    let (create, update, delete) = patch.into_parts();

    if let Some(change) = create {
        ops.apply_create_change(ctx, obj, &change).await?;
        if ctx.signals().is_any_canceled() {
            return Ok(());
        }
    }
    if let Some(change) = update {
        ops.apply_update_change(ctx, obj, &change).await?;
        if ctx.signals().is_any_canceled() {
            return Ok(());
        }
    }
    if let Some(change) = delete {
        ops.apply_delete_change(ctx, obj, &change).await?;
    }

    Ok(())
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder<O: ManagedObject> {
    descriptor: VersionDescriptor,
    resources: Vec<Resource<O>>,
    init_context: Option<ContextInitializer<O>>,
}

impl<O: ManagedObject> PipelineBuilder<O> {
    /// Append a resource.
    #[must_use]
    pub fn resource(mut self, resource: Resource<O>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Append several resources in order.
    #[must_use]
    pub fn resources(mut self, resources: impl IntoIterator<Item = Resource<O>>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Seed every pass's context before the first resource runs.
    #[must_use]
    pub fn init_context<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut ReconcileContext, &O) -> Result<()> + Send + Sync + 'static,
    {
        self.init_context = Some(Arc::new(init));
        self
    }

    /// Validate and build.
    ///
    /// Fails on an invalid descriptor, an empty resource list or two resources
    /// with the same name.
    pub fn build(self) -> Result<Pipeline<O>> {
        self.descriptor.validate()?;

        if self.resources.is_empty() {
            return Err(Error::invalid_config(format!(
                "pipeline '{}' {} has no resources",
                self.descriptor.name, self.descriptor.version
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.resources.iter().find(|r| !seen.insert(r.name())) {
            return Err(Error::duplicate_name(dup.name(), "pipeline"));
        }

        Ok(Pipeline {
            descriptor: self.descriptor,
            resources: self.resources,
            init_context: self.init_context,
        })
    }
}

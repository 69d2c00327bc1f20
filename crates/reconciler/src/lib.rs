//! Resource pipeline engine for converging managed cluster addons.
//!
//! One reconciliation pass runs an ordered list of independent resources
//! for one observed object:
//!
//! - **Router**: picks the pipeline generation from the object's version
//!   label
//! - **Context**: fresh per pass, carries discovered facts and signals
//! - **Resources**: diff-based (`CrudResource`) or ensure-style
//!   (`EnsureResource`)
//! - **Wrappers**: retry transient errors, record per-call metrics
//!
//! # Signals
//!
//! - `resource_canceled`: skip the rest of the current resource
//! - `reconciliation_canceled`: stop the pass, report success
//! - `finalizers_kept`: on deletion, keep the finalizer for another pass
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keel_reconciler::{
//!     wrapper, Controller, InMemoryRecorder, Pipeline, Resource, RetryPolicy, Router,
//!     VersionDescriptor,
//! };
//!
//! let resources = wrapper::wrap(
//!     vec![
//!         Resource::ensure(TenantClients::new(factory)),
//!         Resource::crud(ControlPlaneNamespace::new(cp, "cluster-operator")?),
//!     ],
//!     &RetryPolicy::default(),
//!     Arc::new(InMemoryRecorder::new()),
//! );
//! let pipeline = Pipeline::builder(VersionDescriptor::new("cluster-operator", "aws", "1.0.0"))
//!     .resources(resources)
//!     .build()?;
//!
//! let controller = Controller::new("cluster-operator", Router::by_version([Arc::new(pipeline)])?)?;
//! let outcome = controller.reconcile(&cluster).await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod context;
pub mod controller;
pub mod diff;
pub mod object;
pub mod patch;
pub mod payload;
pub mod pipeline;
pub mod resource;
pub mod router;
pub mod version;
pub mod wrapper;

// Re-export main types
pub use context::{ContextKey, ReconcileContext, Signals};
pub use controller::{Controller, ReconcileOutcome};
pub use diff::{diff, diff_by, Diff, Equivalent, Named};
pub use object::ManagedObject;
pub use patch::Patch;
pub use payload::Payload;
pub use pipeline::{ContextInitializer, DeletionOutcome, Pipeline, PipelineBuilder};
pub use resource::{CrudAdapter, CrudOps, CrudResource, EnsureResource, Resource};
pub use router::{RoutePredicate, Router};
pub use version::{
    validate_descriptors, ChangeKind, Changelog, Component, ReleaseVersion, VersionDescriptor,
};
pub use wrapper::{
    wrap, InMemoryRecorder, InvocationRecord, MetricsRecorder, Operation, Outcome, RetryPolicy,
    TracingRecorder,
};

//! Cluster addon resources for the keel pipeline engine.
//!
//! - **Kinds**: [`Cluster`] and [`MachineDeployment`], the reconciled objects
//! - **Platform**: traits for the management API, tenant clients and
//!   events, with in-memory implementations
//! - **Resources**: the concrete pipeline resources
//! - **Assembly**: versioned pipelines, routers and controllers built from
//!   an [`OperatorConfig`] and a [`ProviderConfig`]

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod assembly;
pub mod bundle;
pub mod config;
pub mod keys;
pub mod kind;
pub mod label;
pub mod objects;
pub mod platform;
pub mod provider;
pub mod resources;

pub use assembly::{
    cluster_controller, cluster_pipeline, cluster_router, machine_deployment_controller,
    machine_deployment_pipeline, machine_deployment_router, tenant_endpoint, Deps,
};
pub use config::{OperatorConfig, RetrySettings};
pub use kind::{
    Cluster, ClusterStatus, MachineDeployment, MachineDeploymentStatus, ObjectRef, TenantScoped,
};
pub use objects::{ConfigMap, InfrastructureObject, Labels, Namespace, Node};
pub use platform::{
    ControlPlane, EventRecorder, InMemoryControlPlane, InMemoryEventRecorder,
    InMemoryTenantCluster, InMemoryTenantFactory, TenantClient, TenantClientFactory,
    TracingEventRecorder,
};
pub use provider::{ManagedChart, ProviderConfig, ValuesGenerator};

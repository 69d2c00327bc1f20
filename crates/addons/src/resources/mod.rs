//! Concrete resources of the cluster and machine deployment pipelines.
//!
//! Context resources run first and publish facts under [`crate::keys`]:
//!
//! | resource | kind | publishes |
//! |---|---|---|
//! | `tenantclients` | ensure | tenant client |
//! | `workercount` | ensure | worker node counts |
//!
//! Control-plane and tenant resources consume those facts and cancel
//! themselves when a fact is missing.

pub mod clusterconfigmap;
pub mod clusterstatus;
pub mod configmap;
pub mod cpnamespace;
pub mod keepforinfrarefs;
pub mod machinedeploymentstatus;
pub mod tenantclients;
pub mod workercount;

use keel_core::{Error, Result};
use serde::Serialize;

pub use clusterconfigmap::ClusterConfigMap;
pub use clusterstatus::ClusterStatusResource;
pub use configmap::TenantConfigMaps;
pub use cpnamespace::ControlPlaneNamespace;
pub use keepforinfrarefs::KeepForInfraRefs;
pub use machinedeploymentstatus::MachineDeploymentStatusResource;
pub use tenantclients::TenantClients;
pub use workercount::{NodeCount, WorkerCount, WorkerCounter};

pub(crate) fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| Error::parse_failed("yaml", e.to_string()))
}

//! Managed object kinds reconciled by the operator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use keel_reconciler::ManagedObject;
use serde::{Deserialize, Serialize};

use crate::label;

/// Reference to another platform object, e.g. a provider-specific
/// infrastructure object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A reference without name or namespace points at nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.namespace.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub control_plane_initialized: bool,
    pub infrastructure_ready: bool,
}

impl ClusterStatus {
    pub const fn is_ready(&self) -> bool {
        self.control_plane_initialized && self.infrastructure_ready
    }
}

/// A managed tenant cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster id, also the object name.
    pub id: String,
    pub namespace: String,
    pub organization: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub infrastructure_ref: Option<ObjectRef>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ClusterStatus,
}

impl Cluster {
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            organization: organization.into(),
            labels: BTreeMap::new(),
            infrastructure_ref: None,
            deletion_timestamp: None,
            status: ClusterStatus::default(),
        }
    }

    #[must_use]
    pub fn with_operator_version(mut self, version: impl Into<String>) -> Self {
        self.labels
            .insert(label::OPERATOR_VERSION.to_string(), version.into());
        self
    }

    #[must_use]
    pub fn with_infrastructure_ref(mut self, reference: ObjectRef) -> Self {
        self.infrastructure_ref = Some(reference);
        self
    }

    #[must_use]
    pub fn deleted_at(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }
}

impl ManagedObject for Cluster {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.organization
    }

    fn version_label(&self) -> Option<&str> {
        self.labels.get(label::OPERATOR_VERSION).map(String::as_str)
    }

    fn deletion_timestamp(&self) -> Option<DateTime<Utc>> {
        self.deletion_timestamp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDeploymentStatus {
    pub replicas: u32,
    pub ready_replicas: u32,
}

/// A pool of worker nodes in a tenant cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDeployment {
    pub name: String,
    pub namespace: String,
    pub cluster_id: String,
    pub organization: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub infrastructure_ref: Option<ObjectRef>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: MachineDeploymentStatus,
}

impl MachineDeployment {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cluster_id: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(label::MACHINE_DEPLOYMENT.to_string(), name.clone());
        Self {
            name,
            namespace: namespace.into(),
            cluster_id: cluster_id.into(),
            organization: organization.into(),
            labels,
            infrastructure_ref: None,
            deletion_timestamp: None,
            status: MachineDeploymentStatus::default(),
        }
    }

    #[must_use]
    pub fn with_operator_version(mut self, version: impl Into<String>) -> Self {
        self.labels
            .insert(label::OPERATOR_VERSION.to_string(), version.into());
        self
    }

    #[must_use]
    pub fn with_infrastructure_ref(mut self, reference: ObjectRef) -> Self {
        self.infrastructure_ref = Some(reference);
        self
    }

    #[must_use]
    pub fn deleted_at(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }

    /// Pool id the worker nodes of this deployment are labelled with.
    pub fn pool_id(&self) -> &str {
        self.labels
            .get(label::MACHINE_DEPLOYMENT)
            .map_or(self.name.as_str(), String::as_str)
    }
}

impl ManagedObject for MachineDeployment {
    fn id(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &str {
        &self.organization
    }

    fn version_label(&self) -> Option<&str> {
        self.labels.get(label::OPERATOR_VERSION).map(String::as_str)
    }

    fn deletion_timestamp(&self) -> Option<DateTime<Utc>> {
        self.deletion_timestamp
    }
}

/// Objects that live in, or describe part of, a tenant cluster.
pub trait TenantScoped: ManagedObject {
    /// Id of the tenant cluster.
    fn cluster_id(&self) -> &str;
}

impl TenantScoped for Cluster {
    fn cluster_id(&self) -> &str {
        &self.id
    }
}

impl TenantScoped for MachineDeployment {
    fn cluster_id(&self) -> &str {
        &self.cluster_id
    }
}

/// Objects backed by a provider-specific infrastructure object.
pub trait InfrastructureBacked: ManagedObject {
    /// `None` or an empty reference when the provider has not linked one.
    fn infrastructure_ref(&self) -> Option<&ObjectRef>;
}

impl InfrastructureBacked for Cluster {
    fn infrastructure_ref(&self) -> Option<&ObjectRef> {
        self.infrastructure_ref.as_ref()
    }
}

impl InfrastructureBacked for MachineDeployment {
    fn infrastructure_ref(&self) -> Option<&ObjectRef> {
        self.infrastructure_ref.as_ref()
    }
}

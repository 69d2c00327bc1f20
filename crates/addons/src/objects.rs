//! Platform objects read and written by the addon resources.

use std::collections::BTreeMap;

use keel_reconciler::{Equivalent, Named};
use serde::{Deserialize, Serialize};

use crate::label;

pub type Labels = BTreeMap<String, String>;

/// Whether `labels` carries every pair in `selector`.
pub fn matches_selector(labels: &Labels, selector: &Labels) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Key/value configuration object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Revision assigned by the platform on every write.
    #[serde(default)]
    pub resource_version: Option<String>,
}

impl ConfigMap {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl Named for ConfigMap {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Equivalent for ConfigMap {
    fn equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.labels == other.labels
            && self.annotations == other.annotations
            && self.data == other.data
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub resource_version: Option<String>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl Named for Namespace {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Equivalent for Namespace {
    fn equivalent(&self, other: &Self) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}

/// A node of a tenant cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    pub ready: bool,
}

impl Node {
    pub fn worker(name: impl Into<String>, pool: impl Into<String>, ready: bool) -> Self {
        let mut labels = Labels::new();
        labels.insert(label::MACHINE_DEPLOYMENT.to_string(), pool.into());
        Self {
            name: name.into(),
            labels,
            ready,
        }
    }

    pub fn master(name: impl Into<String>, ready: bool) -> Self {
        let mut labels = Labels::new();
        labels.insert(label::MASTER_ROLE.to_string(), String::new());
        Self {
            name: name.into(),
            labels,
            ready,
        }
    }

    pub fn is_master(&self) -> bool {
        self.labels.contains_key(label::MASTER_ROLE)
    }

    /// Machine pool of a worker node.
    pub fn pool(&self) -> Option<&str> {
        self.labels.get(label::MACHINE_DEPLOYMENT).map(String::as_str)
    }
}

/// Condition an infrastructure object reports once its cluster is created.
pub const CONDITION_CREATED: &str = "Created";

/// Provider-specific infrastructure object a cluster references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureObject {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl InfrastructureObject {
    pub fn has_created_condition(&self) -> bool {
        self.conditions.iter().any(|c| c == CONDITION_CREATED)
    }
}

//! Provider-specific pieces injected into the pipelines.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use keel_core::Result;
use serde_yaml::Value;

use crate::config::OperatorConfig;
use crate::kind::Cluster;

/// Produces the values of a cluster's `<id>-cluster-values` config map.
pub type ValuesGenerator =
    Arc<dyn Fn(&Cluster, &OperatorConfig) -> Result<BTreeMap<String, Value>> + Send + Sync>;

/// Chart the operator ships a values config map for in every tenant
/// cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedChart {
    pub name: String,
    pub namespace: String,
}

impl ManagedChart {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-values", self.name)
    }
}

/// Everything that differs between providers.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: String,
    /// Tenant namespaces besides `kube-system` holding managed config maps.
    pub namespaces: Vec<String>,
    pub cluster_values: ValuesGenerator,
    pub charts: Vec<ManagedChart>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("namespaces", &self.namespaces)
            .field("charts", &self.charts)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, cluster_values: ValuesGenerator) -> Self {
        Self {
            provider: provider.into(),
            namespaces: Vec::new(),
            cluster_values,
            charts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    #[must_use]
    pub fn with_chart(mut self, chart: ManagedChart) -> Self {
        self.charts.push(chart);
        self
    }

    pub fn aws() -> Self {
        Self::new("aws", Arc::new(base_values))
            .with_namespace("giantswarm")
            .with_chart(ManagedChart::new("coredns", "kube-system"))
            .with_chart(ManagedChart::new("kube-state-metrics", "kube-system"))
            .with_chart(ManagedChart::new("nginx-ingress-controller", "kube-system"))
            .with_chart(ManagedChart::new("node-exporter", "kube-system"))
    }

    pub fn azure() -> Self {
        Self::new("azure", Arc::new(base_values))
            .with_namespace("giantswarm")
            .with_chart(ManagedChart::new("coredns", "kube-system"))
            .with_chart(ManagedChart::new("kube-state-metrics", "kube-system"))
            .with_chart(ManagedChart::new("nginx-ingress-controller", "kube-system"))
            .with_chart(ManagedChart::new("node-exporter", "kube-system"))
    }

    pub fn kvm() -> Self {
        Self::new("kvm", Arc::new(kvm_values))
            .with_chart(ManagedChart::new("coredns", "kube-system"))
            .with_chart(ManagedChart::new("kube-state-metrics", "kube-system"))
            .with_chart(ManagedChart::new("node-exporter", "kube-system"))
    }

    /// Preset for a provider tag.
    pub fn for_provider(provider: &str) -> Option<Self> {
        match provider {
            "aws" => Some(Self::aws()),
            "azure" => Some(Self::azure()),
            "kvm" => Some(Self::kvm()),
            _ => None,
        }
    }
}

/// DNS zone of a cluster's tenant API.
pub fn dns_zone(cluster: &Cluster, config: &OperatorConfig) -> String {
    format!("{}.k8s.{}", cluster.id, config.base_domain)
}

fn base_values(cluster: &Cluster, config: &OperatorConfig) -> Result<BTreeMap<String, Value>> {
    let mut values = BTreeMap::new();
    values.insert(
        "baseDomain".to_string(),
        Value::String(dns_zone(cluster, config)),
    );
    values.insert(
        "clusterDNSIP".to_string(),
        Value::String(config.dns_ip.clone()),
    );
    Ok(values)
}

fn kvm_values(cluster: &Cluster, config: &OperatorConfig) -> Result<BTreeMap<String, Value>> {
    let mut values = base_values(cluster, config)?;
    // On-prem clusters also need the pod network for Calico.
    if !config.calico_address.is_empty() {
        values.insert(
            "calicoSubnet".to_string(),
            Value::String(format!(
                "{}/{}",
                config.calico_address, config.calico_prefix_length
            )),
        );
    }
    Ok(values)
}

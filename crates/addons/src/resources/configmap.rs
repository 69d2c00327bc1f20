//! Values config maps of the managed charts inside the tenant cluster.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Error, Result, WriteResultExt};
use keel_reconciler::{diff, CrudResource, Patch, ReconcileContext};
use serde::Serialize;
use tracing::debug;

use crate::config::OperatorConfig;
use crate::keys;
use crate::kind::Cluster;
use crate::label;
use crate::objects::{ConfigMap, Labels};
use crate::platform::TenantClient;
use crate::provider::{ManagedChart, ProviderConfig};
use crate::resources::to_yaml;

pub const NAME: &str = "configmap";

const NAMESPACE_SYSTEM: &str = "kube-system";

#[derive(Debug, Serialize)]
struct ChartValues<'a> {
    #[serde(rename = "clusterID")]
    cluster_id: &'a str,
    image: ImageValues<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<NetworkValues<'a>>,
}

#[derive(Debug, Serialize)]
struct ImageValues<'a> {
    registry: &'a str,
}

#[derive(Debug, Serialize)]
struct NetworkValues<'a> {
    #[serde(rename = "clusterIPRange")]
    cluster_ip_range: &'a str,
    #[serde(rename = "dnsIP")]
    dns_ip: &'a str,
}

/// Tenant config maps holding the values of the charts the operator
/// manages, labelled `service-type=managed` and `managed-by=<project>`.
///
/// Works with the client `tenantclients` put into the context. A tenant API
/// that goes away between reading and writing cancels the whole pass.
pub struct TenantConfigMaps {
    config: OperatorConfig,
    namespaces: BTreeSet<String>,
    charts: Vec<ManagedChart>,
}

impl TenantConfigMaps {
    pub fn new(config: OperatorConfig, provider: &ProviderConfig) -> Result<Self> {
        if config.project_name.is_empty() {
            return Err(Error::invalid_config(format!(
                "{NAME}: project name must not be empty"
            )));
        }
        if config.registry_domain.is_empty() {
            return Err(Error::invalid_config(format!(
                "{NAME}: registry domain must not be empty"
            )));
        }

        let namespaces = std::iter::once(NAMESPACE_SYSTEM.to_string())
            .chain(provider.namespaces.iter().cloned())
            .collect();

        Ok(Self {
            config,
            namespaces,
            charts: provider.charts.clone(),
        })
    }

    fn selector(&self) -> Labels {
        Labels::from([
            (label::SERVICE_TYPE.to_string(), label::SERVICE_TYPE_MANAGED.to_string()),
            (label::MANAGED_BY.to_string(), self.config.project_name.clone()),
        ])
    }

    fn chart_config_map(&self, chart: &ManagedChart, cluster: &Cluster) -> Result<ConfigMap> {
        let network = (chart.name == "coredns").then_some(NetworkValues {
            cluster_ip_range: &self.config.cluster_ip_range,
            dns_ip: &self.config.dns_ip,
        });
        let values = ChartValues {
            cluster_id: &cluster.id,
            image: ImageValues {
                registry: &self.config.registry_domain,
            },
            cluster: network,
        };

        Ok(ConfigMap::new(chart.config_map_name(), &chart.namespace)
            .with_label(label::SERVICE_TYPE, label::SERVICE_TYPE_MANAGED)
            .with_label(label::MANAGED_BY, &self.config.project_name)
            .with_label(label::CLUSTER, &cluster.id)
            .with_data("values", to_yaml(&values)?))
    }

    /// Client for writes. Without one the pass is canceled.
    fn writer(ctx: &mut ReconcileContext) -> Result<Option<Arc<dyn TenantClient>>> {
        let client = ctx.get(keys::TENANT_CLIENT)?.map(Arc::clone);
        if client.is_none() {
            debug!("tenant client not available");
            debug!("canceling reconciliation");
            ctx.cancel_reconciliation();
        }
        Ok(client)
    }
}

/// Cancel the pass if the tenant API went away mid-write.
fn tolerate_unavailable(ctx: &mut ReconcileContext, result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_tenant_not_available() => {
            debug!(error = %e, "tenant cluster is not available");
            debug!("canceling reconciliation");
            ctx.cancel_reconciliation();
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CrudResource<Cluster> for TenantConfigMaps {
    type State = Vec<ConfigMap>;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        let Some(client) = ctx.get(keys::TENANT_CLIENT)?.map(Arc::clone) else {
            debug!(object = %obj.id, "tenant client not available yet");
            debug!(object = %obj.id, "canceling resource");
            ctx.cancel_resource();
            return Ok(Vec::new());
        };

        debug!(object = %obj.id, "finding config maps in tenant cluster");
        let selector = self.selector();
        let mut config_maps = Vec::new();
        for namespace in &self.namespaces {
            match client.list_config_maps(namespace, &selector).await {
                Ok(listed) => config_maps.extend(listed),
                Err(e) if e.is_tenant_not_available() => {
                    debug!(object = %obj.id, error = %e, "tenant cluster is not available yet");
                    debug!(object = %obj.id, "canceling resource");
                    ctx.cancel_resource();
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            }
        }
        debug!(object = %obj.id, count = config_maps.len(), "found config maps in tenant cluster");
        Ok(config_maps)
    }

    async fn desired_state(&self, _ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        self.charts
            .iter()
            .map(|chart| self.chart_config_map(chart, obj))
            .collect()
    }

    async fn new_update_patch(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &Cluster,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::State>> {
        Ok(diff(current, desired)?.into_patch())
    }

    async fn new_delete_patch(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &Cluster,
        current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Patch<Self::State>> {
        if current.is_empty() {
            return Ok(Patch::new());
        }
        Ok(Patch::new().with_delete(current.clone()))
    }

    async fn apply_create_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        let Some(client) = Self::writer(ctx)? else {
            return Ok(());
        };
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "creating config map in tenant cluster");
            let result = client.create_config_map(config_map).await.ignore_already_exists();
            if !tolerate_unavailable(ctx, result)? {
                return Ok(());
            }
            debug!(object = %obj.id, config_map = %config_map.name, "created config map in tenant cluster");
        }
        Ok(())
    }

    async fn apply_update_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        let Some(client) = Self::writer(ctx)? else {
            return Ok(());
        };
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "updating config map in tenant cluster");
            let result = client.update_config_map(config_map).await;
            if !tolerate_unavailable(ctx, result)? {
                return Ok(());
            }
            debug!(object = %obj.id, config_map = %config_map.name, "updated config map in tenant cluster");
        }
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        let Some(client) = Self::writer(ctx)? else {
            return Ok(());
        };
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "deleting config map in tenant cluster");
            let result = client
                .delete_config_map(&config_map.namespace, &config_map.name)
                .await
                .ignore_missing();
            if !tolerate_unavailable(ctx, result)? {
                return Ok(());
            }
            debug!(object = %obj.id, config_map = %config_map.name, "deleted config map in tenant cluster");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::platform::InMemoryTenantCluster;

    fn cluster() -> Cluster {
        Cluster::new("a1b2c", "org-acme", "acme")
    }

    fn resource() -> TenantConfigMaps {
        TenantConfigMaps::new(OperatorConfig::default(), &ProviderConfig::aws()).unwrap()
    }

    fn context_with(tenant: &Arc<InMemoryTenantCluster>) -> ReconcileContext {
        let mut ctx = ReconcileContext::new();
        let client: Arc<dyn TenantClient> = tenant.clone();
        ctx.insert(keys::TENANT_CLIENT, client);
        ctx
    }

    #[test]
    fn test_new_rejects_missing_registry() {
        let mut config = OperatorConfig::default();
        config.registry_domain = String::new();
        let err = TenantConfigMaps::new(config, &ProviderConfig::kvm()).err().unwrap();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_desired_has_one_map_per_chart() {
        let mut ctx = ReconcileContext::new();
        let desired = resource().desired_state(&mut ctx, &cluster()).await.unwrap();

        let names: Vec<_> = desired.iter().map(|cm| cm.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "coredns-values",
                "kube-state-metrics-values",
                "nginx-ingress-controller-values",
                "node-exporter-values",
            ]
        );
        let coredns = desired[0].data.get("values").unwrap();
        assert!(coredns.contains("clusterIPRange: 172.31.0.0/16"));
        assert!(coredns.contains("clusterID: a1b2c"));
        assert!(!desired[1].data["values"].contains("clusterIPRange"));
    }

    #[tokio::test]
    async fn test_lists_only_managed_maps_in_watched_namespaces() {
        let tenant = Arc::new(InMemoryTenantCluster::new("a1b2c"));
        let managed = ConfigMap::new("coredns-values", "kube-system")
            .with_label(label::SERVICE_TYPE, label::SERVICE_TYPE_MANAGED)
            .with_label(label::MANAGED_BY, "cluster-operator");
        tenant.create_config_map(&managed).await.unwrap();
        tenant
            .create_config_map(&ConfigMap::new("user-values", "kube-system"))
            .await
            .unwrap();
        let mut elsewhere = managed.clone();
        elsewhere.namespace = "default".to_string();
        tenant.create_config_map(&elsewhere).await.unwrap();
        let mut in_provider_ns = managed.clone();
        in_provider_ns.namespace = "giantswarm".to_string();
        tenant.create_config_map(&in_provider_ns).await.unwrap();

        let mut ctx = context_with(&tenant);
        let current = resource().current_state(&mut ctx, &cluster()).await.unwrap();

        let namespaces: Vec<_> = current.iter().map(|cm| cm.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["giantswarm", "kube-system"]);
    }

    #[tokio::test]
    async fn test_missing_client_cancels_resource() {
        let mut ctx = ReconcileContext::new();
        let current = resource().current_state(&mut ctx, &cluster()).await.unwrap();
        assert!(current.is_empty());
        assert!(ctx.signals().is_resource_canceled());
    }

    #[tokio::test]
    async fn test_outage_during_apply_cancels_reconciliation() {
        let tenant = Arc::new(InMemoryTenantCluster::new("a1b2c"));
        let mut ctx = context_with(&tenant);
        let desired = resource().desired_state(&mut ctx, &cluster()).await.unwrap();

        tenant.set_available(false);
        resource()
            .apply_create_change(&mut ctx, &cluster(), &desired)
            .await
            .unwrap();

        assert!(ctx.signals().is_reconciliation_canceled());
        assert!(tenant.config_maps().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let tenant = Arc::new(InMemoryTenantCluster::new("a1b2c"));
        let mut ctx = context_with(&tenant);
        let desired = resource().desired_state(&mut ctx, &cluster()).await.unwrap();

        resource()
            .apply_create_change(&mut ctx, &cluster(), &desired)
            .await
            .unwrap();
        resource()
            .apply_create_change(&mut ctx, &cluster(), &desired)
            .await
            .unwrap();

        assert_eq!(tenant.config_maps().await.len(), 4);
        assert!(!ctx.signals().is_any_canceled());
    }
}

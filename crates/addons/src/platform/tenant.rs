//! Access to tenant clusters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Error, Result};
use tokio::sync::RwLock;

use crate::objects::{matches_selector, ConfigMap, Labels, Node};

/// Client for one tenant cluster's API.
///
/// Fails with [`Error::TenantNotAvailable`] while the tenant API cannot be
/// reached, e.g. right after the cluster was created.
#[async_trait]
pub trait TenantClient: Send + Sync {
    fn cluster_id(&self) -> &str;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_config_maps(&self, namespace: &str, selector: &Labels) -> Result<Vec<ConfigMap>>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Creates tenant clients.
#[async_trait]
pub trait TenantClientFactory: Send + Sync {
    /// Connect to the tenant cluster `cluster_id` at `endpoint`.
    async fn new_client(&self, cluster_id: &str, endpoint: &str) -> Result<Arc<dyn TenantClient>>;
}

/// In-memory tenant cluster.
#[derive(Debug)]
pub struct InMemoryTenantCluster {
    cluster_id: String,
    nodes: RwLock<Vec<Node>>,
    config_maps: RwLock<BTreeMap<(String, String), ConfigMap>>,
    available: AtomicBool,
}

impl InMemoryTenantCluster {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            nodes: RwLock::new(Vec::new()),
            config_maps: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle whether the tenant API answers.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.write().await = nodes;
    }

    /// Every stored config map, ordered by namespace and name.
    pub async fn config_maps(&self) -> Vec<ConfigMap> {
        self.config_maps.read().await.values().cloned().collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::tenant_not_available(
                &self.cluster_id,
                "tenant API is not reachable",
            ))
        }
    }
}

#[async_trait]
impl TenantClient for InMemoryTenantCluster {
    fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.check_available()?;
        Ok(self.nodes.read().await.clone())
    }

    async fn list_config_maps(&self, namespace: &str, selector: &Labels) -> Result<Vec<ConfigMap>> {
        self.check_available()?;
        Ok(self
            .config_maps
            .read()
            .await
            .values()
            .filter(|cm| cm.namespace == namespace && matches_selector(&cm.labels, selector))
            .cloned()
            .collect())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.check_available()?;
        let mut config_maps = self.config_maps.write().await;
        let key = (config_map.namespace.clone(), config_map.name.clone());
        if config_maps.contains_key(&key) {
            return Err(Error::already_exists("ConfigMap", &config_map.name));
        }
        config_maps.insert(key, config_map.clone());
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.check_available()?;
        let mut config_maps = self.config_maps.write().await;
        let stored = config_maps
            .get_mut(&(config_map.namespace.clone(), config_map.name.clone()))
            .ok_or_else(|| Error::not_found("ConfigMap", &config_map.name))?;
        stored.clone_from(config_map);
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_available()?;
        self.config_maps
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found("ConfigMap", name))
    }
}

/// Hands out clients for registered in-memory tenant clusters.
#[derive(Debug, Default)]
pub struct InMemoryTenantFactory {
    clusters: std::sync::RwLock<HashMap<String, Arc<InMemoryTenantCluster>>>,
    endpoints: std::sync::Mutex<Vec<String>>,
}

impl InMemoryTenantFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant cluster and return a handle for seeding it.
    pub fn register(&self, cluster_id: &str) -> Arc<InMemoryTenantCluster> {
        let cluster = Arc::new(InMemoryTenantCluster::new(cluster_id));
        match self.clusters.write() {
            Ok(mut clusters) => {
                clusters.insert(cluster_id.to_string(), Arc::clone(&cluster));
            }
            Err(poisoned) => {
                poisoned
                    .into_inner()
                    .insert(cluster_id.to_string(), Arc::clone(&cluster));
            }
        }
        cluster
    }

    /// Endpoints clients were requested for, in order.
    pub fn requested_endpoints(&self) -> Vec<String> {
        match self.endpoints.lock() {
            Ok(endpoints) => endpoints.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lookup(&self, cluster_id: &str) -> Option<Arc<InMemoryTenantCluster>> {
        match self.clusters.read() {
            Ok(clusters) => clusters.get(cluster_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(cluster_id).cloned(),
        }
    }
}

#[async_trait]
impl TenantClientFactory for InMemoryTenantFactory {
    async fn new_client(&self, cluster_id: &str, endpoint: &str) -> Result<Arc<dyn TenantClient>> {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            endpoints.push(endpoint.to_string());
        }

        let cluster = self.lookup(cluster_id).ok_or_else(|| {
            Error::tenant_not_available(cluster_id, "control plane is not provisioned yet")
        })?;
        cluster.check_available()?;
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_unknown_cluster_is_not_available() {
        let factory = InMemoryTenantFactory::new();
        let err = factory
            .new_client("a1b2c", "api.a1b2c.k8s.example.com")
            .await
            .err()
            .unwrap();
        assert!(err.is_tenant_not_available());
        assert_eq!(factory.requested_endpoints(), vec!["api.a1b2c.k8s.example.com"]);
    }

    #[tokio::test]
    async fn test_client_sees_seeded_nodes() {
        let factory = InMemoryTenantFactory::new();
        let tenant = factory.register("a1b2c");
        tenant
            .set_nodes(vec![Node::worker("w0", "pool0", true)])
            .await;

        let client = factory.new_client("a1b2c", "api").await.unwrap();
        assert_eq!(client.cluster_id(), "a1b2c");
        assert_eq!(client.list_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_outage_after_client_creation() {
        let factory = InMemoryTenantFactory::new();
        let tenant = factory.register("a1b2c");
        let client = factory.new_client("a1b2c", "api").await.unwrap();

        tenant.set_available(false);

        let err = client.list_nodes().await.unwrap_err();
        assert!(err.is_tenant_not_available());
        assert!(factory.new_client("a1b2c", "api").await.is_err());
    }

    #[tokio::test]
    async fn test_config_map_crud() {
        let tenant = InMemoryTenantCluster::new("a1b2c");
        let cm = ConfigMap::new("coredns-values", "kube-system");
        tenant.create_config_map(&cm).await.unwrap();
        assert!(tenant.create_config_map(&cm).await.unwrap_err().is_already_exists());

        tenant
            .update_config_map(&cm.clone().with_data("values", "x"))
            .await
            .unwrap();
        assert_eq!(tenant.config_maps().await[0].data.len(), 1);

        tenant.delete_config_map("kube-system", "coredns-values").await.unwrap();
        assert!(tenant
            .delete_config_map("kube-system", "coredns-values")
            .await
            .unwrap_err()
            .is_not_found());
    }
}

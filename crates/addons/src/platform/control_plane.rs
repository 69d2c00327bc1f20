//! Management cluster API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Error, Result};
use tokio::sync::RwLock;

use crate::kind::{Cluster, ClusterStatus, MachineDeployment, MachineDeploymentStatus, ObjectRef};
use crate::objects::{matches_selector, ConfigMap, InfrastructureObject, Labels, Namespace};

/// Reads and writes objects in the management cluster.
///
/// Missing objects are reported as [`Error::NotFound`], duplicate creates as
/// [`Error::AlreadyExists`] and an unreachable API as
/// [`Error::PlatformUnavailable`].
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Cluster>;

    async fn update_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: ClusterStatus,
    ) -> Result<()>;

    async fn get_machine_deployment(&self, namespace: &str, name: &str)
        -> Result<MachineDeployment>;

    async fn update_machine_deployment_status(
        &self,
        namespace: &str,
        name: &str,
        status: MachineDeploymentStatus,
    ) -> Result<()>;

    async fn get_infrastructure(&self, reference: &ObjectRef) -> Result<InfrastructureObject>;

    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn list_config_maps(&self, namespace: &str, selector: &Labels) -> Result<Vec<ConfigMap>>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Fails with [`Error::Conflict`] when `config_map` carries a
    /// `resource_version` other than the stored one.
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct State {
    clusters: BTreeMap<Key, Cluster>,
    machine_deployments: BTreeMap<Key, MachineDeployment>,
    infrastructure: BTreeMap<Key, InfrastructureObject>,
    namespaces: BTreeMap<String, Namespace>,
    config_maps: BTreeMap<Key, ConfigMap>,
}

/// In-memory management cluster.
#[derive(Debug)]
pub struct InMemoryControlPlane {
    state: RwLock<State>,
    available: AtomicBool,
    revision: AtomicU64,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
            revision: AtomicU64::new(0),
        }
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Toggle whether API calls succeed.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn insert_cluster(&self, cluster: Cluster) {
        let mut state = self.state.write().await;
        state
            .clusters
            .insert(key(&cluster.namespace, &cluster.id), cluster);
    }

    pub async fn insert_machine_deployment(&self, md: MachineDeployment) {
        let mut state = self.state.write().await;
        state
            .machine_deployments
            .insert(key(&md.namespace, &md.name), md);
    }

    pub async fn insert_infrastructure(&self, infra: InfrastructureObject) {
        let mut state = self.state.write().await;
        state
            .infrastructure
            .insert(key(&infra.namespace, &infra.name), infra);
    }

    pub async fn remove_infrastructure(&self, reference: &ObjectRef) {
        let mut state = self.state.write().await;
        state
            .infrastructure
            .remove(&key(&reference.namespace, &reference.name));
    }

    /// Every stored config map, ordered by namespace and name.
    pub async fn config_maps(&self) -> Vec<ConfigMap> {
        self.state.read().await.config_maps.values().cloned().collect()
    }

    pub async fn namespaces(&self) -> Vec<Namespace> {
        self.state.read().await.namespaces.values().cloned().collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::platform_unavailable("management API is not reachable"))
        }
    }

    fn next_revision(&self) -> Option<String> {
        let previous = self.revision.fetch_add(1, Ordering::SeqCst);
        Some(previous.saturating_add(1).to_string())
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Cluster> {
        self.check_available()?;
        self.state
            .read()
            .await
            .clusters
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| Error::not_found("Cluster", name))
    }

    async fn update_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: ClusterStatus,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .get_mut(&key(namespace, name))
            .ok_or_else(|| Error::not_found("Cluster", name))?;
        cluster.status = status;
        Ok(())
    }

    async fn get_machine_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<MachineDeployment> {
        self.check_available()?;
        self.state
            .read()
            .await
            .machine_deployments
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| Error::not_found("MachineDeployment", name))
    }

    async fn update_machine_deployment_status(
        &self,
        namespace: &str,
        name: &str,
        status: MachineDeploymentStatus,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let md = state
            .machine_deployments
            .get_mut(&key(namespace, name))
            .ok_or_else(|| Error::not_found("MachineDeployment", name))?;
        md.status = status;
        Ok(())
    }

    async fn get_infrastructure(&self, reference: &ObjectRef) -> Result<InfrastructureObject> {
        self.check_available()?;
        self.state
            .read()
            .await
            .infrastructure
            .get(&key(&reference.namespace, &reference.name))
            .cloned()
            .ok_or_else(|| Error::not_found(&reference.kind, &reference.name))
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.check_available()?;
        self.state
            .read()
            .await
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("Namespace", name))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.namespaces.contains_key(&namespace.name) {
            return Err(Error::already_exists("Namespace", &namespace.name));
        }
        let mut stored = namespace.clone();
        stored.resource_version = self.next_revision();
        state.namespaces.insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state
            .namespaces
            .remove(name)
            .ok_or_else(|| Error::not_found("Namespace", name))?;
        // Namespaced objects go with their namespace.
        state.config_maps.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn list_config_maps(&self, namespace: &str, selector: &Labels) -> Result<Vec<ConfigMap>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .config_maps
            .values()
            .filter(|cm| cm.namespace == namespace && matches_selector(&cm.labels, selector))
            .cloned()
            .collect())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.namespaces.contains_key(&config_map.namespace) {
            return Err(Error::not_found("Namespace", &config_map.namespace));
        }
        let k = key(&config_map.namespace, &config_map.name);
        if state.config_maps.contains_key(&k) {
            return Err(Error::already_exists("ConfigMap", &config_map.name));
        }
        let mut stored = config_map.clone();
        stored.resource_version = self.next_revision();
        state.config_maps.insert(k, stored);
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let stored = state
            .config_maps
            .get_mut(&key(&config_map.namespace, &config_map.name))
            .ok_or_else(|| Error::not_found("ConfigMap", &config_map.name))?;
        // A write carrying a revision must be based on the stored one.
        if config_map.resource_version.is_some()
            && config_map.resource_version != stored.resource_version
        {
            return Err(Error::conflict(
                "ConfigMap",
                &config_map.name,
                "object has been modified since it was read",
            ));
        }
        *stored = ConfigMap {
            resource_version: self.next_revision(),
            ..config_map.clone()
        };
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_available()?;
        self.state
            .write()
            .await
            .config_maps
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found("ConfigMap", name))
    }
}

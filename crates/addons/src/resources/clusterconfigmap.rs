//! Cluster values config map in the control plane.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Error, Result, WriteResultExt};
use keel_reconciler::{diff, CrudResource, Patch, ReconcileContext};
use tracing::debug;

use crate::config::OperatorConfig;
use crate::kind::Cluster;
use crate::label;
use crate::objects::{ConfigMap, Labels};
use crate::platform::ControlPlane;
use crate::provider::ValuesGenerator;
use crate::resources::to_yaml;

pub const NAME: &str = "clusterconfigmap";

/// Name of the values config map of a cluster.
pub fn config_map_name(cluster: &Cluster) -> String {
    format!("{}-cluster-values", cluster.id)
}

/// Keeps `<id>-cluster-values` in the cluster's control-plane namespace in
/// line with the provider's values generator.
pub struct ClusterConfigMap {
    control_plane: Arc<dyn ControlPlane>,
    config: OperatorConfig,
    values: ValuesGenerator,
}

impl ClusterConfigMap {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        config: OperatorConfig,
        values: ValuesGenerator,
    ) -> Result<Self> {
        if config.project_name.is_empty() {
            return Err(Error::invalid_config(format!(
                "{NAME}: project name must not be empty"
            )));
        }
        Ok(Self {
            control_plane,
            config,
            values,
        })
    }

    fn selector(&self, cluster: &Cluster) -> Labels {
        Labels::from([
            (label::CLUSTER.to_string(), cluster.id.clone()),
            (label::MANAGED_BY.to_string(), self.config.project_name.clone()),
        ])
    }
}

#[async_trait]
impl CrudResource<Cluster> for ClusterConfigMap {
    type State = Vec<ConfigMap>;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, _ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        debug!(object = %obj.id, "finding cluster config maps in control plane");
        let config_maps = self
            .control_plane
            .list_config_maps(&obj.id, &self.selector(obj))
            .await?;
        debug!(object = %obj.id, count = config_maps.len(), "found cluster config maps in control plane");
        Ok(config_maps)
    }

    async fn desired_state(&self, _ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        let values = (self.values)(obj, &self.config)?;
        let config_map = ConfigMap::new(config_map_name(obj), &obj.id)
            .with_label(label::CLUSTER, &obj.id)
            .with_label(label::MANAGED_BY, &self.config.project_name)
            .with_label(label::ORGANIZATION, &obj.organization)
            .with_label(label::SERVICE_TYPE, label::SERVICE_TYPE_MANAGED)
            .with_data("values", to_yaml(&values)?);
        Ok(vec![config_map])
    }

    async fn new_update_patch(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &Cluster,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::State>> {
        let mut changes = diff(current, desired)?;
        // Updates are based on the revision read, so concurrent writes
        // conflict instead of being overwritten.
        for config_map in &mut changes.update {
            config_map.resource_version = current
                .iter()
                .find(|c| c.name == config_map.name)
                .and_then(|c| c.resource_version.clone());
        }
        Ok(changes.into_patch())
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
        _ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "creating config map in control plane");
            self.control_plane
                .create_config_map(config_map)
                .await
                .ignore_already_exists()?;
            debug!(object = %obj.id, config_map = %config_map.name, "created config map in control plane");
        }
        Ok(())
    }

    async fn apply_update_change(
        &self,
        _ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "updating config map in control plane");
            self.control_plane.update_config_map(config_map).await?;
            debug!(object = %obj.id, config_map = %config_map.name, "updated config map in control plane");
        }
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        _ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        for config_map in change {
            debug!(object = %obj.id, config_map = %config_map.name, "deleting config map in control plane");
            self.control_plane
                .delete_config_map(&config_map.namespace, &config_map.name)
                .await
                .ignore_missing()?;
            debug!(object = %obj.id, config_map = %config_map.name, "deleted config map in control plane");
        }
        Ok(())
    }
}

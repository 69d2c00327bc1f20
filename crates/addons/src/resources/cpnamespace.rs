//! Control-plane namespace of a cluster.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Error, Result, ResultExt, WriteResultExt};
use keel_reconciler::{CrudResource, Patch, ReconcileContext};
use tracing::debug;

use crate::kind::Cluster;
use crate::label;
use crate::objects::Namespace;
use crate::platform::ControlPlane;

pub const NAME: &str = "cpnamespace";

/// Namespace named after the cluster id in the management cluster. Holds
/// the cluster's control-plane config maps.
///
/// The namespace is never updated in place.
pub struct ControlPlaneNamespace {
    control_plane: Arc<dyn ControlPlane>,
    project_name: String,
}

impl ControlPlaneNamespace {
    pub fn new(control_plane: Arc<dyn ControlPlane>, project_name: impl Into<String>) -> Result<Self> {
        let project_name = project_name.into();
        if project_name.is_empty() {
            return Err(Error::invalid_config(format!(
                "{NAME}: project name must not be empty"
            )));
        }
        Ok(Self {
            control_plane,
            project_name,
        })
    }
}

#[async_trait]
impl CrudResource<Cluster> for ControlPlaneNamespace {
    type State = Option<Namespace>;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, _ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        debug!(object = %obj.id, "finding namespace in control plane");
        let namespace = self.control_plane.get_namespace(&obj.id).await.ignore_not_found()?;
        if namespace.is_some() {
            debug!(object = %obj.id, "found namespace in control plane");
        } else {
            debug!(object = %obj.id, "did not find namespace in control plane");
        }
        Ok(namespace)
    }

    async fn desired_state(&self, _ctx: &mut ReconcileContext, obj: &Cluster) -> Result<Self::State> {
        Ok(Some(
            Namespace::new(&obj.id)
                .with_label(label::CLUSTER, &obj.id)
                .with_label(label::ORGANIZATION, &obj.organization)
                .with_label(label::MANAGED_BY, &self.project_name),
        ))
    }

    async fn new_update_patch(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &Cluster,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::State>> {
        let patch = match (current, desired) {
            (None, Some(desired)) => Patch::new().with_create(Some(desired.clone())),
            _ => Patch::new(),
        };
        Ok(patch)
    }

    async fn new_delete_patch(
        &self,
        _ctx: &mut ReconcileContext,
        _obj: &Cluster,
        current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Patch<Self::State>> {
        let patch = match current {
            Some(current) => Patch::new().with_delete(Some(current.clone())),
            None => Patch::new(),
        };
        Ok(patch)
    }

    async fn apply_create_change(
        &self,
        _ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        let Some(namespace) = change else {
            return Ok(());
        };
        debug!(object = %obj.id, namespace = %namespace.name, "creating namespace in control plane");
        self.control_plane
            .create_namespace(namespace)
            .await
            .ignore_already_exists()?;
        debug!(object = %obj.id, namespace = %namespace.name, "created namespace in control plane");
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        _ctx: &mut ReconcileContext,
        obj: &Cluster,
        change: &Self::State,
    ) -> Result<()> {
        let Some(namespace) = change else {
            debug!(object = %obj.id, "did not delete namespace in control plane");
            return Ok(());
        };
        debug!(object = %obj.id, namespace = %namespace.name, "deleting namespace in control plane");
        self.control_plane
            .delete_namespace(&namespace.name)
            .await
            .ignore_missing()?;
        debug!(object = %obj.id, namespace = %namespace.name, "deleted namespace in control plane");
        Ok(())
    }
}

//! Mirrors tenant worker counts into machine deployment status.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Result;
use keel_reconciler::{EnsureResource, ManagedObject, ReconcileContext};
use tracing::debug;

use crate::keys;
use crate::kind::{MachineDeployment, MachineDeploymentStatus};
use crate::platform::{ControlPlane, EventRecorder};

pub const NAME: &str = "machinedeploymentstatus";

pub const REASON_UPDATED: &str = "MachineDeploymentUpdated";

/// Copies the node counts of the deployment's pool into its status.
///
/// Needs the [`keys::WORKER_COUNT`] fact; without it the resource is
/// canceled. After a status write the pass is canceled, and a deleted
/// deployment keeps its finalizer so the next pass sees the new status.
pub struct MachineDeploymentStatusResource {
    control_plane: Arc<dyn ControlPlane>,
    events: Arc<dyn EventRecorder>,
}

impl MachineDeploymentStatusResource {
    pub fn new(control_plane: Arc<dyn ControlPlane>, events: Arc<dyn EventRecorder>) -> Self {
        Self {
            control_plane,
            events,
        }
    }

    async fn ensure(&self, ctx: &mut ReconcileContext, obj: &MachineDeployment) -> Result<()> {
        let md = self
            .control_plane
            .get_machine_deployment(&obj.namespace, &obj.name)
            .await?;

        let Some(count) = ctx.get(keys::WORKER_COUNT)?.map(|c| c.pool(md.pool_id())) else {
            debug!(object = %md.name, cluster = %md.cluster_id, "not getting worker nodes for tenant cluster");
            debug!(object = %md.name, "canceling resource");
            ctx.cancel_resource();
            return Ok(());
        };

        debug!(object = %md.name, "checking if status of machine deployment needs to be updated");
        let status = MachineDeploymentStatus {
            replicas: count.nodes,
            ready_replicas: count.ready,
        };
        if md.status == status {
            debug!(object = %md.name, "status of machine deployment does not need to be updated");
            return Ok(());
        }

        debug!(object = %md.name, "updating status of machine deployment");
        self.control_plane
            .update_machine_deployment_status(&md.namespace, &md.name, status)
            .await?;
        debug!(object = %md.name, "updated status of machine deployment");
        self.events.emit(
            &md.name,
            REASON_UPDATED,
            &format!(
                "updated status of machine deployment, replicas {} -> {}, ready {} -> {}",
                md.status.replicas, status.replicas, md.status.ready_replicas, status.ready_replicas
            ),
        );

        if md.is_deleted() {
            debug!(object = %md.name, "keeping finalizers");
            ctx.keep_finalizers();
        }

        debug!(object = %md.name, "canceling reconciliation");
        ctx.cancel_reconciliation();
        Ok(())
    }
}

#[async_trait]
impl EnsureResource<MachineDeployment> for MachineDeploymentStatusResource {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &MachineDeployment) -> Result<()> {
        self.ensure(ctx, obj).await
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &MachineDeployment) -> Result<()> {
        self.ensure(ctx, obj).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;

    use super::*;
    use crate::objects::Node;
    use crate::platform::{InMemoryControlPlane, InMemoryEventRecorder};
    use crate::resources::workercount::WorkerCount;

    fn pool() -> MachineDeployment {
        MachineDeployment::new("pool0", "org-acme", "a1b2c", "acme")
    }

    fn counted(nodes: &[Node]) -> ReconcileContext {
        let mut ctx = ReconcileContext::new();
        ctx.insert(keys::WORKER_COUNT, WorkerCount::from_nodes(nodes));
        ctx
    }

    async fn setup(
        md: MachineDeployment,
    ) -> (
        Arc<InMemoryControlPlane>,
        Arc<InMemoryEventRecorder>,
        MachineDeploymentStatusResource,
    ) {
        let cp = InMemoryControlPlane::new_arc();
        cp.insert_machine_deployment(md).await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let resource = MachineDeploymentStatusResource::new(cp.clone(), events.clone());
        (cp, events, resource)
    }

    #[tokio::test]
    async fn test_changed_counts_update_status() {
        let (cp, events, resource) = setup(pool()).await;
        let mut ctx = counted(&[
            Node::worker("w0", "pool0", true),
            Node::worker("w1", "pool0", false),
            Node::worker("w2", "pool1", true),
        ]);

        resource.ensure_created(&mut ctx, &pool()).await.unwrap();

        let md = cp.get_machine_deployment("org-acme", "pool0").await.unwrap();
        assert_eq!(md.status, MachineDeploymentStatus { replicas: 2, ready_replicas: 1 });
        assert!(ctx.signals().is_reconciliation_canceled());
        assert!(!ctx.signals().are_finalizers_kept());
        assert_eq!(events.with_reason(REASON_UPDATED).len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_counts_are_a_no_op() {
        let mut md = pool();
        md.status = MachineDeploymentStatus { replicas: 1, ready_replicas: 1 };
        let (_cp, events, resource) = setup(md.clone()).await;
        let mut ctx = counted(&[Node::worker("w0", "pool0", true)]);

        resource.ensure_created(&mut ctx, &md).await.unwrap();

        assert!(!ctx.signals().is_any_canceled());
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_deployment_keeps_finalizers_after_update() {
        let md = pool().deleted_at(Utc::now());
        let (_cp, _events, resource) = setup(md.clone()).await;
        let mut ctx = counted(&[Node::worker("w0", "pool0", true)]);

        resource.ensure_deleted(&mut ctx, &md).await.unwrap();

        assert!(ctx.signals().are_finalizers_kept());
        assert!(ctx.signals().is_reconciliation_canceled());
    }

    #[tokio::test]
    async fn test_missing_worker_count_cancels_resource() {
        let (_cp, events, resource) = setup(pool()).await;
        let mut ctx = ReconcileContext::new();

        resource.ensure_created(&mut ctx, &pool()).await.unwrap();

        assert!(ctx.signals().is_resource_canceled());
        assert!(!ctx.signals().is_reconciliation_canceled());
        assert!(events.events().is_empty());
    }
}

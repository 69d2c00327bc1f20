//! Marks a cluster ready once its infrastructure reports it created.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{Result, ResultExt};
use keel_reconciler::{EnsureResource, ReconcileContext};
use tracing::debug;

use crate::kind::{Cluster, ClusterStatus};
use crate::platform::{ControlPlane, EventRecorder};

pub const NAME: &str = "clusterstatus";

pub const REASON_UPDATED: &str = "ClusterStatusUpdated";

/// Sets `control_plane_initialized` and `infrastructure_ready` on the
/// cluster once the referenced infrastructure object carries the
/// `Created` condition.
///
/// A status write triggers a new pass, so the current one is canceled
/// right after it.
pub struct ClusterStatusResource {
    control_plane: Arc<dyn ControlPlane>,
    events: Arc<dyn EventRecorder>,
}

impl ClusterStatusResource {
    pub fn new(control_plane: Arc<dyn ControlPlane>, events: Arc<dyn EventRecorder>) -> Self {
        Self {
            control_plane,
            events,
        }
    }
}

#[async_trait]
impl EnsureResource<Cluster> for ClusterStatusResource {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &Cluster) -> Result<()> {
        // The observed object may be stale; decide on the latest status.
        debug!(object = %obj.id, "finding cluster");
        let cluster = self
            .control_plane
            .get_cluster(&obj.namespace, &obj.id)
            .await?;
        debug!(object = %obj.id, "found cluster");

        if cluster.status.is_ready() {
            return Ok(());
        }

        let Some(reference) = cluster.infrastructure_ref.as_ref().filter(|r| !r.is_empty()) else {
            debug!(object = %obj.id, "cluster has no infrastructure reference yet");
            return Ok(());
        };

        debug!(object = %obj.id, kind = %reference.kind, "finding infrastructure reference");
        let Some(infrastructure) = self
            .control_plane
            .get_infrastructure(reference)
            .await
            .ignore_not_found()?
        else {
            // The provider has not created it yet.
            debug!(object = %obj.id, kind = %reference.kind, "did not find infrastructure reference");
            return Ok(());
        };
        debug!(object = %obj.id, kind = %reference.kind, "found infrastructure reference");

        if !infrastructure.has_created_condition() {
            return Ok(());
        }

        debug!(object = %obj.id, "updating cluster status");
        self.control_plane
            .update_cluster_status(
                &cluster.namespace,
                &cluster.id,
                ClusterStatus {
                    control_plane_initialized: true,
                    infrastructure_ready: true,
                },
            )
            .await?;
        debug!(object = %obj.id, "updated cluster status");
        self.events.emit(
            &cluster.id,
            REASON_UPDATED,
            "control plane initialized and infrastructure ready",
        );

        debug!(object = %obj.id, "canceling reconciliation");
        ctx.cancel_reconciliation();
        Ok(())
    }

    async fn ensure_deleted(&self, _ctx: &mut ReconcileContext, _obj: &Cluster) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::kind::ObjectRef;
    use crate::objects::{InfrastructureObject, CONDITION_CREATED};
    use crate::platform::{InMemoryControlPlane, InMemoryEventRecorder};

    fn infra_ref() -> ObjectRef {
        ObjectRef::new("AWSCluster", "org-acme", "a1b2c")
    }

    fn infra(conditions: &[&str]) -> InfrastructureObject {
        InfrastructureObject {
            kind: "AWSCluster".to_string(),
            namespace: "org-acme".to_string(),
            name: "a1b2c".to_string(),
            conditions: conditions.iter().map(ToString::to_string).collect(),
        }
    }

    async fn setup(
        cluster: Cluster,
    ) -> (
        Arc<InMemoryControlPlane>,
        Arc<InMemoryEventRecorder>,
        ClusterStatusResource,
    ) {
        let cp = InMemoryControlPlane::new_arc();
        cp.insert_cluster(cluster).await;
        let events = Arc::new(InMemoryEventRecorder::new());
        let resource = ClusterStatusResource::new(cp.clone(), events.clone());
        (cp, events, resource)
    }

    #[tokio::test]
    async fn test_created_condition_marks_cluster_ready() {
        let cluster = Cluster::new("a1b2c", "org-acme", "acme").with_infrastructure_ref(infra_ref());
        let (cp, events, resource) = setup(cluster.clone()).await;
        cp.insert_infrastructure(infra(&[CONDITION_CREATED])).await;

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster).await.unwrap();

        let stored = cp.get_cluster("org-acme", "a1b2c").await.unwrap();
        assert!(stored.status.is_ready());
        assert!(ctx.signals().is_reconciliation_canceled());
        assert_eq!(events.with_reason(REASON_UPDATED).len(), 1);
    }

    #[tokio::test]
    async fn test_waits_for_created_condition() {
        let cluster = Cluster::new("a1b2c", "org-acme", "acme").with_infrastructure_ref(infra_ref());
        let (cp, events, resource) = setup(cluster.clone()).await;
        cp.insert_infrastructure(infra(&["Creating"])).await;

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster).await.unwrap();

        assert!(!cp.get_cluster("org-acme", "a1b2c").await.unwrap().status.is_ready());
        assert!(!ctx.signals().is_any_canceled());
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_ready_cluster_is_left_alone() {
        let mut cluster = Cluster::new("a1b2c", "org-acme", "acme");
        cluster.status = ClusterStatus {
            control_plane_initialized: true,
            infrastructure_ready: true,
        };
        let (_cp, events, resource) = setup(cluster.clone()).await;

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster).await.unwrap();

        assert!(!ctx.signals().is_any_canceled());
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_reference_is_not_an_error() {
        let cluster = Cluster::new("a1b2c", "org-acme", "acme");
        let (_cp, _events, resource) = setup(cluster.clone()).await;

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster).await.unwrap();
        assert!(!ctx.signals().is_any_canceled());
    }

    #[tokio::test]
    async fn test_missing_infrastructure_object_means_not_ready() {
        let cluster = Cluster::new("a1b2c", "org-acme", "acme").with_infrastructure_ref(infra_ref());
        let (cp, _events, resource) = setup(cluster.clone()).await;

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster).await.unwrap();
        assert!(!ctx.signals().is_any_canceled());
        assert!(!cp.get_cluster("org-acme", "a1b2c").await.unwrap().status.is_ready());
    }

    #[tokio::test]
    async fn test_api_outage_propagates() {
        let cluster = Cluster::new("a1b2c", "org-acme", "acme").with_infrastructure_ref(infra_ref());
        let (cp, _events, resource) = setup(cluster.clone()).await;
        cp.set_available(false);

        let mut ctx = ReconcileContext::new();
        let err = resource.ensure_created(&mut ctx, &cluster).await.unwrap_err();
        assert!(err.is_transient());
    }
}

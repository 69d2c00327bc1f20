//! Holds the finalizer while the infrastructure object still exists.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Result;
use keel_reconciler::{EnsureResource, ReconcileContext};
use tracing::debug;

use crate::kind::InfrastructureBacked;
use crate::platform::ControlPlane;

pub const NAME: &str = "keepforinfrarefs";

/// On deletion, keeps the object's finalizer until the provider has removed
/// the referenced infrastructure object.
///
/// An empty reference never blocks deletion. Runs ahead of every resource
/// that may cancel the pass, so the finalizer is kept even when a later
/// resource stops the deletion early.
pub struct KeepForInfraRefs {
    control_plane: Arc<dyn ControlPlane>,
}

impl KeepForInfraRefs {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }
}

#[async_trait]
impl<O: InfrastructureBacked> EnsureResource<O> for KeepForInfraRefs {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, _ctx: &mut ReconcileContext, _obj: &O) -> Result<()> {
        Ok(())
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let Some(reference) = obj.infrastructure_ref().filter(|r| !r.is_empty()) else {
            debug!(object = %obj.id(), "infrastructure reference misses name or namespace");
            return Ok(());
        };

        debug!(object = %obj.id(), kind = %reference.kind, "finding infrastructure reference");
        match self.control_plane.get_infrastructure(reference).await {
            Ok(_) => {
                debug!(object = %obj.id(), "found infrastructure reference");
                debug!(object = %obj.id(), "keeping finalizers");
                ctx.keep_finalizers();
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(object = %obj.id(), "did not find infrastructure reference");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

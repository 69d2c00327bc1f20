//! Entry point used by the event-dispatch layer.

use std::fmt;

use keel_core::{Error, Result};
use tracing::{debug, info};

use crate::object::ManagedObject;
use crate::router::Router;
use crate::version::VersionDescriptor;

/// What the dispatch layer should do after a reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No pipeline handles the object.
    Ignored,
    /// A create/update pass completed.
    Converged,
    /// A deletion pass completed and the finalizer may be removed.
    FinalizerRemovable,
    /// A deletion pass completed but the finalizer must stay.
    FinalizerKept,
}

/// Routes objects to their pipeline and runs the matching pass.
pub struct Controller<O: ManagedObject> {
    name: String,
    router: Router<O>,
}

impl<O: ManagedObject> Controller<O> {
    pub fn new(name: impl Into<String>, router: Router<O>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_config("controller name must not be empty"));
        }
        Ok(Self { name, router })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finalizer this controller places on the objects it manages.
    pub fn finalizer_name(&self) -> String {
        format!("keel.io/{}", self.name)
    }

    /// Descriptors of every routed generation, for audit and status.
    pub fn descriptors(&self) -> Vec<VersionDescriptor> {
        self.router
            .pipelines()
            .map(|pipeline| pipeline.describe().clone())
            .collect()
    }

    pub const fn router(&self) -> &Router<O> {
        &self.router
    }

    /// Reconcile one observed object.
    pub async fn reconcile(&self, obj: &O) -> Result<ReconcileOutcome> {
        let Some(pipeline) = self.router.select(obj)? else {
            debug!(controller = %self.name, object = %obj.id(), "Object not handled");
            return Ok(ReconcileOutcome::Ignored);
        };

        if !obj.is_deleted() {
            pipeline.ensure_created(obj).await?;
            return Ok(ReconcileOutcome::Converged);
        }

        let deletion = pipeline.ensure_deleted(obj).await?;
        if deletion.remove_finalizer() {
            info!(
                controller = %self.name,
                object = %obj.id(),
                finalizer = %self.finalizer_name(),
                "Finalizer can be removed"
            );
            Ok(ReconcileOutcome::FinalizerRemovable)
        } else {
            info!(
                controller = %self.name,
                object = %obj.id(),
                "Keeping finalizer"
            );
            Ok(ReconcileOutcome::FinalizerKept)
        }
    }
}

impl<O: ManagedObject> fmt::Debug for Controller<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("router", &self.router)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    struct Obj;

    impl ManagedObject for Obj {
        fn id(&self) -> &str {
            "obj"
        }
        fn owner(&self) -> &str {
            "acme"
        }
        fn version_label(&self) -> Option<&str> {
            Some("1.0.0")
        }
        fn deletion_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
            None
        }
    }

    #[test]
    fn test_finalizer_name() {
        let controller = Controller::<Obj>::new("cluster-operator", Router::new()).unwrap();
        assert_eq!(controller.finalizer_name(), "keel.io/cluster-operator");
        assert!(controller.descriptors().is_empty());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        assert!(Controller::<Obj>::new("  ", Router::new()).is_err());
    }

    #[tokio::test]
    async fn test_unrouted_object_is_ignored() {
        let controller = Controller::<Obj>::new("op", Router::new()).unwrap();
        assert_eq!(
            controller.reconcile(&Obj).await.unwrap(),
            ReconcileOutcome::Ignored
        );
    }
}

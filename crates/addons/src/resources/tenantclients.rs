//! Puts a tenant cluster client into the reconcile context.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Result;
use keel_reconciler::{EnsureResource, ReconcileContext};
use tracing::debug;

use crate::keys;
use crate::kind::TenantScoped;
use crate::platform::TenantClientFactory;

pub const NAME: &str = "tenantclients";

/// Connects to the tenant cluster of the reconciled object and stores the
/// client under [`keys::TENANT_CLIENT`].
///
/// A tenant API that is not up yet cancels this resource only. Later
/// resources find no client and skip their tenant work.
pub struct TenantClients {
    factory: Arc<dyn TenantClientFactory>,
}

impl TenantClients {
    pub fn new(factory: Arc<dyn TenantClientFactory>) -> Self {
        Self { factory }
    }

    async fn connect<O: TenantScoped>(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let Some(endpoint) = ctx.get(keys::TENANT_ENDPOINT)?.cloned() else {
            debug!(object = %obj.id(), "tenant endpoint not known yet");
            debug!(object = %obj.id(), "canceling resource");
            ctx.cancel_resource();
            return Ok(());
        };

        debug!(object = %obj.id(), endpoint = %endpoint, "finding tenant client");

        match self.factory.new_client(obj.cluster_id(), &endpoint).await {
            Ok(client) => {
                ctx.insert(keys::TENANT_CLIENT, client);
                debug!(object = %obj.id(), "found tenant client");
                Ok(())
            }
            Err(e) if e.is_tenant_not_available() => {
                debug!(object = %obj.id(), error = %e, "tenant cluster is not available yet");
                debug!(object = %obj.id(), "canceling resource");
                ctx.cancel_resource();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<O: TenantScoped> EnsureResource<O> for TenantClients {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        self.connect(ctx, obj).await
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        self.connect(ctx, obj).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::kind::Cluster;
    use crate::platform::InMemoryTenantFactory;

    fn cluster() -> Cluster {
        Cluster::new("a1b2c", "org-acme", "acme")
    }

    #[tokio::test]
    async fn test_stores_client_when_tenant_is_up() {
        let factory = Arc::new(InMemoryTenantFactory::new());
        factory.register("a1b2c");
        let resource = TenantClients::new(factory.clone());

        let mut ctx = ReconcileContext::new();
        ctx.insert(keys::TENANT_ENDPOINT, "api.a1b2c.k8s.example.com".to_string());
        resource.ensure_created(&mut ctx, &cluster()).await.unwrap();

        let client = ctx.get(keys::TENANT_CLIENT).unwrap().unwrap();
        assert_eq!(client.cluster_id(), "a1b2c");
        assert!(!ctx.signals().is_any_canceled());
        assert_eq!(factory.requested_endpoints(), vec!["api.a1b2c.k8s.example.com"]);
    }

    #[tokio::test]
    async fn test_unavailable_tenant_cancels_resource() {
        let factory = Arc::new(InMemoryTenantFactory::new());
        let resource = TenantClients::new(factory);

        let mut ctx = ReconcileContext::new();
        ctx.insert(keys::TENANT_ENDPOINT, "api".to_string());
        resource.ensure_deleted(&mut ctx, &cluster()).await.unwrap();

        assert!(!ctx.contains(keys::TENANT_CLIENT));
        assert!(ctx.signals().is_resource_canceled());
        assert!(!ctx.signals().is_reconciliation_canceled());
    }

    #[tokio::test]
    async fn test_missing_endpoint_cancels_resource() {
        let factory = Arc::new(InMemoryTenantFactory::new());
        factory.register("a1b2c");
        let resource = TenantClients::new(factory.clone());

        let mut ctx = ReconcileContext::new();
        resource.ensure_created(&mut ctx, &cluster()).await.unwrap();

        assert!(ctx.signals().is_resource_canceled());
        assert!(factory.requested_endpoints().is_empty());
    }
}

//! Counts the worker nodes of a tenant cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Result;
use keel_reconciler::{EnsureResource, ReconcileContext};
use serde::Serialize;
use tracing::debug;

use crate::keys;
use crate::kind::TenantScoped;
use crate::objects::Node;

pub const NAME: &str = "workercount";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCount {
    pub nodes: u32,
    pub ready: u32,
}

impl NodeCount {
    const fn add(&mut self, node: &Node) {
        self.nodes = self.nodes.saturating_add(1);
        if node.ready {
            self.ready = self.ready.saturating_add(1);
        }
    }
}

/// Worker node counts of a tenant cluster, in total and per machine pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerCount {
    pub total: NodeCount,
    pub pools: BTreeMap<String, NodeCount>,
}

impl WorkerCount {
    /// Count every node except the control plane.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        nodes
            .iter()
            .filter(|node| !node.is_master())
            .fold(Self::default(), |mut count, node| {
                count.total.add(node);
                if let Some(pool) = node.pool() {
                    count.pools.entry(pool.to_string()).or_default().add(node);
                }
                count
            })
    }

    /// Counts for one pool. Unknown pools have no nodes.
    pub fn pool(&self, id: &str) -> NodeCount {
        self.pools.get(id).copied().unwrap_or_default()
    }
}

/// Lists tenant nodes and stores a [`WorkerCount`] under
/// [`keys::WORKER_COUNT`].
#[derive(Debug, Default)]
pub struct WorkerCounter;

impl WorkerCounter {
    pub const fn new() -> Self {
        Self
    }

    async fn count<O: TenantScoped>(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        let Some(client) = ctx.get(keys::TENANT_CLIENT)?.map(Arc::clone) else {
            debug!(object = %obj.id(), "tenant client not available yet");
            debug!(object = %obj.id(), "canceling resource");
            ctx.cancel_resource();
            return Ok(());
        };

        debug!(object = %obj.id(), "finding tenant nodes");

        let nodes = match client.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) if e.is_tenant_not_available() => {
                debug!(object = %obj.id(), error = %e, "tenant cluster is not available yet");
                debug!(object = %obj.id(), "canceling resource");
                ctx.cancel_resource();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let count = WorkerCount::from_nodes(&nodes);
        debug!(
            object = %obj.id(),
            nodes = count.total.nodes,
            ready = count.total.ready,
            "found tenant nodes"
        );
        ctx.insert(keys::WORKER_COUNT, count);
        Ok(())
    }
}

#[async_trait]
impl<O: TenantScoped> EnsureResource<O> for WorkerCounter {
    fn name(&self) -> &str {
        NAME
    }

    async fn ensure_created(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        self.count(ctx, obj).await
    }

    async fn ensure_deleted(&self, ctx: &mut ReconcileContext, obj: &O) -> Result<()> {
        self.count(ctx, obj).await
    }
}

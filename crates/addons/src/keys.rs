//! Context keys shared between the addon resources.

use std::sync::Arc;

use keel_reconciler::ContextKey;

use crate::platform::TenantClient;
use crate::resources::workercount::WorkerCount;

/// API endpoint of the tenant cluster, seeded by the pipeline's context
/// initializer.
pub const TENANT_ENDPOINT: ContextKey<String> = ContextKey::new("tenant-endpoint");

/// Client for the tenant cluster, set by `tenantclients`.
pub const TENANT_CLIENT: ContextKey<Arc<dyn TenantClient>> = ContextKey::new("tenant-client");

/// Worker node counts, set by `workercount`.
pub const WORKER_COUNT: ContextKey<WorkerCount> = ContextKey::new("worker-count");

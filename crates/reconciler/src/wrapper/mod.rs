//! Cross-cutting decorators applied uniformly to every resource of a
//! pipeline.

pub mod metrics;
pub mod retry;

use std::sync::Arc;

pub use metrics::{
    InMemoryRecorder, InvocationRecord, MetricsRecorder, Operation, Outcome, TracingRecorder,
};
pub use retry::RetryPolicy;

use crate::object::ManagedObject;
use crate::resource::Resource;

/// Wrap every resource with retry (innermost) and instrumentation
/// (outermost).
///
/// Instrumentation therefore measures a whole retried call, including the
/// backoff sleeps, as one record.
pub fn wrap<O: ManagedObject>(
    resources: Vec<Resource<O>>,
    retry: &RetryPolicy,
    recorder: Arc<dyn MetricsRecorder>,
) -> Vec<Resource<O>> {
    resources
        .into_iter()
        .map(|resource| {
            resource
                .with_retry(retry.clone())
                .with_metrics(Arc::clone(&recorder))
        })
        .collect()
}

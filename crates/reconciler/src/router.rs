//! Selects the pipeline generation that governs an object.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use keel_core::{Error, Result};
use tracing::debug;

use crate::object::ManagedObject;
use crate::pipeline::Pipeline;
use crate::version::{validate_descriptors, ReleaseVersion, VersionDescriptor};

/// Decides whether a pipeline handles an object.
pub type RoutePredicate<O> = Arc<dyn Fn(&O) -> bool + Send + Sync>;

struct Route<O: ManagedObject> {
    predicate: RoutePredicate<O>,
    pipeline: Arc<Pipeline<O>>,
}

/// Maps predicates to pipelines.
///
/// Several generations may be registered side by side so that objects keep
/// the pipeline matching their version label until an external upgrade
/// changes it. The router never touches the label itself.
pub struct Router<O: ManagedObject> {
    routes: Vec<Route<O>>,
}

impl<O: ManagedObject> Default for Router<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ManagedObject> Router<O> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a pipeline under an arbitrary predicate.
    #[must_use]
    pub fn route<F>(mut self, predicate: F, pipeline: Arc<Pipeline<O>>) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.routes.push(Route {
            predicate: Arc::new(predicate),
            pipeline,
        });
        self
    }

    /// Build a router keyed on the object's version label.
    ///
    /// Each pipeline handles objects whose label parses to its descriptor
    /// version, so `v2`, `2.0` and `2.0.0` all select the same generation.
    /// Descriptors are validated as a set, so a repeated or decreasing
    /// version for the same provider is rejected here.
    pub fn by_version(pipelines: impl IntoIterator<Item = Arc<Pipeline<O>>>) -> Result<Self> {
        let pipelines: Vec<Arc<Pipeline<O>>> = pipelines.into_iter().collect();
        let descriptors: Vec<VersionDescriptor> =
            pipelines.iter().map(|p| p.describe().clone()).collect();
        validate_descriptors(&descriptors)?;

        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let version = pipeline.describe().parsed_version()?;
            if !seen.insert(version) {
                return Err(Error::invalid_version(
                    &pipeline.describe().version,
                    "registered twice in one router",
                ));
            }
            routes.push((version, pipeline));
        }

        Ok(routes
            .into_iter()
            .fold(Self::new(), |router, (version, pipeline)| {
                router.route(
                    move |obj: &O| label_version(obj) == Some(version),
                    pipeline,
                )
            }))
    }

    /// The pipeline for `obj`.
    ///
    /// `Ok(None)` when no predicate matches; the caller ignores such objects.
    /// More than one match is an [`Error::AmbiguousRoute`].
    pub fn select(&self, obj: &O) -> Result<Option<Arc<Pipeline<O>>>> {
        let mut matches = self.routes.iter().filter(|route| (route.predicate)(obj));

        match (matches.next(), matches.count()) {
            (None, _) => {
                debug!(object = %obj.id(), label = ?obj.version_label(), "No pipeline handles object");
                Ok(None)
            }
            (Some(route), 0) => Ok(Some(Arc::clone(&route.pipeline))),
            (Some(_), rest) => Err(Error::ambiguous_route(obj.id(), rest.saturating_add(1))),
        }
    }

    /// Every registered pipeline, in registration order.
    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<Pipeline<O>>> {
        self.routes.iter().map(|route| &route.pipeline)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Parsed version label. A label that does not parse matches no generation.
fn label_version<O: ManagedObject>(obj: &O) -> Option<ReleaseVersion> {
    obj.version_label()
        .and_then(|label| label.parse::<ReleaseVersion>().ok())
}

impl<O: ManagedObject> fmt::Debug for Router<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: Vec<&str> = self
            .pipelines()
            .map(|p| p.describe().version.as_str())
            .collect();
        f.debug_struct("Router").field("versions", &versions).finish()
    }
}

//! The object under reconciliation.

use chrono::{DateTime, Utc};

/// An object whose addons are converged by a pipeline, e.g. a cluster or a
/// machine pool.
///
/// The engine only reads it. Status writes go through the platform
/// collaborators of the resources that are allowed to make them.
pub trait ManagedObject: Send + Sync + 'static {
    /// Unique identifier of the object.
    fn id(&self) -> &str;

    /// Owning organization.
    fn owner(&self) -> &str;

    /// Declared operator version label, used to route the object to a
    /// pipeline generation.
    fn version_label(&self) -> Option<&str>;

    /// Deletion marker. `None` while the object is active.
    fn deletion_timestamp(&self) -> Option<DateTime<Utc>>;

    /// Whether the object is pending deletion.
    fn is_deleted(&self) -> bool {
        self.deletion_timestamp().is_some()
    }
}

//! Platform APIs the addon resources talk to.
//!
//! Every API sits behind a trait so resources can be exercised against the
//! in-memory implementations here.

pub mod control_plane;
pub mod events;
pub mod tenant;

pub use control_plane::{ControlPlane, InMemoryControlPlane};
pub use events::{Event, EventRecorder, InMemoryEventRecorder, TracingEventRecorder};
pub use tenant::{InMemoryTenantCluster, InMemoryTenantFactory, TenantClient, TenantClientFactory};

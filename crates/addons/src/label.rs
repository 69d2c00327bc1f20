//! Well-known label keys and values.

/// Cluster id an object belongs to.
pub const CLUSTER: &str = "keel.io/cluster";

/// Operator that owns an object.
pub const MANAGED_BY: &str = "keel.io/managed-by";

/// Owning organization.
pub const ORGANIZATION: &str = "keel.io/organization";

/// Service type of a managed object.
pub const SERVICE_TYPE: &str = "keel.io/service-type";

/// [`SERVICE_TYPE`] value of objects the operator manages.
pub const SERVICE_TYPE_MANAGED: &str = "managed";

/// Operator version a cluster or machine pool is governed by.
pub const OPERATOR_VERSION: &str = "keel.io/operator-version";

/// Machine pool a worker node or machine deployment belongs to.
pub const MACHINE_DEPLOYMENT: &str = "keel.io/machine-deployment";

/// Role label carried by control-plane nodes.
pub const MASTER_ROLE: &str = "node-role.kubernetes.io/master";

//! Error taxonomy shared by the engine and every resource.
//!
//! Errors fall into four classes and each variant belongs to exactly one:
//!
//! - **Transient**: the platform or a tenant cluster is temporarily
//!   unreachable. Retried by the retry wrapper.
//! - **Not found**: absence of an optional dependent object. Resources
//!   translate it into an empty current state.
//! - **Permanent**: malformed input or configuration. Never retried.
//! - **Type mismatch**: a resource received a state value of an unexpected
//!   shape. Always a programming error.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for keel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Transient
    #[error("tenant cluster '{cluster_id}' is not available yet: {reason}")]
    TenantNotAvailable { cluster_id: String, reason: String },

    #[error("platform API unavailable: {reason}")]
    PlatformUnavailable { reason: String },

    #[error("conflict writing {kind} '{name}': {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    // Not found / already exists
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    // Permanent
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("duplicate name '{name}' in {side} state")]
    DuplicateName { name: String, side: String },

    #[error("object '{object}' matched {count} pipelines")]
    AmbiguousRoute { object: String, count: usize },

    #[error("resource '{resource}' failed: {reason}")]
    ResourceFailed { resource: String, reason: String },

    #[error("failed to parse {format}: {reason}")]
    ParseFailed { format: String, reason: String },

    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    // Type mismatch
    #[error("wrong type: expected '{expected}', got '{actual}'")]
    WrongType { expected: String, actual: String },
}

impl Error {
    /// Create a tenant-not-available error.
    pub fn tenant_not_available(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TenantNotAvailable {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a platform-unavailable error.
    pub fn platform_unavailable(reason: impl Into<String>) -> Self {
        Self::PlatformUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a write conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid version error.
    pub fn invalid_version(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate name error.
    pub fn duplicate_name(name: impl Into<String>, side: impl Into<String>) -> Self {
        Self::DuplicateName {
            name: name.into(),
            side: side.into(),
        }
    }

    /// Create an ambiguous route error.
    pub fn ambiguous_route(object: impl Into<String>, count: usize) -> Self {
        Self::AmbiguousRoute {
            object: object.into(),
            count,
        }
    }

    /// Create a resource failed error.
    pub fn resource_failed(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceFailed {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_failed(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            format: format.into(),
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a wrong type error.
    pub fn wrong_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::WrongType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the retry wrapper may retry this error.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TenantNotAvailable { .. } | Self::PlatformUnavailable { .. } | Self::Conflict { .. }
        )
    }

    /// Whether this error reports a missing object.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error reports an object that already exists.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether a tenant cluster could not be reached yet.
    pub const fn is_tenant_not_available(&self) -> bool {
        matches!(self, Self::TenantNotAvailable { .. })
    }

    /// Whether this error is a type mismatch between engine and resource.
    pub const fn is_wrong_type(&self) -> bool {
        matches!(self, Self::WrongType { .. })
    }
}

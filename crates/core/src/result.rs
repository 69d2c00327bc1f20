//! Result type definition and extension traits.
//!
//! Provides combinators for the signal-style errors resources deal with all
//! the time, so `NotFound` and `AlreadyExists` never need an explicit match.

use crate::error::Error;

/// The standard Result type for keel operations.
///
/// # Examples
///
/// ```ignore
/// // A missing namespace is an empty current state, not an error.
/// let current = control_plane.get_namespace(&name).await.ignore_not_found()?;
///
/// // Creating something that is already there is a successful create.
/// tenant.create_config_map(cm).await.ignore_already_exists()?;
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing inspection and signal combinators for Results.
pub trait ResultExt<T> {
    /// Inspect the error without consuming the Result.
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;

    /// Translate `Error::NotFound` into `Ok(None)`.
    fn ignore_not_found(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }

    fn ignore_not_found(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Combinators for unit results of write calls.
pub trait WriteResultExt {
    /// Treat `Error::AlreadyExists` as success.
    fn ignore_already_exists(self) -> Result<()>;

    /// Treat `Error::NotFound` as success.
    fn ignore_missing(self) -> Result<()>;
}

impl WriteResultExt for Result<()> {
    fn ignore_already_exists(self) -> Result<()> {
        match self {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other,
        }
    }

    fn ignore_missing(self) -> Result<()> {
        match self {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

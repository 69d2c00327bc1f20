//! Version descriptors identifying pipeline generations.
//!
//! Every pipeline carries a [`VersionDescriptor`]. The router matches it
//! against an object's operator-version label, and the controller reports it
//! for audit. It never drives business logic.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use keel_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of a changelog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
    Fixed,
    Deprecated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Fixed => "fixed",
            Self::Deprecated => "deprecated",
        };
        f.write_str(label)
    }
}

/// A managed component and the version a pipeline generation installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,
}

impl Component {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One changelog line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelog {
    pub component: String,
    pub kind: ChangeKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

impl Changelog {
    pub fn new(
        component: impl Into<String>,
        kind: ChangeKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            kind,
            description: description.into(),
            urls: Vec::new(),
        }
    }

    /// Attach a reference link.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }
}

/// Immutable metadata of one pipeline generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub name: String,
    pub provider: String,
    pub version: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub changelogs: Vec<Changelog>,
}

impl VersionDescriptor {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            version: version.into(),
            components: Vec::new(),
            changelogs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn with_changelog(mut self, changelog: Changelog) -> Self {
        self.changelogs.push(changelog);
        self
    }

    /// Parse the version string.
    pub fn parsed_version(&self) -> Result<ReleaseVersion> {
        self.version.parse()
    }

    /// Version of the named component, if this generation ships it.
    pub fn component_version(&self, name: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.version.as_str())
    }

    /// Check the descriptor is complete and its version parses.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_version(&self.version, "descriptor name must not be empty"));
        }
        if self.provider.is_empty() {
            return Err(Error::invalid_version(&self.version, "provider must not be empty"));
        }
        if let Some(component) = self.components.iter().find(|c| c.name.is_empty()) {
            return Err(Error::invalid_version(
                &self.version,
                format!("component with version '{}' has no name", component.version),
            ));
        }
        if let Some(entry) = self
            .changelogs
            .iter()
            .find(|c| c.component.is_empty() || c.description.is_empty())
        {
            return Err(Error::invalid_version(
                &self.version,
                format!("incomplete {} changelog entry", entry.kind),
            ));
        }
        self.parsed_version().map(|_| ())
    }
}

/// A dotted numeric release version such as `1.2.3`.
///
/// Missing minor or patch parts read as zero, so `"2"`, `"2.0"` and `"2.0.0"`
/// compare equal. A leading `v` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for ReleaseVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(Error::invalid_version(s, "version is empty"));
        }

        let parts = digits
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|e| Error::invalid_version(s, format!("'{part}' is not a number: {e}")))
            })
            .collect::<Result<Vec<u64>>>()?;

        match parts.as_slice() {
            [major] => Ok(Self {
                major: *major,
                minor: 0,
                patch: 0,
            }),
            [major, minor] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: 0,
            }),
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(Error::invalid_version(s, "expected at most three parts")),
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Validate a registered set of descriptors.
///
/// Each descriptor must be valid on its own, and within one provider the
/// versions must strictly increase in registration order.
pub fn validate_descriptors(descriptors: &[VersionDescriptor]) -> Result<()> {
    let mut latest: HashMap<&str, (ReleaseVersion, &str)> = HashMap::new();

    for descriptor in descriptors {
        descriptor.validate()?;
        let version = descriptor.parsed_version()?;

        if let Some((previous, previous_raw)) = latest.get(descriptor.provider.as_str()) {
            match version.cmp(previous) {
                Ordering::Greater => {}
                Ordering::Equal => {
                    return Err(Error::invalid_version(
                        &descriptor.version,
                        format!(
                            "duplicates version '{previous_raw}' for provider '{}'",
                            descriptor.provider
                        ),
                    ));
                }
                Ordering::Less => {
                    return Err(Error::invalid_version(
                        &descriptor.version,
                        format!(
                            "must be newer than '{previous_raw}' for provider '{}'",
                            descriptor.provider
                        ),
                    ));
                }
            }
        }
        latest.insert(descriptor.provider.as_str(), (version, descriptor.version.as_str()));
    }

    Ok(())
}

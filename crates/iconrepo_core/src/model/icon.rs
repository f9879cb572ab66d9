//! Icon and iconfile records.
//!
//! # Responsibility
//! - Carry icon identity, last-writer identity, tags and iconfile keys.
//! - Reject names, formats and sizes that cannot be used as path components.
//!
//! # Invariants
//! - Validated values never contain `/`, `\` or ASCII control characters,
//!   never start with `.` and never start or end with whitespace, so a
//!   derived content-store path cannot escape its `<format>/<size>` dir and
//!   commit messages stay on one line.
//! - `IconDescriptor::iconfiles` keeps insertion order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

static PATH_COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^./\\\s[:cntrl:]](?:[^/\\[:cntrl:]]*[^/\\\s[:cntrl:]])?$")
        .expect("valid path component regex")
});

/// Validation failure for values that become content-store path components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IconValidationError {
    #[error("invalid icon name: `{0}`")]
    InvalidName(String),
    #[error("invalid iconfile format: `{0}`")]
    InvalidFormat(String),
    #[error("invalid iconfile size: `{0}`")]
    InvalidSize(String),
}

/// Key of one iconfile within its icon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IconfileDescriptor {
    /// File format, e.g. `svg` or `png`.
    pub format: String,
    /// Size label, e.g. `24px` or `great`.
    pub size: String,
}

impl IconfileDescriptor {
    pub fn new(format: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            size: size.into(),
        }
    }

    /// Checks that both components are safe as path segments.
    pub fn validate(&self) -> Result<(), IconValidationError> {
        if !is_path_component(&self.format) {
            return Err(IconValidationError::InvalidFormat(self.format.clone()));
        }
        if !is_path_component(&self.size) {
            return Err(IconValidationError::InvalidSize(self.size.clone()));
        }
        Ok(())
    }
}

impl Display for IconfileDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.format, self.size)
    }
}

/// One binary rendition of an icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iconfile {
    pub format: String,
    pub size: String,
    pub content: Vec<u8>,
}

impl Iconfile {
    pub fn new(format: impl Into<String>, size: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            format: format.into(),
            size: size.into(),
            content,
        }
    }

    /// Returns the `(format, size)` key of this iconfile.
    pub fn descriptor(&self) -> IconfileDescriptor {
        IconfileDescriptor::new(self.format.as_str(), self.size.as_str())
    }
}

/// Icon metadata without iconfile contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconDescriptor {
    pub name: String,
    /// Identity of the last writer.
    pub modified_by: String,
    /// Tags sorted by text.
    pub tags: Vec<String>,
    /// Iconfile keys in insertion order.
    pub iconfiles: Vec<IconfileDescriptor>,
}

impl IconDescriptor {
    /// Returns whether the icon has an iconfile with the given key.
    pub fn has_iconfile(&self, descriptor: &IconfileDescriptor) -> bool {
        self.iconfiles.iter().any(|item| item == descriptor)
    }
}

/// Checks that an icon name is safe as a file-name stem.
pub fn validate_icon_name(name: &str) -> Result<(), IconValidationError> {
    if is_path_component(name) {
        Ok(())
    } else {
        Err(IconValidationError::InvalidName(name.to_string()))
    }
}

fn is_path_component(value: &str) -> bool {
    PATH_COMPONENT_RE.is_match(value)
}

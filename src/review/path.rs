//! Path resolution into nested JSON mappings
//!
//! Lookups distinguish three outcomes so callers never have to compare
//! against a placeholder value:
//! - the key chain exists and ends at a value
//! - the key chain exists and ends at an explicit `null`
//! - some key along the chain is missing

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// Outcome of resolving a [`KeyPath`] against a JSON document
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// Every key was found and the final value is not null
    Present(&'a Value),
    /// Every key was found and the final value is an explicit `null`
    PresentNull,
    /// A key along the path is missing
    Absent,
}

impl<'a> Resolved<'a> {
    /// The resolved value, if one is present and non-null
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Resolved::Present(v) => Some(v),
            Resolved::PresentNull | Resolved::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }
}

impl fmt::Display for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Present(v) => write!(f, "{}", v),
            Resolved::PresentNull => write!(f, "null"),
            Resolved::Absent => write!(f, "<absent>"),
        }
    }
}

/// Errors raised while resolving a path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot index {found} with key '{segment}'")]
    NotAMapping {
        segment: String,
        found: &'static str,
    },

    #[error("invalid key path '{0}': empty segment")]
    EmptySegment(String),
}

/// Dot-separated path of mapping keys, e.g. `options.kind`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dot-separated path. The empty string addresses the root.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
            });
        }

        let segments = path
            .split('.')
            .map(|s| {
                if s.is_empty() {
                    Err(PathError::EmptySegment(path.to_string()))
                } else {
                    Ok(s.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Build a path from already-split segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve this path against `root`
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<Resolved<'a>, PathError> {
        resolve(root, self.segments.as_slice())
    }
}

impl FromStr for KeyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Resolve `path` against `root` one key at a time.
///
/// Stops at the first missing key and returns [`Resolved::Absent`]. An
/// explicit `null` in an intermediate position also yields `Absent`, since
/// Kubernetes writes unset sub-objects (e.g. `options` on CONNECT) as null.
/// Indexing into any other non-mapping value is a [`PathError::NotAMapping`].
pub fn resolve<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Result<Resolved<'a>, PathError> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(match root {
            Value::Null => Resolved::PresentNull,
            other => Resolved::Present(other),
        });
    };

    let map = match root {
        Value::Object(map) => map,
        Value::Null => return Ok(Resolved::Absent),
        other => {
            return Err(PathError::NotAMapping {
                segment: head.as_ref().to_string(),
                found: json_type_name(other),
            });
        }
    };

    match map.get(head.as_ref()) {
        Some(next) => resolve(next, rest),
        None => Ok(Resolved::Absent),
    }
}

/// Human-readable name of a JSON value's type
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

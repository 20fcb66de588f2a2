//! Dotted path addressing into a JSON value tree.
//!
//! A path such as `character.inventory.2.name` is split on `.` into segments.
//! Segments that parse as a decimal integer address array elements, every
//! other segment addresses an object key:
//!
//! ```text
//! "character.inventory.2.name"
//!    Key("character") → Key("inventory") → Index(2) → Key("name")
//!    └──────────── navigation ──────────────────┘     └ target ┘
//! ```
//!
//! Resolution never mutates; it only hands back a reference into the tree.

use std::fmt;

use serde_json::Value;

/// Why a path could not be resolved (or applied) against a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("path is empty")]
    InvalidPath,
    #[error("segment `{segment}` expects {expected}, found {found}")]
    TypeMismatch {
        segment: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("key `{0}` not found")]
    KeyNotFound(String),
}

impl MutationError {
    /// Stable name of the failure kind, used in logs and rejection notices.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::InvalidPath => "InvalidPath",
            MutationError::TypeMismatch { .. } => "TypeMismatch",
            MutationError::IndexOutOfRange { .. } => "IndexOutOfRange",
            MutationError::KeyNotFound(_) => "KeyNotFound",
        }
    }
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Array element. Kept signed so `-1` is reported as out of range
    /// rather than silently treated as an object key.
    Index(i64),
    /// Object key.
    Key(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(index) => Segment::Index(index),
            Err(_) => Segment::Key(raw.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(k) => f.write_str(k),
        }
    }
}

/// A non-empty sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Split a dotted path string into segments.
    pub fn parse(raw: &str) -> Result<Self, MutationError> {
        if raw.is_empty() {
            return Err(MutationError::InvalidPath);
        }
        Ok(Self {
            segments: raw.split('.').map(Segment::parse).collect(),
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Navigation steps: every segment but the last.
    pub fn parents(&self) -> &[Segment] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The mutation target.
    pub fn target(&self) -> &Segment {
        // Non-empty by construction.
        &self.segments[self.segments.len() - 1]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// JSON type name used in mismatch reports.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Bounds-check a signed index against an array length.
pub(crate) fn checked_index(index: i64, len: usize) -> Result<usize, MutationError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(MutationError::IndexOutOfRange { index, len })
}

pub(crate) fn mismatch(segment: &Segment, found: &Value) -> MutationError {
    let expected = match segment {
        Segment::Index(_) => "array",
        Segment::Key(_) => "object",
    };
    MutationError::TypeMismatch {
        segment: segment.to_string(),
        expected,
        found: type_name(found),
    }
}

fn step<'a>(current: &'a Value, segment: &Segment) -> Result<&'a Value, MutationError> {
    match (segment, current) {
        (Segment::Index(index), Value::Array(items)) => {
            let i = checked_index(*index, items.len())?;
            Ok(&items[i])
        }
        (Segment::Key(key), Value::Object(map)) => map
            .get(key)
            .ok_or_else(|| MutationError::KeyNotFound(key.clone())),
        (segment, other) => Err(mismatch(segment, other)),
    }
}

fn step_mut<'a>(current: &'a mut Value, segment: &Segment) -> Result<&'a mut Value, MutationError> {
    match (segment, current) {
        (Segment::Index(index), Value::Array(items)) => {
            let i = checked_index(*index, items.len())?;
            Ok(&mut items[i])
        }
        (Segment::Key(key), Value::Object(map)) => map
            .get_mut(key)
            .ok_or_else(|| MutationError::KeyNotFound(key.clone())),
        (segment, other) => Err(mismatch(segment, other)),
    }
}

/// Navigate all but the last segment, returning the container that holds
/// the mutation target.
pub fn resolve_parent<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Value, MutationError> {
    let mut current = root;
    for segment in path.parents() {
        current = step_mut(current, segment)?;
    }
    Ok(current)
}

/// Navigate every segment, returning the addressed value.
pub fn resolve<'a>(root: &'a Value, path: &Path) -> Result<&'a Value, MutationError> {
    path.segments().iter().try_fold(root, step)
}

//! Single-field mutation of a JSON document.
//!
//! Arrays are only ever overwritten at existing indices; objects may gain
//! new keys. A rejected update leaves the document exactly as it was, since
//! every check runs before the one write.

use serde_json::Value;

use crate::path::{self, MutationError, Path, Segment};

/// A (path, value) change request.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub path: Path,
    pub value: Value,
}

impl Update {
    pub fn new(path: Path, value: Value) -> Self {
        Self { path, value }
    }

    /// Parse the dotted path and pair it with `value`.
    pub fn parse(path: &str, value: Value) -> Result<Self, MutationError> {
        Ok(Self::new(Path::parse(path)?, value))
    }
}

/// An owned JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self::new)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.root)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Read the value at `path`.
    pub fn get(&self, path: &Path) -> Result<&Value, MutationError> {
        path::resolve(&self.root, path)
    }

    /// Apply `update` in place. On error nothing has been written.
    pub fn apply(&mut self, update: &Update) -> Result<(), MutationError> {
        let parent = path::resolve_parent(&mut self.root, &update.path)?;
        let target = update.path.target();
        match (target, parent) {
            (Segment::Index(index), Value::Array(items)) => {
                let i = path::checked_index(*index, items.len())?;
                items[i] = update.value.clone();
            }
            (Segment::Key(key), Value::Object(map)) => {
                map.insert(key.clone(), update.value.clone());
            }
            (segment, other) => return Err(path::mismatch(segment, other)),
        }
        Ok(())
    }
}

impl From<Value> for Document {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// Apply `update` to an owned document, handing the untouched document back
/// alongside the error on rejection.
pub fn apply(mut document: Document, update: &Update) -> Result<Document, (Document, MutationError)> {
    match document.apply(update) {
        Ok(()) => Ok(document),
        Err(e) => Err((document, e)),
    }
}

//! Hierarchical document store in the shape of a realtime database:
//! JSON subtrees addressed by slash-separated paths.

pub mod firebase;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid document path: {0}")]
    InvalidPath(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Path into the document tree. Always has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Rejects empty paths and segments a realtime database would refuse.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.segments.is_empty() {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        }
        for segment in &self.segments {
            if !is_valid_segment(segment) {
                return Err(StoreError::InvalidPath(format!("{} (segment {:?})", self, segment)));
            }
        }
        Ok(())
    }

    /// Every strict ancestor, shortest first, rendered as path strings.
    pub fn ancestors(&self) -> Vec<String> {
        (1..self.segments.len())
            .map(|n| self.segments[..n].join("/"))
            .collect()
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 768
        && !segment
            .chars()
            .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_control())
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Subtree at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Replaces the subtree at `path`. Writing `null` deletes it.
    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError>;

    /// Sets each child of `path` named in `children`, leaving other children intact.
    async fn update(&self, path: &DocPath, children: Map<String, Value>) -> Result<(), StoreError>;

    /// Removes the subtree at `path`. Absent paths are not an error.
    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Drops nulls and empty objects the way the realtime database does on write.
/// Returns `None` when nothing is left.
pub(crate) fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

pub(crate) fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, segment| node.get(segment.as_str()))
}

/// Writes `value` at `segments`, creating intermediate objects. `None` removes.
pub(crate) fn set_at(root: &mut Value, segments: &[String], value: Option<Value>) {
    let Some(value) = value else {
        remove_at(root, segments);
        return;
    };
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new())),
            _ => unreachable!("node was just made an object"),
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), value);
    }
}

/// Removes the subtree at `segments` and prunes parents left empty.
pub(crate) fn remove_at(root: &mut Value, segments: &[String]) {
    fn remove(node: &mut Value, segments: &[String]) -> bool {
        let Value::Object(map) = node else {
            return false;
        };
        match segments {
            [] => false,
            [last] => map.remove(last).is_some(),
            [first, rest @ ..] => {
                let Some(child) = map.get_mut(first) else {
                    return false;
                };
                let removed = remove(child, rest);
                if matches!(child, Value::Object(m) if m.is_empty()) {
                    map.remove(first);
                }
                removed
            }
        }
    }
    remove(root, segments);
}

/// Flattens a normalized subtree into `(path, leaf)` pairs. Arrays and scalars are leaves.
pub(crate) fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten(&format!("{}/{}", prefix, key), child, out);
            }
        }
        Value::Null => {}
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// Rebuilds the subtree at `base` from flattened leaves stored under it.
pub(crate) fn unflatten(base: &str, leaves: Vec<(String, Value)>) -> Option<Value> {
    let mut root = Value::Object(Map::new());
    for (path, leaf) in leaves {
        if path == base {
            return Some(leaf);
        }
        let Some(relative) = path.strip_prefix(base).and_then(|p| p.strip_prefix('/')) else {
            continue;
        };
        let segments: Vec<String> = relative.split('/').map(str::to_string).collect();
        set_at(&mut root, &segments, Some(leaf));
    }
    normalize(root)
}

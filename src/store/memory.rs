use super::{normalize, remove_at, set_at, value_at, DocPath, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Process-local document tree. Holds all guest data, and durable data when
/// no external backend is configured.
#[derive(Debug)]
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        path.validate()?;
        let root = self.root.read().await;
        Ok(value_at(&root, path.segments()).cloned())
    }

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError> {
        path.validate()?;
        let mut root = self.root.write().await;
        set_at(&mut root, path.segments(), normalize(value));
        Ok(())
    }

    async fn update(&self, path: &DocPath, children: Map<String, Value>) -> Result<(), StoreError> {
        path.validate()?;
        let children = children
            .into_iter()
            .map(|(key, value)| (path.child(key), value))
            .collect::<Vec<_>>();
        for (child, _) in &children {
            child.validate()?;
        }
        let mut root = self.root.write().await;
        for (child, value) in children {
            set_at(&mut root, child.segments(), normalize(value));
        }
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        path.validate()?;
        let mut root = self.root.write().await;
        remove_at(&mut root, path.segments());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_path_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&DocPath::new(["users", "nobody"])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        let path = DocPath::new(["users", "k", "settings"]);
        store.set(&path, json!({"theme": "light"})).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), Some(json!({"theme": "light"})));
        assert_eq!(
            store.get(&DocPath::new(["users", "k"])).await.unwrap(),
            Some(json!({"settings": {"theme": "light"}}))
        );

        store.delete(&path).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), None);
        assert_eq!(store.snapshot().await, json!({}));
    }

    #[tokio::test]
    async fn test_set_null_deletes() {
        let store = MemoryStore::new();
        let path = DocPath::new(["a", "b"]);
        store.set(&path, json!(1)).await.unwrap();
        store.set(&path, Value::Null).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_keeps_siblings() {
        let store = MemoryStore::new();
        let path = DocPath::new(["events", "e1"]);
        store.set(&path, json!({"title": "Dentist", "notified": false})).await.unwrap();

        let mut children = Map::new();
        children.insert("notified".into(), json!(true));
        store.update(&path, children).await.unwrap();

        assert_eq!(store.get(&path).await.unwrap(), Some(json!({"title": "Dentist", "notified": true})));
    }

    #[tokio::test]
    async fn test_invalid_path_rejected() {
        let store = MemoryStore::new();
        let err = store.set(&DocPath::new(["users", "a.b"]), json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }
}

use super::{flatten, normalize, unflatten, DocPath, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Document tree kept in Postgres as one row per object leaf.
///
/// A subtree read collects every row whose path equals the requested path or
/// starts with it plus `/` (a `LIKE` prefix match, so the `text_pattern_ops`
/// index applies). Writes replace the subtree and clear any ancestor
/// stored as a leaf, inside a single transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = crate::db::create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    async fn delete_subtree(tx: &mut Transaction<'_, Postgres>, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE path = $1 OR path LIKE $2")
            .bind(path)
            .bind(subtree_pattern(path))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn write_subtree(
        tx: &mut Transaction<'_, Postgres>,
        path: &DocPath,
        value: Value,
    ) -> Result<(), StoreError> {
        let key = path.to_string();
        Self::delete_subtree(tx, &key).await?;

        let Some(value) = normalize(value) else {
            return Ok(());
        };

        // A leaf at an ancestor would shadow the new subtree.
        sqlx::query("DELETE FROM documents WHERE path = ANY($1)")
            .bind(path.ancestors())
            .execute(&mut **tx)
            .await?;

        let mut leaves = Vec::new();
        flatten(&key, &value, &mut leaves);
        for (leaf_path, leaf) in leaves {
            sqlx::query(
                "INSERT INTO documents (path, value, updated_at) VALUES ($1, $2, NOW())
                 ON CONFLICT (path) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            )
            .bind(&leaf_path)
            .bind(Json(leaf))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

/// `LIKE` pattern for every path strictly below `path`.
fn subtree_pattern(path: &str) -> String {
    let mut pattern = String::with_capacity(path.len() + 2);
    for c in path.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str("/%");
    pattern
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        path.validate()?;
        let key = path.to_string();
        let rows = sqlx::query("SELECT path, value FROM documents WHERE path = $1 OR path LIKE $2")
            .bind(&key)
            .bind(subtree_pattern(&key))
            .fetch_all(&self.pool)
            .await?;

        let leaves = rows
            .into_iter()
            .map(|row| {
                let leaf_path: String = row.try_get("path")?;
                let Json(value): Json<Value> = row.try_get("value")?;
                Ok((leaf_path, value))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(unflatten(&key, leaves))
    }

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError> {
        path.validate()?;
        let mut tx = self.pool.begin().await?;
        Self::write_subtree(&mut tx, path, value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, path: &DocPath, children: Map<String, Value>) -> Result<(), StoreError> {
        path.validate()?;
        let mut tx = self.pool.begin().await?;
        for (key, value) in children {
            let child = path.child(key);
            child.validate()?;
            Self::write_subtree(&mut tx, &child, value).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        path.validate()?;
        let mut tx = self.pool.begin().await?;
        Self::delete_subtree(&mut tx, &path.to_string()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

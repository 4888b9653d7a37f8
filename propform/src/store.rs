//! Schema stores.
//!
//! A store resolves schema documents by name. The form runtime only needs the
//! raw JSON; parsing happens when a session attaches the schema. A document
//! that is not valid JSON is reported per name in a batch, so it fails its own
//! panel only.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    data::schema::SchemaError,
    error::{FormError, Result},
};

/// A schema of a batch fetch, or why its document could not be read.
pub type FetchedSchema = std::result::Result<Value, SchemaError>;

/// Resolves schema documents by name.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Fetch one schema. `Ok(None)` means the name is unknown.
    async fn get_schema(&self, name: &str) -> Result<Option<Value>>;

    /// Fetch several schemas at once. Unknown names are left out of the map.
    ///
    /// A document that is not valid JSON is returned as an error entry for its
    /// name; other failures abort the batch.
    async fn get_schemas(&self, names: &[String]) -> Result<BTreeMap<String, FetchedSchema>> {
        let mut out = BTreeMap::new();
        for name in names {
            match self.get_schema(name).await {
                Ok(Some(schema)) => {
                    out.insert(name.clone(), Ok(schema));
                }
                Ok(None) => {}
                Err(FormError::Json(e)) => {
                    warn!("schema {name} is not valid JSON: {e}");
                    out.insert(
                        name.clone(),
                        Err(SchemaError::Malformed {
                            path: name.clone(),
                            reason: format!("invalid JSON: {e}"),
                        }),
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

/// Store backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaStore {
    schemas: HashMap<String, Value>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a schema.
    pub fn insert(&mut self, name: impl Into<String>, schema: Value) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn with(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.insert(name, schema);
        self
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn get_schema(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.schemas.get(name).cloned())
    }
}

/// Store reading `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirSchemaStore {
    dir: PathBuf,
}

impl DirSchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn schema_path(&self, name: &str) -> Option<PathBuf> {
        // schema names map to single file names
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        Some(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl SchemaStore for DirSchemaStore {
    async fn get_schema(&self, name: &str) -> Result<Option<Value>> {
        let Some(path) = self.schema_path(name) else {
            warn!("rejecting schema name {name:?}");
            return Ok(None);
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no schema file at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(FormError::Io(e)),
        };
        let schema = serde_json::from_str(&content)?;
        Ok(Some(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_batch() {
        let store = MemorySchemaStore::new()
            .with("A", json!({"type": "object"}))
            .with("B", json!({"type": "object", "properties": {}}));
        let found = store
            .get_schemas(&["A".to_string(), "Missing".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(store.get_schema("Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dir_store_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Book.json"),
            r#"{"type": "object", "properties": {"title": {"type": "string"}}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("Bad.json"), "{not json").unwrap();

        let store = DirSchemaStore::new(dir.path());
        let book = store.get_schema("Book").await.unwrap().unwrap();
        assert_eq!(book["properties"]["title"]["type"], json!("string"));
        assert!(store.get_schema("Nope").await.unwrap().is_none());
        assert!(store.get_schema("../Book").await.unwrap().is_none());
        assert!(matches!(
            store.get_schema("Bad").await,
            Err(FormError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_dir_store_batch_reports_corrupt_file_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Good.json"), r#"{"type": "object"}"#).unwrap();
        std::fs::write(dir.path().join("Bad.json"), "{not json").unwrap();
        let store = DirSchemaStore::new(dir.path());

        let batch = store
            .get_schemas(&["Good".to_string(), "Bad".to_string(), "Nope".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch["Good"].is_ok());
        match &batch["Bad"] {
            Err(SchemaError::Malformed { path, .. }) => assert_eq!(path, "Bad"),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_dir_store_rejects_path_like_names() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden.json"), "{}").unwrap();
        let store = DirSchemaStore::new(dir.path());
        for name in ["", ".hidden", "a/b", "a\\b"] {
            let found = tokio_test::block_on(store.get_schema(name)).unwrap();
            assert!(found.is_none(), "{name:?} should be rejected");
        }
    }
}

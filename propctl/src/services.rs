//! File-backed services.
//!
//! [`FilePersistence`] stores each submitted form as pretty JSON in an output
//! directory, keeping a timestamped backup of the previous version.
//! [`TableLookup`] answers dependent lookups from a static JSON table.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use tokio::fs;

use propform::{
    FormAction, FormError, LookupOptions, LookupRequest, LookupService, PersistenceService,
    SubmitRequest, SubmitResponse,
};

use crate::utils::file_stem;

/// Writes submissions to `<dir>/<formId>.json`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File a form is stored in.
    pub fn path_for(&self, form_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(form_id)))
    }

    /// Last stored submission of a form, if any.
    pub async fn load(&self, form_id: &str) -> propform::Result<Option<SubmitRequest>> {
        let path = self.path_for(form_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Copy `path` to `<stem>.bk-<unix secs>.json` next to it.
    async fn backup(path: &Path) -> propform::Result<Option<PathBuf>> {
        if fs::metadata(path).await.is_err() {
            return Ok(None);
        }
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let backup = path.with_extension(format!("bk-{secs}.json"));
        fs::copy(path, &backup).await?;
        debug!("backed up {} to {}", path.display(), backup.display());
        Ok(Some(backup))
    }
}

#[async_trait]
impl PersistenceService for FilePersistence {
    async fn submit(&self, request: &SubmitRequest) -> propform::Result<SubmitResponse> {
        let path = self.path_for(&request.form_id);
        fs::create_dir_all(&self.dir).await?;
        Self::backup(&path).await?;

        if request.action == FormAction::Delete {
            match fs::remove_file(&path).await {
                Ok(()) => info!("deleted {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(SubmitResponse {
                        errors: vec![format!("{} has no stored data", request.form_id)],
                        redirect_url: None,
                    });
                }
                Err(e) => return Err(FormError::Io(e)),
            }
            return Ok(SubmitResponse::default());
        }

        fs::write(&path, serde_json::to_string_pretty(request)?).await?;
        info!("wrote {}", path.display());
        Ok(SubmitResponse {
            errors: Vec::new(),
            redirect_url: Some(path.display().to_string()),
        })
    }
}

/// Lookup answers keyed by the fully substituted query.
#[derive(Debug, Clone, Default)]
pub struct TableLookup {
    table: BTreeMap<String, LookupOptions>,
}

impl TableLookup {
    pub fn new(table: BTreeMap<String, LookupOptions>) -> Self {
        Self { table }
    }

    /// Read a table of the form `{ "<query>": { "<value>": "<label>" } }`.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("can not read lookup table {}: {e}", path.display()))?;
        let table = serde_json::from_str(&content)
            .map_err(|e| anyhow!("invalid lookup table {}: {e}", path.display()))?;
        Ok(Self { table })
    }
}

#[async_trait]
impl LookupService for TableLookup {
    async fn lookup(&self, request: &LookupRequest) -> propform::Result<LookupOptions> {
        debug!("table lookup: {}", request.query);
        Ok(self.table.get(&request.query).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propform::FormMetadata;
    use serde_json::json;

    fn request(action: FormAction, title: &str) -> SubmitRequest {
        SubmitRequest {
            form_id: "Book:Dune".into(),
            schema_names: vec!["Book".into()],
            flattened_data: json!({"Book": {"title": title}}),
            form_metadata: FormMetadata::default(),
            action,
        }
    }

    #[tokio::test]
    async fn test_submit_writes_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path().join("out"));

        let first = store.submit(&request(FormAction::Edit, "Dune")).await.unwrap();
        assert!(first.errors.is_empty());
        assert!(first.redirect_url.unwrap().ends_with("Book_Dune.json"));

        store.submit(&request(FormAction::Edit, "Dune Messiah")).await.unwrap();
        let stored = store.load("Book:Dune").await.unwrap().unwrap();
        assert_eq!(stored.flattened_data["Book"]["title"], json!("Dune Messiah"));

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("Book_Dune.bk-"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        store.submit(&request(FormAction::Edit, "Dune")).await.unwrap();

        let deleted = store.submit(&request(FormAction::Delete, "")).await.unwrap();
        assert!(deleted.errors.is_empty());
        assert!(store.load("Book:Dune").await.unwrap().is_none());

        let again = store.submit(&request(FormAction::Delete, "")).await.unwrap();
        assert_eq!(again.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_table_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookups.json");
        std::fs::write(
            &path,
            r#"{"[[Category::Jazz]]": {"Miles Davis": "Miles Davis (trumpet)"}}"#,
        )
        .unwrap();
        let lookup = TableLookup::load(&path).await.unwrap();

        let hit = LookupRequest {
            query: "[[Category::Jazz]]".into(),
            result_fields: Vec::new(),
            schema_name: None,
            option_formula: None,
            label_formula: None,
        };
        let options = lookup.lookup(&hit).await.unwrap();
        assert_eq!(options["Miles Davis"], "Miles Davis (trumpet)");

        let miss = LookupRequest {
            query: "[[Category::Rock]]".into(),
            ..hit
        };
        assert!(lookup.lookup(&miss).await.unwrap().is_empty());
        assert!(TableLookup::load(&dir.path().join("missing.json")).await.is_err());
    }
}

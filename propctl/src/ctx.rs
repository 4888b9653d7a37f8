//! Application context.
//!
//! [`AppContext`] holds the workspace paths and the loaded configuration and
//! wires propform's sessions to the file-backed services.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};
use tokio::fs;

use propform::{
    DirSchemaStore, FormData, FormInstance, FormOptions, FormSession, LookupService,
    MemorySchemaStore,
};

use crate::{
    config::PropctlConfig,
    services::{FilePersistence, TableLookup},
    utils::expand_placeholders,
};

/// Name of the configuration file looked up in the workspace.
pub const CONFIG_FILE: &str = ".propctl.toml";

/// Path configuration.
#[derive(Debug, Default, Clone)]
pub struct PathConfig {
    /// Workspace root directory.
    pub workspace: PathBuf,
    /// Configuration file in use.
    pub config_file: PathBuf,
}

/// State shared by every command.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub paths: PathConfig,
    pub config: PropctlConfig,
}

impl AppContext {
    /// Load the configuration.
    ///
    /// `config_path` defaults to `.propctl.toml` in `workspace`.
    pub async fn load(workspace: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_file = config_path.unwrap_or_else(|| workspace.join(CONFIG_FILE));
        let content = fs::read_to_string(&config_file)
            .await
            .with_context(|| format!("can not read {}", config_file.display()))?;
        let config = PropctlConfig::from_toml(&content)
            .with_context(|| format!("invalid config {}", config_file.display()))?;
        debug!("loaded config from {}", config_file.display());

        Ok(Self {
            paths: PathConfig {
                workspace,
                config_file,
            },
            config,
        })
    }

    /// Expand path placeholders against this workspace.
    pub fn value_replace_with_var<S>(&self, value: S) -> String
    where
        S: AsRef<std::ffi::OsStr>,
    {
        let raw = value.as_ref().to_string_lossy();
        expand_placeholders(&raw, &self.paths.workspace)
    }

    fn resolve(&self, value: &str) -> PathBuf {
        let path = PathBuf::from(self.value_replace_with_var(value));
        if path.is_relative() {
            self.paths.workspace.join(path)
        } else {
            path
        }
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.resolve(&self.config.schema_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.output_dir)
    }

    pub fn schema_store(&self) -> DirSchemaStore {
        DirSchemaStore::new(self.schema_dir())
    }

    pub fn persistence(&self) -> FilePersistence {
        FilePersistence::new(self.output_dir())
    }

    /// Lookup service answering from the configured table.
    ///
    /// Without a table every lookup comes back empty.
    pub async fn lookup_service(&self) -> anyhow::Result<Box<dyn LookupService>> {
        match &self.config.lookup_table {
            Some(table) => Ok(Box::new(TableLookup::load(&self.resolve(table)).await?)),
            None => Ok(Box::new(TableLookup::default())),
        }
    }

    /// Form instance for the configured entity.
    ///
    /// Stored data comes from `form.data` when set, otherwise from the last
    /// submission in the output directory.
    pub async fn form_instance(&self) -> anyhow::Result<FormInstance> {
        let form = &self.config.form;
        let mut data = match &form.data {
            Some(file) => read_data_file(&self.resolve(file)).await?,
            None => match self.persistence().load(&form.id).await? {
                Some(stored) => {
                    debug!("starting from stored submission of {}", form.id);
                    FormData {
                        schemas: match stored.flattened_data {
                            Value::Object(map) => map,
                            _ => Map::new(),
                        },
                        categories: stored.form_metadata.categories,
                        freetext: stored.form_metadata.freetext,
                    }
                }
                None => FormData::default(),
            },
        };
        if !form.categories.is_empty() {
            data.categories = form.categories.clone();
        }
        if !form.freetext.is_empty() {
            data.freetext = form.freetext.clone();
        }

        Ok(FormInstance {
            form_id: form.id.clone(),
            schema_names: form.schemas.clone(),
            data,
            options: FormOptions {
                layout: form.layout.into(),
                action: form.action.into(),
            },
        })
    }

    /// Open the configured form, attaching the extra `attach` schemas.
    pub async fn open_session(&self, attach: &[String]) -> anyhow::Result<FormSession> {
        let store = self.schema_store();
        let instance = self.form_instance().await?;
        let mut session = FormSession::open(instance, &store)
            .await
            .with_context(|| format!("can not open form {}", self.config.form.id))?;
        if !attach.is_empty() {
            session.attach_schemas(attach, &store).await?;
        }
        for anomaly in session.anomalies() {
            debug!("stored data anomaly: {anomaly}");
        }
        Ok(session)
    }
}

/// Read stored data: a JSON object of value trees keyed by schema name.
async fn read_data_file(path: &Path) -> anyhow::Result<FormData> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("can not read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid data file {}", path.display()))?;
    let Value::Object(schemas) = value else {
        bail!("data file {} must hold a JSON object", path.display());
    };
    Ok(FormData {
        schemas,
        ..Default::default()
    })
}

/// Schema store over explicit schema files, used by `check`.
pub async fn store_from_files(files: &[PathBuf]) -> anyhow::Result<(MemorySchemaStore, Vec<String>)> {
    let mut store = MemorySchemaStore::new();
    let mut names = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_stem()
            .ok_or_else(|| anyhow!("invalid schema file {}", file.display()))?
            .to_string_lossy()
            .to_string();
        let content = fs::read_to_string(file)
            .await
            .with_context(|| format!("can not read {}", file.display()))?;
        let schema: Value = serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", file.display()))?;
        store.insert(name.clone(), schema);
        names.push(name);
    }
    Ok((store, names))
}

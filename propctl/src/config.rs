//! Workspace configuration.
//!
//! propctl reads its settings from `.propctl.toml` in the workspace:
//!
//! ```toml
//! schema_dir = "${workspaceFolder}/schemas"
//! output_dir = "${workspaceFolder}/out"
//! lookup_table = "${workspaceFolder}/lookups.json"
//!
//! [form]
//! id = "Book:Dune"
//! schemas = ["Book", "Review"]
//! layout = "Steps"
//! action = "Edit"
//! categories = ["Books"]
//! ```
//!
//! Paths may use `${workspaceFolder}` and `${env:VAR}` placeholders.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use propform::{FormAction, FormLayout};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PropctlConfig {
    /// Directory holding `<schema>.json` documents.
    #[serde(default = "default_schema_dir")]
    pub schema_dir: String,
    /// Directory submitted forms are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// JSON table answering dependent lookups.
    #[serde(default)]
    pub lookup_table: Option<String>,
    /// The form to open.
    pub form: FormConfig,
}

fn default_schema_dir() -> String {
    "${workspaceFolder}/schemas".to_string()
}

fn default_output_dir() -> String {
    "${workspaceFolder}/out".to_string()
}

/// The form to open.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FormConfig {
    /// Identifier of the entity, also the output file name.
    pub id: String,
    /// Schemas attached to the form, in panel order.
    pub schemas: Vec<String>,
    /// Stored data to start from instead of the last submission.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub freetext: String,
}

/// Panel layout.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Layout {
    #[default]
    Tabs,
    Steps,
    Single,
}

impl From<Layout> for FormLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Tabs => FormLayout::Tabs,
            Layout::Steps => FormLayout::Steps,
            Layout::Single => FormLayout::Single,
        }
    }
}

/// Whether the form creates or edits the entity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Action {
    Create,
    #[default]
    Edit,
}

impl From<Action> for FormAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => FormAction::Create,
            Action::Edit => FormAction::Edit,
        }
    }
}

impl PropctlConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// JSON Schema of the configuration file.
    pub fn json_schema() -> anyhow::Result<String> {
        let schema = schemars::schema_for!(PropctlConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

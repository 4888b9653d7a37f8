//! # propform
//!
//! A schema-driven property form runtime.
//!
//! Given a declarative schema document (JSON Schema augmented with `wiki`
//! metadata) and the stored data of one entity, propform builds a live model
//! mirroring the schema, resolves dependent lookups between fields, validates
//! the edited data and serializes it back into a schema-shaped payload.
//! Several independently authored schemas can be attached to one entity; they
//! share one validate → submit workflow.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use propform::{FormInstance, FormSession, MemorySchemaStore, ModelAction};
//! use serde_json::json;
//!
//! # async fn demo() -> propform::Result<()> {
//! let store = MemorySchemaStore::new().with(
//!     "Person",
//!     json!({"type": "object", "properties": {
//!         "age": {"type": "integer", "wiki": {"required": true}}
//!     }}),
//! );
//! let instance = FormInstance {
//!     form_id: "Person:Ada".into(),
//!     schema_names: vec!["Person".into()],
//!     ..Default::default()
//! };
//! let mut session = FormSession::open(instance, &store).await?;
//! session.set_value("Person/age", json!("36"))?;
//! let output = session.get_model(ModelAction::ValidateAndSubmit)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`data`] - Schema parsing, the model tree, building and flattening
//! - [`validate`] - JSON Schema validation and error mapping
//! - [`query`] - Dependent lookup queries
//! - [`session`] - The per-form session handle
//! - [`workflow`] - The validate → submit state machine
//! - [`view`] - Panels and field descriptors for front ends
//! - [`store`] - Schema stores

#[macro_use]
extern crate log;

/// Schema parsing, model tree construction and flattening.
pub mod data;

/// Error types.
pub mod error;

/// Dependent lookup queries.
pub mod query;

/// Per-form session handle.
pub mod session;

/// Schema stores.
pub mod store;

/// JSON Schema validation and error mapping.
pub mod validate;

/// Panels and field descriptors.
pub mod view;

/// Validate → submit workflow.
pub mod workflow;

pub use data::{FlattenEntry, FlattenMap, InputKind, InputValue, SchemaDocument};
pub use error::{FormError, Result, StructuralAnomaly};
pub use query::{LookupOptions, LookupRequest, LookupService};
pub use session::{
    FormAction, FormData, FormInstance, FormLayout, FormMetadata, FormOptions, FormSession,
    ModelAction, ModelOutput,
};
pub use store::{DirSchemaStore, MemorySchemaStore, SchemaStore};
pub use validate::{SchemaReport, ValidationError, ValidationOutcome, Validator};
pub use view::{FieldView, Panel};
pub use workflow::{
    PersistenceService, SubmitOutcome, SubmitRequest, SubmitResponse, WorkflowAction,
    WorkflowController, WorkflowState,
};
pub use serde_json::Value;

//! Form data structures and schema parsing.
//!
//! This module provides the core data structures for turning a schema document
//! and a stored data tree into a live model, including:
//!
//! - Schema parsing into an internal representation
//! - The arena-backed model tree and its bound inputs
//! - Flattening leaves into a path-indexed value map
//!
//! ## Architecture
//!
//! - [`schema`] - Schema wire format parsing
//! - [`pointer`] - JSON-Pointer-like path helpers
//! - [`input`] - Input kinds, their capabilities and values
//! - [`model`] - The model tree arena
//! - [`builder`] - Recursive (schema, data) → model tree construction
//! - [`flatten`] - Leaf projection, coercion and value-tree reconstruction

/// Recursive model tree construction.
pub mod builder;

/// Leaf projection and value coercion.
pub mod flatten;

/// Input kinds and bound input values.
pub mod input;

/// Arena-backed model tree.
pub mod model;

/// Path helpers.
pub mod pointer;

/// Schema wire format parsing.
pub mod schema;

pub use builder::{BuildContext, ModelBuilder};
pub use flatten::{FlattenEntry, FlattenMap, ValueMode};
pub use input::{Capabilities, Input, InputKind, InputValue};
pub use model::{ModelNode, ModelTree, NodeId, NodeKind};
pub use schema::{SchemaDocument, SchemaKind, SchemaNode, SchemaType, Visibility, WikiMeta};

//! Schema wire format parsing.
//!
//! A schema document is a JSON object with `type`, optional `properties` /
//! `items`, and a `wiki` object carrying UI and behavior metadata. Keys the
//! runtime does not interpret (`enum`, `format`, `title`, ...) are kept in
//! [`SchemaNode::extra`] and passed through untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::pointer;

/// Errors produced while parsing a schema document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    /// A value had the wrong JSON type.
    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    /// `type` names something outside the supported set.
    #[error("Unsupported schema type at {path}: {ty}")]
    UnsupportedType { path: String, ty: String },
    /// The `wiki` block or another structural part could not be read.
    #[error("Malformed schema at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl SchemaError {
    /// Path of the schema subtree that failed to parse.
    pub fn path(&self) -> &str {
        match self {
            SchemaError::TypeMismatch { path, .. }
            | SchemaError::UnsupportedType { path, .. }
            | SchemaError::Malformed { path, .. } => path,
        }
    }
}

/// JSON type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl SchemaType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "object" => SchemaType::Object,
            "array" => SchemaType::Array,
            "string" => SchemaType::String,
            "number" => SchemaType::Number,
            "integer" => SchemaType::Integer,
            "boolean" => SchemaType::Boolean,
            _ => return None,
        })
    }

    /// Name as written in JSON Schema.
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
        }
    }

    /// Whether nodes of this type hold other nodes.
    pub fn is_container(self) -> bool {
        matches!(self, SchemaType::Object | SchemaType::Array)
    }
}

/// Role of a schema node within a form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    #[default]
    Property,
    Schema,
    ContentBlock,
}

/// When a field is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Visible,
    /// Not rendered, but still validated and submitted.
    Hidden,
    /// Only present while creating the entity; pruned on edit.
    OncreateOnly,
}

/// UI and behavior metadata attached to a schema node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WikiMeta {
    pub name: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: SchemaKind,
    pub preferred_input: Option<String>,
    pub required: bool,
    pub multiple_items: bool,
    pub visibility: Visibility,
    pub default: Option<Value>,
    pub value_formula: Option<String>,
    pub options_source: Option<String>,
    pub options_values: Vec<String>,
    pub ask_query: Option<String>,
    pub ask_query_schema: Option<String>,
    pub ask_query_printouts: Vec<String>,
    pub option_formula: Option<String>,
    pub label_formula: Option<String>,
    pub layout: Option<String>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub help: Option<String>,
    /// Static content of a content block.
    pub content: Option<String>,
    /// Keys not interpreted by the runtime.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parsed schema node.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub ty: SchemaType,
    /// Declared properties in document order.
    pub properties: Vec<(String, Arc<SchemaNode>)>,
    pub items: Option<Arc<SchemaNode>>,
    pub wiki: WikiMeta,
    /// Keys other than `type`, `properties`, `items` and `wiki`.
    pub extra: Map<String, Value>,
    /// Child subtrees that failed to parse and were skipped.
    pub malformed: Vec<SchemaError>,
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(_) => "string".into(),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}

impl SchemaNode {
    /// Parse a schema node. `name` is the property name used when
    /// `wiki.name` is absent; `path` locates the node for error reports.
    ///
    /// Child subtrees that fail to parse are skipped and recorded in
    /// [`SchemaNode::malformed`]; only a failure of this node itself is
    /// returned as an error.
    pub fn parse(value: &Value, name: &str, path: &str) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or_else(|| SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: "object".to_string(),
            actual: describe(value),
        })?;

        let ty = Self::detect_type(obj, path)?;

        let mut wiki: WikiMeta = match obj.get("wiki") {
            None | Some(Value::Null) => WikiMeta::default(),
            Some(w) => serde_json::from_value(w.clone()).map_err(|e| SchemaError::Malformed {
                path: path.to_string(),
                reason: format!("wiki: {e}"),
            })?,
        };
        if wiki.name.is_empty() {
            wiki.name = name.to_string();
        }

        let extra = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "type" | "properties" | "items" | "wiki"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut node = SchemaNode {
            ty,
            properties: Vec::new(),
            items: None,
            wiki,
            extra,
            malformed: Vec::new(),
        };

        match ty {
            SchemaType::Object => {
                if let Some(props) = obj.get("properties") {
                    let props = props.as_object().ok_or_else(|| SchemaError::TypeMismatch {
                        path: path.to_string(),
                        expected: "properties object".to_string(),
                        actual: describe(props),
                    })?;
                    for (key, sub) in props {
                        let sub_path = pointer::join(path, key);
                        match SchemaNode::parse(sub, key, &sub_path) {
                            Ok(child) => node.properties.push((key.clone(), Arc::new(child))),
                            Err(e) => {
                                warn!("skipping malformed schema subtree: {e}");
                                node.malformed.push(e);
                            }
                        }
                    }
                }
            }
            SchemaType::Array => {
                if let Some(items) = obj.get("items") {
                    match SchemaNode::parse(items, name, &pointer::join(path, "items")) {
                        Ok(child) => node.items = Some(Arc::new(child)),
                        Err(e) => {
                            warn!("skipping malformed array items: {e}");
                            node.malformed.push(e);
                        }
                    }
                }
            }
            _ => {}
        }

        Ok(node)
    }

    fn detect_type(obj: &Map<String, Value>, path: &str) -> Result<SchemaType, SchemaError> {
        let unsupported = |ty: &str| SchemaError::UnsupportedType {
            path: path.to_string(),
            ty: ty.to_string(),
        };
        match obj.get("type") {
            Some(Value::String(s)) => SchemaType::parse(s).ok_or_else(|| unsupported(s)),
            // `["string", "null"]` style unions: the first non-null member wins.
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .and_then(SchemaType::parse)
                .ok_or_else(|| unsupported(&Value::Array(types.clone()).to_string())),
            Some(other) => Err(SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: "type string".to_string(),
                actual: describe(other),
            }),
            None if obj.contains_key("properties") => Ok(SchemaType::Object),
            None if obj.contains_key("items") => Ok(SchemaType::Array),
            None => Err(SchemaError::Malformed {
                path: path.to_string(),
                reason: "missing `type`".to_string(),
            }),
        }
    }

    /// Label shown to users.
    pub fn label(&self) -> &str {
        self.wiki
            .label
            .as_deref()
            .or_else(|| self.extra.get("title").and_then(Value::as_str))
            .unwrap_or(&self.wiki.name)
    }

    /// Look up a declared property.
    pub fn property(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Lower bound on repeated items.
    pub fn min_items(&self) -> usize {
        self.wiki
            .min_items
            .or_else(|| self.keyword_usize("minItems"))
            .unwrap_or(0)
    }

    /// Upper bound on repeated items, if any.
    pub fn max_items(&self) -> Option<usize> {
        self.wiki
            .max_items
            .or_else(|| self.keyword_usize("maxItems"))
    }

    fn keyword_usize(&self, key: &str) -> Option<usize> {
        self.extra
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    /// Values listed by the schema's `enum` keyword.
    pub fn enum_values(&self) -> Vec<Value> {
        self.extra
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether this node holds structured items (object/array items).
    pub fn has_structured_items(&self) -> bool {
        self.items.as_ref().is_some_and(|i| i.ty.is_container())
    }

    /// Whether this node is pruned under the given creation mode.
    pub fn pruned(&self, creating: bool) -> bool {
        self.wiki.visibility == Visibility::OncreateOnly && !creating
    }

    /// Collect parse failures of this subtree.
    pub fn collect_malformed<'a>(&'a self, out: &mut Vec<&'a SchemaError>) {
        out.extend(self.malformed.iter());
        for (_, child) in &self.properties {
            child.collect_malformed(out);
        }
        if let Some(items) = &self.items {
            items.collect_malformed(out);
        }
    }
}

/// A named schema as resolved by the schema store.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub name: String,
    pub root: Arc<SchemaNode>,
    /// Document as received, used to compile the validator.
    pub raw: Value,
}

impl SchemaDocument {
    /// Parse a raw schema document.
    pub fn parse(name: &str, raw: Value) -> Result<Self, SchemaError> {
        let root = SchemaNode::parse(&raw, name, name)?;
        Ok(Self {
            name: name.to_string(),
            root: Arc::new(root),
            raw,
        })
    }

    /// Parse a raw schema document, keeping an empty object in place of a
    /// root that fails to parse. The failure is recorded on the root and
    /// surfaces when the schema is validated.
    pub fn parse_lenient(name: &str, raw: Value) -> Self {
        match Self::parse(name, raw.clone()) {
            Ok(doc) => doc,
            Err(e) => {
                let mut doc = Self::unreadable(name, e);
                doc.raw = raw;
                doc
            }
        }
    }

    /// Empty object schema standing in for a document that could not be
    /// read. `error` fails the schema when it is validated.
    pub fn unreadable(name: &str, error: SchemaError) -> Self {
        warn!("schema {name} is unusable: {error}");
        let wiki = WikiMeta {
            name: name.to_string(),
            ..Default::default()
        };
        Self {
            name: name.to_string(),
            root: Arc::new(SchemaNode {
                ty: SchemaType::Object,
                properties: Vec::new(),
                items: None,
                wiki,
                extra: Map::new(),
                malformed: vec![error],
            }),
            raw: Value::Null,
        }
    }

    /// Subtrees skipped while parsing.
    pub fn malformed(&self) -> Vec<&SchemaError> {
        let mut out = Vec::new();
        self.root.collect_malformed(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wiki_meta() {
        let doc = SchemaDocument::parse(
            "Book",
            json!({
                "type": "object",
                "wiki": {"type": "schema", "layout": "tabs"},
                "properties": {
                    "title": {
                        "type": "string",
                        "title": "Book title",
                        "wiki": {
                            "required": true,
                            "preferredInput": "OO.ui.TextInputWidget",
                            "visibility": "oncreate-only",
                            "askQuery": "[[Category::<genre>]]",
                            "askQueryPrintouts": ["Author"],
                            "customFlag": 3
                        }
                    }
                }
            }),
        )
        .unwrap();

        assert_eq!(doc.root.wiki.kind, SchemaKind::Schema);
        assert_eq!(doc.root.wiki.name, "Book");
        let title = doc.root.property("title").unwrap();
        assert_eq!(title.ty, SchemaType::String);
        assert!(title.wiki.required);
        assert_eq!(title.wiki.name, "title");
        assert_eq!(title.wiki.visibility, Visibility::OncreateOnly);
        assert_eq!(title.wiki.ask_query.as_deref(), Some("[[Category::<genre>]]"));
        assert_eq!(title.wiki.ask_query_printouts, vec!["Author".to_string()]);
        assert_eq!(title.wiki.extra.get("customFlag"), Some(&json!(3)));
        assert_eq!(title.label(), "Book title");
        assert!(title.pruned(false));
        assert!(!title.pruned(true));
    }

    #[test]
    fn test_property_order_is_preserved() {
        let doc = SchemaDocument::parse(
            "S",
            json!({"type": "object", "properties": {
                "zeta": {"type": "string"},
                "alpha": {"type": "string"},
                "mid": {"type": "string"}
            }}),
        )
        .unwrap();
        let names: Vec<_> = doc.root.properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_malformed_subtree_is_skipped_locally() {
        let doc = SchemaDocument::parse(
            "S",
            json!({"type": "object", "properties": {
                "ok": {"type": "string"},
                "broken": {"type": "strnig"},
                "badwiki": {"type": "string", "wiki": {"required": "yes"}},
                "after": {"type": "integer"}
            }}),
        )
        .unwrap();
        let names: Vec<_> = doc.root.properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["ok", "after"]);
        let malformed = doc.malformed();
        assert_eq!(malformed.len(), 2);
        assert_eq!(malformed[0].path(), "S/broken");
        assert_eq!(malformed[1].path(), "S/badwiki");
    }

    #[test]
    fn test_type_union_and_inferred_types() {
        let doc = SchemaDocument::parse(
            "S",
            json!({"properties": {
                "n": {"type": ["null", "number"]},
                "list": {"items": {"type": "string"}, "minItems": 2, "maxItems": 4}
            }}),
        )
        .unwrap();
        assert_eq!(doc.root.ty, SchemaType::Object);
        assert_eq!(doc.root.property("n").unwrap().ty, SchemaType::Number);
        let list = doc.root.property("list").unwrap();
        assert_eq!(list.ty, SchemaType::Array);
        assert_eq!(list.min_items(), 2);
        assert_eq!(list.max_items(), Some(4));
        assert!(!list.has_structured_items());
    }

    #[test]
    fn test_root_must_be_an_object() {
        let err = SchemaDocument::parse("S", json!("nope")).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));

        let doc = SchemaDocument::parse_lenient("S", json!("nope"));
        assert!(doc.root.properties.is_empty());
        assert_eq!(doc.malformed().len(), 1);
    }
}

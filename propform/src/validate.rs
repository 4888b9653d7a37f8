//! Schema validation and error mapping.
//!
//! Schema documents carry per-field metadata in `wiki` blocks that plain JSON
//! Schema does not understand. Before compiling, a document is rendered into
//! plain JSON Schema ([`validation_schema`]); the compiled validator then runs
//! over the value tree of the schema and each reported error is mapped back to
//! the model node at `${schemaName}${instancePath}`.

use jsonschema::error::ValidationErrorKind;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    data::{
        flatten::{self, ValueMode},
        model::ModelTree,
        pointer,
        schema::SchemaDocument,
    },
    error::FormError,
};

/// One data-validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub schema_name: String,
    /// JSON Pointer into the schema's value tree.
    pub instance_path: String,
    pub message: String,
    /// Model path the error was attached to, when one matched.
    pub path: Option<String>,
}

/// Result of validating one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub schema_name: String,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Schema-level messages: compile failures and unmapped errors.
    pub banner: Vec<String>,
}

/// Result of a validation pass over the attached schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid: bool,
    /// The schema that stopped the pass.
    pub failed_schema: Option<String>,
    /// Reports of the schemas that were evaluated, in order.
    pub reports: Vec<SchemaReport>,
}

impl ValidationOutcome {
    /// All field errors of the pass.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.reports.iter().flat_map(|r| r.errors.iter())
    }
}

fn is_true(wiki: Option<&Value>, key: &str) -> bool {
    wiki.and_then(|w| w.get(key)).and_then(Value::as_bool) == Some(true)
}

fn is_pruned(sub: &Value, creating: bool) -> bool {
    let wiki = sub.get("wiki");
    let oncreate = wiki.and_then(|w| w.get("visibility")).and_then(Value::as_str)
        == Some("oncreate-only");
    let content = wiki.and_then(|w| w.get("type")).and_then(Value::as_str) == Some("content-block");
    (oncreate && !creating) || content
}

/// Render a raw schema document into plain JSON Schema.
///
/// `wiki` blocks are dropped, `wiki.required` flags become the parent's
/// `required` list, `wiki.minItems`/`wiki.maxItems` become array keywords, and
/// fields that are pruned from the model (or hold no data) are removed.
pub fn validation_schema(raw: &Value, creating: bool) -> Value {
    let Value::Object(obj) = raw else {
        return raw.clone();
    };
    let wiki = obj.get("wiki");

    let mut out = Map::new();
    let mut required: Vec<String> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();

    for (key, value) in obj {
        match key.as_str() {
            "wiki" | "required" => {}
            "properties" => {
                let Value::Object(props) = value else {
                    out.insert(key.clone(), value.clone());
                    continue;
                };
                let mut rendered = Map::new();
                for (name, sub) in props {
                    if is_pruned(sub, creating) {
                        required.retain(|r| r != name);
                        continue;
                    }
                    if is_true(sub.get("wiki"), "required") && !required.contains(name) {
                        required.push(name.clone());
                    }
                    rendered.insert(name.clone(), validation_schema(sub, creating));
                }
                out.insert(key.clone(), Value::Object(rendered));
            }
            "items" => {
                out.insert(key.clone(), validation_schema(value, creating));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if !required.is_empty() {
        out.insert(
            "required".to_string(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }
    for keyword in ["minItems", "maxItems"] {
        if let Some(n) = wiki.and_then(|w| w.get(keyword)) {
            out.entry(keyword.to_string()).or_insert_with(|| n.clone());
        }
    }
    Value::Object(out)
}

/// Compiles and runs schema validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    creating: bool,
}

impl Validator {
    /// `creating` must match the build context so pruned fields line up.
    pub fn new(creating: bool) -> Self {
        Self { creating }
    }

    /// Compile a schema document.
    ///
    /// Subtrees skipped by the parser also fail compilation, so a malformed
    /// schema is reported once, at validation time, for its own panel only.
    pub fn compile(&self, doc: &SchemaDocument) -> Result<jsonschema::Validator, FormError> {
        let malformed = doc.malformed();
        if !malformed.is_empty() {
            return Err(FormError::SchemaCompile {
                schema: doc.name.clone(),
                message: malformed
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }
        let schema = validation_schema(&doc.raw, self.creating);
        jsonschema::validator_for(&schema).map_err(|e| FormError::SchemaCompile {
            schema: doc.name.clone(),
            message: e.to_string(),
        })
    }

    /// Validate one schema's value tree, annotating matched model nodes.
    pub fn validate(
        &self,
        schema_name: &str,
        data: &Value,
        doc: &SchemaDocument,
        tree: &mut ModelTree,
    ) -> SchemaReport {
        let mut report = SchemaReport {
            schema_name: schema_name.to_string(),
            ..Default::default()
        };

        let validator = match self.compile(doc) {
            Ok(v) => v,
            Err(e) => {
                warn!("{e}");
                report.banner.push(e.to_string());
                return report;
            }
        };

        for error in validator.iter_errors(data) {
            let mut instance_path = error.instance_path.to_string();
            if let ValidationErrorKind::Required { property } = &error.kind {
                if let Some(name) = property.as_str() {
                    instance_path = pointer::join(&instance_path, name);
                }
            }
            let message = error.to_string();
            let model_path = format!("{schema_name}{instance_path}");

            // errors on the schema root itself are schema-level
            let target = if instance_path.is_empty() {
                None
            } else {
                tree.find(&model_path)
            };
            let path = match target {
                Some(id) => {
                    tree.get_mut(id).errors.push(message.clone());
                    Some(model_path)
                }
                None => {
                    report.banner.push(if instance_path.is_empty() {
                        message.clone()
                    } else {
                        format!("{instance_path}: {message}")
                    });
                    None
                }
            };

            report.errors.push(ValidationError {
                schema_name: schema_name.to_string(),
                instance_path,
                message,
                path,
            });
        }

        report.valid = report.errors.is_empty() && report.banner.is_empty();
        debug!(
            "validated {schema_name}: {} error(s)",
            report.errors.len()
        );
        report
    }

    /// Validate schemas in order, stopping at the first failure.
    ///
    /// Field errors of the previous pass are cleared first. Schemas after the
    /// failing one are not evaluated.
    pub fn validate_schemas(&self, docs: &[&SchemaDocument], tree: &mut ModelTree) -> ValidationOutcome {
        tree.clear_errors(None);
        let mut outcome = ValidationOutcome {
            valid: true,
            ..Default::default()
        };

        for doc in docs {
            let Some(root) = tree.root(&doc.name) else {
                continue;
            };
            let flat = flatten::flatten(tree, Some(&doc.name));
            let data = flatten::value_tree(tree, root, &flat, ValueMode::Validate);
            let report = self.validate(&doc.name, &data, doc, tree);
            let valid = report.valid;
            outcome.reports.push(report);
            if !valid {
                info!("validation stopped at schema {}", doc.name);
                outcome.valid = false;
                outcome.failed_schema = Some(doc.name.clone());
                break;
            }
        }
        outcome
    }
}

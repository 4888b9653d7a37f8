//! View binding.
//!
//! Second pass over a built model: every attached schema becomes a [`Panel`]
//! of [`FieldView`] descriptors a front end can render without looking at
//! schemas again. Hidden fields are left out here but stay in the model, so
//! they are still validated and submitted.

use serde::Serialize;
use serde_json::Value;

use crate::{
    data::{InputKind, InputValue, ModelTree, NodeId, NodeKind, SchemaNode, Visibility},
    session::{FormLayout, FormSession},
};

/// Role of a row within a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldRole {
    /// Heading of an object or repeated field.
    Group,
    /// One item of a repeated field.
    Item,
    /// Editable field.
    Field,
    /// Static content.
    Content,
}

/// A selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub path: String,
    pub role: FieldRole,
    pub label: String,
    /// Nesting level below the panel root.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputKind>,
    pub value: Value,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
}

/// Fields of one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub schema_name: String,
    pub title: String,
    pub layout: FormLayout,
    pub active: bool,
    /// Schema-level messages of the last validation pass.
    pub banner: Vec<String>,
    pub fields: Vec<FieldView>,
}

fn input_value(value: &InputValue) -> Value {
    match value {
        InputValue::Single(v) => v.clone(),
        InputValue::Multi(values) => Value::Array(values.clone()),
    }
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Static options declared by the schema: `enum`, then `wiki.optionsValues`.
pub fn static_options(schema: &SchemaNode) -> Vec<FieldOption> {
    let mut values = schema.enum_values();
    if values.is_empty() {
        if let Some(items) = &schema.items {
            values = items.enum_values();
        }
    }
    if values.is_empty() {
        return schema
            .wiki
            .options_values
            .iter()
            .map(|v| FieldOption {
                value: v.clone(),
                label: v.clone(),
            })
            .collect();
    }
    values
        .iter()
        .map(|v| FieldOption {
            value: option_text(v),
            label: option_text(v),
        })
        .collect()
}

/// Panels of every attached schema, in panel order.
pub fn panels(session: &FormSession) -> Vec<Panel> {
    let tree = session.tree();
    tree.roots()
        .enumerate()
        .map(|(index, (name, root))| {
            let active = match session.active_panel() {
                Some(active) => active == name,
                None => index == 0,
            };
            let banner = session
                .last_validation()
                .and_then(|v| v.reports.iter().find(|r| r.schema_name == name))
                .map(|r| r.banner.clone())
                .unwrap_or_default();

            let mut fields = Vec::new();
            for child in tree.children(root) {
                collect(session, tree, *child, 0, &mut fields);
            }

            Panel {
                schema_name: name.to_string(),
                title: tree.get(root).schema.label().to_string(),
                layout: session.layout(),
                active,
                banner,
                fields,
            }
        })
        .collect()
}

fn collect(session: &FormSession, tree: &ModelTree, id: NodeId, depth: usize, out: &mut Vec<FieldView>) {
    let node = tree.get(id);
    if node.schema.wiki.visibility == Visibility::Hidden {
        return;
    }

    let array = node
        .parent
        .map(|p| tree.get(p))
        .filter(|p| matches!(p.kind, NodeKind::Array { .. }));
    let is_item = array.is_some();
    let label = match array {
        Some(array) => format!(
            "{} #{}",
            array.schema.label(),
            node.path.rsplit('/').next().unwrap_or_default()
        ),
        None => node.schema.label().to_string(),
    };

    let mut view = FieldView {
        path: node.path.clone(),
        role: FieldRole::Group,
        label,
        depth,
        input: None,
        value: Value::Null,
        required: node.schema.wiki.required,
        errors: node.errors.clone(),
        options: Vec::new(),
        help: node.schema.wiki.help.clone(),
        content: None,
        file_key: None,
    };

    match &node.kind {
        NodeKind::Leaf(input) => {
            view.role = FieldRole::Field;
            view.input = Some(input.kind);
            view.value = input_value(&input.value);
            view.file_key = node.file_key.clone();
            let caps = input.kind.capabilities();
            if caps.supports_options {
                view.options = static_options(&node.schema);
            }
            if caps.supports_lookup {
                if let Some(found) = session.lookup_options(&node.path) {
                    view.options.extend(found.iter().map(|(value, label)| FieldOption {
                        value: value.clone(),
                        label: label.clone(),
                    }));
                }
            }
            out.push(view);
        }
        NodeKind::Content => {
            view.role = FieldRole::Content;
            view.content = node.schema.wiki.content.clone();
            out.push(view);
        }
        NodeKind::Object { .. } | NodeKind::Array { .. } => {
            if is_item {
                view.role = FieldRole::Item;
            }
            out.push(view);
            for child in tree.children(id) {
                collect(session, tree, *child, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::SchemaDocument,
        session::{FormData, FormInstance},
    };
    use serde_json::json;

    fn session(schemas: Vec<(&str, Value)>, data: Value) -> FormSession {
        let docs = schemas
            .into_iter()
            .map(|(name, schema)| SchemaDocument::parse(name, schema).unwrap())
            .collect();
        FormSession::from_parts(
            FormInstance {
                form_id: "F".into(),
                data: FormData {
                    schemas: data.as_object().cloned().unwrap_or_default(),
                    ..Default::default()
                },
                ..Default::default()
            },
            docs,
        )
    }

    #[test]
    fn test_panel_rows() {
        let s = session(
            vec![(
                "Book",
                json!({"type": "object", "title": "A book", "properties": {
                    "intro": {"type": "string", "wiki": {"type": "content-block", "content": "Fill in"}},
                    "title": {"type": "string", "wiki": {"required": true, "label": "Title", "help": "As printed"}},
                    "secret": {"type": "string", "wiki": {"visibility": "hidden"}},
                    "format": {"type": "string", "enum": ["paper", "ebook"]},
                    "tags": {"type": "array", "wiki": {"preferredInput": "CheckboxMultiselect", "optionsValues": ["a", "b"]},
                             "items": {"type": "string"}},
                    "authors": {"type": "array", "wiki": {"label": "Author"}, "items": {"type": "object", "properties": {
                        "name": {"type": "string"}
                    }}}
                }}),
            )],
            json!({"Book": {"title": "Dune", "secret": "x", "tags": ["a"], "authors": [{"name": "Frank"}]}}),
        );
        let panels = s.panels();
        assert_eq!(panels.len(), 1);
        let panel = &panels[0];
        assert_eq!(panel.title, "A book");
        assert!(panel.active);

        let paths: Vec<_> = panel.fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Book/intro",
                "Book/title",
                "Book/format",
                "Book/tags",
                "Book/authors",
                "Book/authors/0",
                "Book/authors/0/name"
            ]
        );

        let intro = &panel.fields[0];
        assert_eq!(intro.role, FieldRole::Content);
        assert_eq!(intro.content.as_deref(), Some("Fill in"));

        let title = &panel.fields[1];
        assert_eq!(title.label, "Title");
        assert!(title.required);
        assert_eq!(title.value, json!("Dune"));
        assert_eq!(title.help.as_deref(), Some("As printed"));

        let format = &panel.fields[2];
        assert_eq!(format.input, Some(InputKind::Dropdown));
        assert_eq!(format.options.len(), 2);

        let tags = &panel.fields[3];
        assert_eq!(tags.value, json!(["a"]));
        assert_eq!(tags.options[1].value, "b");

        assert_eq!(panel.fields[5].role, FieldRole::Item);
        assert_eq!(panel.fields[5].label, "Author #0");
        assert_eq!(panel.fields[6].depth, 2);

        // hidden fields are still submitted
        let request = s.submission(crate::session::FormAction::Edit);
        assert_eq!(request.flattened_data["Book"]["secret"], json!("x"));
    }

    #[test]
    fn test_failed_panel_is_active_and_has_banner() {
        let mut s = session(
            vec![
                ("A", json!({"type": "object", "properties": {"x": {"type": "string"}}})),
                ("B", json!({"type": "object", "minProperties": 3, "properties": {
                    "y": {"type": "string", "wiki": {"required": true}}
                }})),
            ],
            json!({"A": {"x": "ok"}, "B": {"y": "set"}}),
        );
        let outcome = s.validate().unwrap();
        assert_eq!(outcome.failed_schema.as_deref(), Some("B"));

        let panels = s.panels();
        assert!(!panels[0].active);
        assert!(panels[1].active);
        assert_eq!(panels[1].banner.len(), 1);
        assert!(panels[0].banner.is_empty());
    }
}

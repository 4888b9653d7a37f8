use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    data::{
        input::{Input, InputKind, InputValue},
        model::{ModelNode, ModelTree, NodeId, NodeKind},
        pointer,
        schema::{SchemaKind, SchemaNode, SchemaType},
    },
    error::StructuralAnomaly,
};

/// Form-wide settings that affect how a schema is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// The form creates a new entity (`action == create`).
    pub creating: bool,
    /// The schema was attached during this session.
    pub new_schema: bool,
}

/// Builds model nodes from (schema, data) pairs into a [`ModelTree`].
///
/// Stored data that no longer matches the schema is treated as absent and
/// recorded as a [`StructuralAnomaly`]; building never fails.
pub struct ModelBuilder<'a> {
    tree: &'a mut ModelTree,
    ctx: BuildContext,
    extra_items: HashMap<String, usize>,
    anomalies: Vec<StructuralAnomaly>,
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

impl<'a> ModelBuilder<'a> {
    pub fn new(tree: &'a mut ModelTree, ctx: BuildContext) -> Self {
        Self {
            tree,
            ctx,
            extra_items: HashMap::new(),
            anomalies: Vec::new(),
        }
    }

    /// Request additional new items for arrays, keyed by array path.
    pub fn with_extra_items(mut self, extra_items: HashMap<String, usize>) -> Self {
        self.extra_items = extra_items;
        self
    }

    /// Build and register the root of a schema. Returns `None` when the root
    /// itself is pruned.
    pub fn build_schema(
        &mut self,
        schema_name: &str,
        schema: &Arc<SchemaNode>,
        data: Option<&Value>,
    ) -> Option<NodeId> {
        let id = self.build(
            schema,
            data,
            schema_name.to_string(),
            schema_name.to_string(),
            String::new(),
            None,
            false,
        )?;
        self.tree.add_root(schema_name, id);
        Some(id)
    }

    /// Build the subtree for `schema` at `path`.
    ///
    /// `data` is `None` when the key is absent from the stored data, which is
    /// the only case where defaults are injected.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &mut self,
        schema: &Arc<SchemaNode>,
        data: Option<&Value>,
        path: String,
        path_no_index: String,
        key: String,
        parent: Option<NodeId>,
        is_new_item: bool,
    ) -> Option<NodeId> {
        if schema.pruned(self.ctx.creating) {
            debug!("pruning oncreate-only field {path}");
            return None;
        }

        if schema.wiki.kind == SchemaKind::ContentBlock {
            return Some(self.insert(schema, NodeKind::Content, path, path_no_index, key, parent));
        }

        match schema.ty {
            SchemaType::Object => {
                self.build_object(schema, data, path, path_no_index, key, parent, is_new_item)
            }
            SchemaType::Array => {
                self.build_array(schema, data, path, path_no_index, key, parent, is_new_item)
            }
            _ => {
                let value = self.scalar_data(&path, data);
                let kind = InputKind::for_schema(schema);
                let value = self.initial_value(schema, value, is_new_item);
                let id = self.insert(
                    schema,
                    NodeKind::Leaf(Input {
                        kind,
                        value: InputValue::Single(value),
                    }),
                    path,
                    path_no_index,
                    key,
                    parent,
                );
                self.tree.get_mut(id).is_file = kind.is_file();
                Some(id)
            }
        }
    }

    /// Anomalies recorded while building.
    pub fn finish(self) -> Vec<StructuralAnomaly> {
        self.anomalies
    }

    #[allow(clippy::too_many_arguments)]
    fn build_object(
        &mut self,
        schema: &Arc<SchemaNode>,
        data: Option<&Value>,
        path: String,
        path_no_index: String,
        key: String,
        parent: Option<NodeId>,
        is_new_item: bool,
    ) -> Option<NodeId> {
        let fields = match data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                self.anomaly(&path, "object", other);
                None
            }
        };

        let id = self.insert(
            schema,
            NodeKind::Object {
                children: Vec::new(),
            },
            path.clone(),
            path_no_index.clone(),
            key,
            parent,
        );

        for (name, child) in &schema.properties {
            let child_data = fields.and_then(|m| m.get(name));
            if let Some(cid) = self.build(
                child,
                child_data,
                pointer::join(&path, name),
                pointer::join(&path_no_index, name),
                name.clone(),
                Some(id),
                is_new_item,
            ) {
                self.tree.attach(id, cid);
            }
        }
        Some(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_array(
        &mut self,
        schema: &Arc<SchemaNode>,
        data: Option<&Value>,
        path: String,
        path_no_index: String,
        key: String,
        parent: Option<NodeId>,
        is_new_item: bool,
    ) -> Option<NodeId> {
        let stored: Vec<&Value> = match data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.iter().collect(),
            Some(other) => {
                self.anomaly(&path, "array", other);
                Vec::new()
            }
        };

        let multi_kind = self.multiselect_kind(schema);
        if let Some(kind) = multi_kind {
            let mut values = Vec::with_capacity(stored.len());
            for (i, v) in stored.iter().enumerate() {
                if v.is_object() || v.is_array() {
                    self.anomaly(&pointer::join_index(&path, i), "scalar", v);
                } else {
                    values.push((*v).clone());
                }
            }
            if data.is_none() && self.is_new(is_new_item) {
                if let Some(default) = schema
                    .wiki
                    .default
                    .clone()
                    .or_else(|| schema.items.as_ref().and_then(|i| i.wiki.default.clone()))
                {
                    values = match InputValue::from_value(default, true) {
                        InputValue::Multi(v) => v,
                        InputValue::Single(v) => vec![v],
                    };
                }
            }
            let id = self.insert(
                schema,
                NodeKind::Leaf(Input {
                    kind,
                    value: InputValue::Multi(values),
                }),
                path,
                path_no_index,
                key,
                parent,
            );
            self.tree.get_mut(id).multiselect = true;
            return Some(id);
        }

        // arrays without `items` were bound to a multi-valued input above
        let item_schema = schema.items.clone()?;

        let extra = self.extra_items.get(&path).copied().unwrap_or(0);
        let count = schema.min_items().max(stored.len() + extra);

        let id = self.insert(
            schema,
            NodeKind::Array { items: Vec::new() },
            path.clone(),
            path_no_index.clone(),
            key,
            parent,
        );

        for i in 0..count {
            let item_data = stored.get(i).copied();
            let new_item = is_new_item || i >= stored.len();
            if let Some(cid) = self.build(
                &item_schema,
                item_data,
                pointer::join_index(&path, i),
                path_no_index.clone(),
                String::new(),
                Some(id),
                new_item,
            ) {
                self.tree.attach(id, cid);
            }
        }
        Some(id)
    }

    /// Input kind for a scalar-items array bound to a single multi-valued
    /// input, if the declared input is multiselect-capable.
    fn multiselect_kind(&self, schema: &SchemaNode) -> Option<InputKind> {
        if schema.has_structured_items() {
            return None;
        }
        let preferred = schema.wiki.preferred_input.as_deref().or_else(|| {
            schema
                .items
                .as_ref()
                .and_then(|i| i.wiki.preferred_input.as_deref())
        });
        match preferred.and_then(InputKind::from_name) {
            Some(kind) if kind.capabilities().multiselect => Some(kind),
            // No usable item schema: keep the values together.
            _ if schema.items.is_none() => Some(InputKind::TagMultiselect),
            _ => None,
        }
    }

    fn scalar_data<'v>(&mut self, path: &str, data: Option<&'v Value>) -> Option<&'v Value> {
        match data {
            Some(v @ (Value::Object(_) | Value::Array(_))) => {
                self.anomaly(path, "scalar", v);
                None
            }
            other => other,
        }
    }

    fn initial_value(&self, schema: &SchemaNode, data: Option<&Value>, is_new_item: bool) -> Value {
        match data {
            Some(v) => v.clone(),
            None if self.is_new(is_new_item) => schema.wiki.default.clone().unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    fn is_new(&self, is_new_item: bool) -> bool {
        is_new_item || self.ctx.new_schema || self.ctx.creating
    }

    fn anomaly(&mut self, path: &str, expected: &'static str, actual: &Value) {
        let anomaly = StructuralAnomaly {
            path: path.to_string(),
            expected,
            actual: json_kind(actual),
        };
        warn!("stored data does not match schema, using defaults: {anomaly}");
        self.anomalies.push(anomaly);
    }

    fn insert(
        &mut self,
        schema: &Arc<SchemaNode>,
        kind: NodeKind,
        path: String,
        path_no_index: String,
        key: String,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.tree.insert(ModelNode {
            schema: Arc::clone(schema),
            kind,
            path,
            path_no_index,
            key,
            parent,
            multiselect: false,
            is_file: false,
            file_key: None,
            errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaDocument;
    use serde_json::json;

    fn build(schema: Value, data: Value, ctx: BuildContext) -> (ModelTree, Vec<StructuralAnomaly>) {
        let doc = SchemaDocument::parse("S", schema).unwrap();
        let mut tree = ModelTree::new();
        let mut builder = ModelBuilder::new(&mut tree, ctx);
        builder.build_schema("S", &doc.root, Some(&data));
        let anomalies = builder.finish();
        (tree, anomalies)
    }

    fn value_at(tree: &ModelTree, path: &str) -> InputValue {
        tree.get(tree.find(path).unwrap()).value().unwrap().clone()
    }

    fn authors_schema() -> Value {
        json!({"type": "object", "properties": {
            "authors": {
                "type": "array",
                "wiki": {"minItems": 2, "maxItems": 3},
                "items": {"type": "object", "properties": {
                    "name": {"type": "string", "wiki": {"default": "anon"}}
                }}
            }
        }})
    }

    #[test]
    fn test_paths_and_path_no_index() {
        let (tree, anomalies) = build(
            authors_schema(),
            json!({"authors": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}),
            BuildContext::default(),
        );
        assert!(anomalies.is_empty());
        let n = tree.get(tree.find("S/authors/2/name").unwrap());
        assert_eq!(n.path_no_index, "S/authors/name");
        assert_eq!(n.key, "name");
        let item = tree.get(n.parent.unwrap());
        assert_eq!(item.path, "S/authors/2");
        assert_eq!(item.path_no_index, "S/authors");
    }

    #[test]
    fn test_min_items_pads_with_new_items() {
        let (tree, _) = build(
            authors_schema(),
            json!({"authors": [{"name": "a"}]}),
            BuildContext::default(),
        );
        let arr = tree.find("S/authors").unwrap();
        assert_eq!(tree.children(arr).len(), 2);
        assert_eq!(value_at(&tree, "S/authors/0/name"), InputValue::Single(json!("a")));
        // padded item is new, so it gets the default
        assert_eq!(value_at(&tree, "S/authors/1/name"), InputValue::Single(json!("anon")));
    }

    #[test]
    fn test_defaults_only_for_new_nodes() {
        let schema = json!({"type": "object", "properties": {
            "a": {"type": "string", "wiki": {"default": "x"}},
            "b": {"type": "string", "wiki": {"default": "y"}}
        }});
        let (tree, _) = build(schema.clone(), json!({"b": null}), BuildContext::default());
        assert_eq!(value_at(&tree, "S/a"), InputValue::Single(Value::Null));
        assert_eq!(value_at(&tree, "S/b"), InputValue::Single(Value::Null));

        let creating = BuildContext {
            creating: true,
            new_schema: false,
        };
        let (tree, _) = build(schema.clone(), json!({"b": null}), creating);
        assert_eq!(value_at(&tree, "S/a"), InputValue::Single(json!("x")));
        // present-but-null is not absent
        assert_eq!(value_at(&tree, "S/b"), InputValue::Single(Value::Null));

        let attached = BuildContext {
            creating: false,
            new_schema: true,
        };
        let (tree, _) = build(schema, json!({}), attached);
        assert_eq!(value_at(&tree, "S/b"), InputValue::Single(json!("y")));
    }

    #[test]
    fn test_oncreate_only_is_pruned_on_edit() {
        let schema = json!({"type": "object", "properties": {
            "slug": {"type": "string", "wiki": {"visibility": "oncreate-only"}},
            "title": {"type": "string"}
        }});
        let (tree, _) = build(schema.clone(), json!({"slug": "s"}), BuildContext::default());
        assert!(tree.find("S/slug").is_none());
        assert!(tree.find("S/title").is_some());

        let (tree, _) = build(
            schema,
            json!({}),
            BuildContext {
                creating: true,
                new_schema: false,
            },
        );
        assert!(tree.find("S/slug").is_some());
    }

    #[test]
    fn test_shape_mismatch_defaults_subtree() {
        let schema = json!({"type": "object", "properties": {
            "address": {"type": "object", "properties": {
                "city": {"type": "string", "wiki": {"default": "Paris"}}
            }},
            "tags": {"type": "array", "items": {"type": "object", "properties": {
                "t": {"type": "string"}
            }}},
            "age": {"type": "integer"}
        }});
        let (tree, anomalies) = build(
            schema,
            json!({"address": "10 Main St", "tags": {"t": 1}, "age": {"years": 3}}),
            BuildContext::default(),
        );
        assert_eq!(anomalies.len(), 3);
        assert_eq!(anomalies[0].path, "S/address");
        assert_eq!(anomalies[0].expected, "object");
        assert_eq!(anomalies[0].actual, "string");
        assert_eq!(value_at(&tree, "S/address/city"), InputValue::Single(Value::Null));
        assert_eq!(tree.children(tree.find("S/tags").unwrap()).len(), 0);
        assert_eq!(value_at(&tree, "S/age"), InputValue::Single(Value::Null));
    }

    #[test]
    fn test_scalar_arrays() {
        let schema = json!({"type": "object", "properties": {
            "genres": {
                "type": "array",
                "wiki": {"preferredInput": "OO.ui.MenuTagMultiselectWidget"},
                "items": {"type": "string"}
            },
            "isbn": {
                "type": "array",
                "wiki": {"minItems": 1},
                "items": {"type": "string"}
            }
        }});
        let (tree, _) = build(
            schema,
            json!({"genres": ["jazz", "blues"], "isbn": ["1", "2"]}),
            BuildContext::default(),
        );
        let genres = tree.get(tree.find("S/genres").unwrap());
        assert!(genres.multiselect);
        assert_eq!(
            genres.value(),
            Some(&InputValue::Multi(vec![json!("jazz"), json!("blues")]))
        );
        assert!(tree.find("S/genres/0").is_none());

        assert!(tree.find("S/isbn/1").is_some());
        let isbn1 = tree.get(tree.find("S/isbn/1").unwrap());
        assert_eq!(isbn1.path_no_index, "S/isbn");
    }

    #[test]
    fn test_extra_items_are_new() {
        let doc = SchemaDocument::parse("S", authors_schema()).unwrap();
        let mut tree = ModelTree::new();
        let builder = ModelBuilder::new(&mut tree, BuildContext::default());
        let mut builder =
            builder.with_extra_items(HashMap::from([("S/authors".to_string(), 1usize)]));
        builder.build_schema(
            "S",
            &doc.root,
            Some(&json!({"authors": [{"name": "a"}, {"name": "b"}]})),
        );
        builder.finish();
        assert_eq!(tree.children(tree.find("S/authors").unwrap()).len(), 3);
        assert_eq!(value_at(&tree, "S/authors/2/name"), InputValue::Single(json!("anon")));
    }

    #[test]
    fn test_content_block() {
        let schema = json!({"type": "object", "properties": {
            "intro": {"type": "string", "wiki": {"type": "content-block", "content": "Hello"}}
        }});
        let (tree, _) = build(schema, json!({}), BuildContext::default());
        let intro = tree.get(tree.find("S/intro").unwrap());
        assert_eq!(intro.kind, NodeKind::Content);
        assert!(tree.all_leaves().is_empty());
    }
}

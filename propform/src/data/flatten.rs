use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::data::{
    input::InputValue,
    model::{ModelTree, NodeId, NodeKind},
    schema::{SchemaNode, SchemaType},
};

/// Flattened leaf value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenEntry {
    pub path_no_index: String,
    /// Value after schema-type coercion.
    pub value: Value,
    pub multiselect: bool,
    #[serde(skip)]
    pub schema: Arc<SchemaNode>,
}

/// Leaf values keyed by indexed path.
pub type FlattenMap = BTreeMap<String, FlattenEntry>;

/// How a value tree is reconstructed from flattened leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// `null` properties are left out so `required` fires for unset fields.
    Validate,
    /// Every property is kept.
    Submit,
}

/// Flatten the leaves of every attached schema, or of one schema.
pub fn flatten(tree: &ModelTree, schema_name: Option<&str>) -> FlattenMap {
    let mut out = FlattenMap::new();
    for (name, root) in tree.roots() {
        if schema_name.is_some_and(|n| n != name) {
            continue;
        }
        flatten_into(tree, root, &mut out);
    }
    out
}

/// Flatten the leaves below `id` into `out`.
pub fn flatten_into(tree: &ModelTree, id: NodeId, out: &mut FlattenMap) {
    for leaf in tree.leaves(id) {
        let node = tree.get(leaf);
        let Some(input) = node.input() else {
            continue;
        };
        out.insert(
            node.path.clone(),
            FlattenEntry {
                path_no_index: node.path_no_index.clone(),
                value: coerce(&node.schema, &input.value, node.multiselect),
                multiselect: node.multiselect,
                schema: Arc::clone(&node.schema),
            },
        );
    }
}

/// Apply schema-type coercion to an input value.
///
/// For multiselect leaves `schema` is the array schema and items are coerced
/// with its `items` schema.
pub fn coerce(schema: &SchemaNode, value: &InputValue, multiselect: bool) -> Value {
    let required = schema.wiki.required;
    match value {
        InputValue::Multi(values) => {
            let item_ty = schema
                .items
                .as_ref()
                .map(|i| i.ty)
                .unwrap_or(SchemaType::String);
            let items: Vec<Value> = values
                .iter()
                .map(|v| coerce_scalar(item_ty, true, v))
                .filter(|v| !v.is_null())
                .collect();
            if items.is_empty() && required {
                Value::Null
            } else {
                Value::Array(items)
            }
        }
        InputValue::Single(v) if multiselect => {
            coerce(schema, &InputValue::from_value(v.clone(), true), true)
        }
        InputValue::Single(v) => coerce_scalar(schema.ty, required, v),
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// `f` as an `i64` when it is a whole number inside the `i64` range.
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn coerce_scalar(ty: SchemaType, required: bool, value: &Value) -> Value {
    match (ty, value) {
        (_, Value::Null) => Value::Null,

        (SchemaType::String, Value::String(s)) if required && is_blank(s) => Value::Null,
        (SchemaType::String, Value::String(_)) => value.clone(),
        (SchemaType::String, Value::Number(n)) => Value::String(n.to_string()),
        (SchemaType::String, Value::Bool(b)) => Value::String(b.to_string()),

        (SchemaType::Integer, Value::Number(n)) => match n.as_f64().and_then(whole_i64) {
            Some(i) if n.as_i64().is_none() => Value::from(i),
            _ => value.clone(),
        },
        (SchemaType::Integer, Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Value::Null
            } else if let Ok(i) = t.parse::<i64>() {
                Value::from(i)
            } else {
                match t.parse::<f64>().ok().and_then(whole_i64) {
                    Some(i) => Value::from(i),
                    // kept verbatim so the validator reports it
                    None => value.clone(),
                }
            }
        }

        (SchemaType::Number, Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Value::Null
            } else {
                t.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone())
            }
        }

        (SchemaType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Value::Null,
            "true" | "1" | "on" | "yes" => Value::Bool(true),
            "false" | "0" | "off" | "no" => Value::Bool(false),
            _ => value.clone(),
        },
        (SchemaType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Value::Bool(false),
            Some(1) => Value::Bool(true),
            _ => value.clone(),
        },

        _ => value.clone(),
    }
}

/// Reconstruct the nested value tree below `id` from flattened leaves.
pub fn value_tree(tree: &ModelTree, id: NodeId, flat: &FlattenMap, mode: ValueMode) -> Value {
    let node = tree.get(id);
    match &node.kind {
        NodeKind::Object { children } => {
            let mut map = Map::new();
            for child in children {
                let child_node = tree.get(*child);
                if matches!(child_node.kind, NodeKind::Content) {
                    continue;
                }
                let v = value_tree(tree, *child, flat, mode);
                if v.is_null() && mode == ValueMode::Validate {
                    continue;
                }
                map.insert(child_node.key.clone(), v);
            }
            Value::Object(map)
        }
        NodeKind::Array { items } => Value::Array(
            items
                .iter()
                .map(|item| value_tree(tree, *item, flat, mode))
                // unset items count towards minItems, not as type errors
                .filter(|v| !(v.is_null() && mode == ValueMode::Validate))
                .collect(),
        ),
        NodeKind::Leaf(_) => flat
            .get(&node.path)
            .map(|e| e.value.clone())
            .unwrap_or(Value::Null),
        NodeKind::Content => Value::Null,
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::schema::{SchemaNode, SchemaType};

/// Kind of input a leaf is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Text,
    Textarea,
    Number,
    Toggle,
    Checkbox,
    Date,
    DateTime,
    Dropdown,
    ComboBox,
    Lookup,
    TagMultiselect,
    MenuTagMultiselect,
    CheckboxMultiselect,
    TitleMultiselect,
    CategoryMultiselect,
    File,
}

/// What an input kind can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Holds a list of values in a single input.
    pub multiselect: bool,
    /// Offers a fixed list of options.
    pub supports_options: bool,
    /// Can query the lookup service while typing.
    pub supports_lookup: bool,
}

const fn caps(multiselect: bool, supports_options: bool, supports_lookup: bool) -> Capabilities {
    Capabilities {
        multiselect,
        supports_options,
        supports_lookup,
    }
}

/// Known preferred-input names, compared after stripping namespaces and a
/// trailing `Widget`/`InputWidget`.
const INPUT_NAMES: &[(&str, InputKind)] = &[
    ("textinput", InputKind::Text),
    ("text", InputKind::Text),
    ("multilinetextinput", InputKind::Textarea),
    ("textarea", InputKind::Textarea),
    ("numberinput", InputKind::Number),
    ("number", InputKind::Number),
    ("toggleswitch", InputKind::Toggle),
    ("checkboxinput", InputKind::Checkbox),
    ("checkbox", InputKind::Checkbox),
    ("dateinput", InputKind::Date),
    ("date", InputKind::Date),
    ("datetimeinput", InputKind::DateTime),
    ("datetime", InputKind::DateTime),
    ("dropdowninput", InputKind::Dropdown),
    ("dropdown", InputKind::Dropdown),
    ("comboboxinput", InputKind::ComboBox),
    ("combobox", InputKind::ComboBox),
    ("lookupelement", InputKind::Lookup),
    ("lookup", InputKind::Lookup),
    ("tagmultiselect", InputKind::TagMultiselect),
    ("menutagmultiselect", InputKind::MenuTagMultiselect),
    ("menutagsearchmultiselect", InputKind::MenuTagMultiselect),
    ("checkboxmultiselectinput", InputKind::CheckboxMultiselect),
    ("checkboxmultiselect", InputKind::CheckboxMultiselect),
    ("titlesmultiselect", InputKind::TitleMultiselect),
    ("titlemultiselect", InputKind::TitleMultiselect),
    ("categorymultiselect", InputKind::CategoryMultiselect),
    ("selectfile", InputKind::File),
    ("upload", InputKind::File),
    ("file", InputKind::File),
];

impl InputKind {
    /// Resolve a preferred-input name such as `OO.ui.DropdownInputWidget`.
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase();
        let short = short.strip_suffix("widget").unwrap_or(&short);
        INPUT_NAMES
            .iter()
            .find(|(n, _)| *n == short)
            .map(|(_, kind)| *kind)
    }

    /// Input used for a node: its preferred input when recognized,
    /// otherwise a default derived from the schema type.
    pub fn for_schema(schema: &SchemaNode) -> Self {
        if let Some(kind) = schema
            .wiki
            .preferred_input
            .as_deref()
            .and_then(Self::from_name)
        {
            return kind;
        }
        if schema.wiki.ask_query.is_some() {
            return InputKind::Lookup;
        }
        match schema.ty {
            SchemaType::Boolean => InputKind::Toggle,
            SchemaType::Number | SchemaType::Integer => InputKind::Number,
            _ if !schema.enum_values().is_empty() => InputKind::Dropdown,
            _ => match schema.extra.get("format").and_then(Value::as_str) {
                Some("date") => InputKind::Date,
                Some("date-time") => InputKind::DateTime,
                _ => InputKind::Text,
            },
        }
    }

    /// Capability table.
    pub const fn capabilities(self) -> Capabilities {
        match self {
            InputKind::Text
            | InputKind::Textarea
            | InputKind::Number
            | InputKind::Toggle
            | InputKind::Checkbox
            | InputKind::Date
            | InputKind::DateTime
            | InputKind::File => caps(false, false, false),
            InputKind::Dropdown => caps(false, true, false),
            InputKind::ComboBox => caps(false, true, true),
            InputKind::Lookup => caps(false, false, true),
            InputKind::TagMultiselect => caps(true, false, false),
            InputKind::MenuTagMultiselect => caps(true, true, true),
            InputKind::CheckboxMultiselect => caps(true, true, false),
            InputKind::TitleMultiselect | InputKind::CategoryMultiselect => caps(true, false, true),
        }
    }

    pub fn is_file(self) -> bool {
        self == InputKind::File
    }
}

/// Value held by an input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Single(Value),
    Multi(Vec<Value>),
}

impl InputValue {
    /// Value cleared by an upstream change: empty text or an empty list.
    pub fn cleared(multiselect: bool) -> Self {
        if multiselect {
            InputValue::Multi(Vec::new())
        } else {
            InputValue::Single(Value::String(String::new()))
        }
    }

    /// Whether the input holds nothing the user entered.
    pub fn is_blank(&self) -> bool {
        match self {
            InputValue::Single(Value::Null) => true,
            InputValue::Single(Value::String(s)) => s.trim().is_empty(),
            InputValue::Single(_) => false,
            InputValue::Multi(values) => values.is_empty(),
        }
    }

    /// Normalize a raw value for an input of the given shape.
    pub fn from_value(value: Value, multiselect: bool) -> Self {
        match (value, multiselect) {
            (Value::Array(values), true) => InputValue::Multi(values),
            (Value::Null, true) => InputValue::Multi(Vec::new()),
            (v, true) => InputValue::Multi(vec![v]),
            (v, false) => InputValue::Single(v),
        }
    }
}

/// An input bound to a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub kind: InputKind,
    pub value: InputValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaNode;
    use serde_json::json;

    #[test]
    fn test_from_name() {
        assert_eq!(
            InputKind::from_name("OO.ui.DropdownInputWidget"),
            Some(InputKind::Dropdown)
        );
        assert_eq!(
            InputKind::from_name("mw.widgets.CategoryMultiselectWidget"),
            Some(InputKind::CategoryMultiselect)
        );
        assert_eq!(
            InputKind::from_name("OO.ui.MenuTagMultiselectWidget"),
            Some(InputKind::MenuTagMultiselect)
        );
        assert_eq!(InputKind::from_name("lookup"), Some(InputKind::Lookup));
        assert_eq!(InputKind::from_name("SomethingElse"), None);
    }

    #[test]
    fn test_defaults_by_schema_type() {
        let node = |v| SchemaNode::parse(&v, "f", "S/f").unwrap();
        assert_eq!(
            InputKind::for_schema(&node(json!({"type": "boolean"}))),
            InputKind::Toggle
        );
        assert_eq!(
            InputKind::for_schema(&node(json!({"type": "string", "enum": ["a", "b"]}))),
            InputKind::Dropdown
        );
        assert_eq!(
            InputKind::for_schema(&node(json!({"type": "string", "format": "date"}))),
            InputKind::Date
        );
        assert_eq!(
            InputKind::for_schema(&node(
                json!({"type": "string", "wiki": {"askQuery": "[[<value>]]"}})
            )),
            InputKind::Lookup
        );
        assert_eq!(
            InputKind::for_schema(&node(
                json!({"type": "string", "wiki": {"preferredInput": "OO.ui.SelectFileWidget"}})
            )),
            InputKind::File
        );
    }

    #[test]
    fn test_capabilities_and_values() {
        assert!(InputKind::MenuTagMultiselect.capabilities().multiselect);
        assert!(!InputKind::Text.capabilities().supports_options);
        assert!(InputKind::Lookup.capabilities().supports_lookup);

        assert_eq!(InputValue::cleared(true), InputValue::Multi(vec![]));
        assert_eq!(InputValue::cleared(false), InputValue::Single(json!("")));
        assert!(InputValue::Single(json!("  ")).is_blank());
        assert!(!InputValue::Single(json!(0)).is_blank());
        assert_eq!(
            InputValue::from_value(json!("x"), true),
            InputValue::Multi(vec![json!("x")])
        );
    }
}

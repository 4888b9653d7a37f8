//! Dependent lookups.
//!
//! A field's `askQuery` is a template with `<token>` placeholders. The token
//! `<value>` stands for the text currently typed into the field; every other
//! token names a sibling field and is replaced by that field's live value.
//! Siblings are looked up from the field's own object outward, up to its
//! repeated item.
//!
//! Lookups are not cancelled when a newer keystroke arrives. Each request is
//! tagged with a per-field sequence number instead, and only the response to
//! the latest request is applied.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    data::{
        flatten::FlattenMap,
        model::{ModelNode, ModelTree, NodeId, NodeKind},
        pointer,
        schema::SchemaNode,
    },
    error::Result,
};

/// Token replaced by the typed lookup text.
pub const VALUE_TOKEN: &str = "value";

/// Options returned by a lookup: value → label.
pub type LookupOptions = BTreeMap<String, String>;

/// Request sent to the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    /// Query with every token substituted.
    pub query: String,
    /// Result fields (printouts) to return.
    pub result_fields: Vec<String>,
    /// Schema used to shape the results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_formula: Option<String>,
}

/// Lookup service answering dependent queries.
#[async_trait]
pub trait LookupService: Send + Sync {
    /// Run a query. Timeouts are the implementation's concern.
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupOptions>;
}

/// An issued lookup, tagged with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    /// Path of the field the lookup belongs to.
    pub path: String,
    pub seq: u64,
    pub request: LookupRequest,
}

/// Per-field monotonic request counters.
#[derive(Debug, Clone, Default)]
pub struct LookupSequencer {
    latest: HashMap<String, u64>,
}

impl LookupSequencer {
    /// Issue the next sequence number for a field.
    pub fn issue(&mut self, path: &str) -> u64 {
        let seq = self.latest.entry(path.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Whether `seq` is the most recent request issued for the field.
    pub fn is_latest(&self, path: &str, seq: u64) -> bool {
        self.latest.get(path) == Some(&seq)
    }

    /// Forget all counters; responses to earlier requests become stale.
    pub fn reset(&mut self) {
        self.latest.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(String),
}

fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            literal.push(ch);
            continue;
        }

        let mut token = String::new();
        let mut closed = false;
        while let Some(&next) = chars.peek() {
            if next == '<' {
                break;
            }
            chars.next();
            if next == '>' {
                closed = true;
                break;
            }
            token.push(next);
        }

        let name = token.trim();
        if closed && !name.is_empty() {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(name.to_string()));
        } else {
            literal.push('<');
            literal.push_str(&token);
            if closed {
                literal.push('>');
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Tokens of a template in order of first appearance.
pub fn scan_tokens(template: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for segment in parse_template(template) {
        if let Segment::Token(t) = segment {
            if !tokens.contains(&t) {
                tokens.push(t);
            }
        }
    }
    tokens
}

/// Replace every token with the text produced by `resolve`.
pub fn substitute(template: &str, mut resolve: impl FnMut(&str) -> String) -> String {
    parse_template(template)
        .into_iter()
        .map(|segment| match segment {
            Segment::Literal(s) => s,
            Segment::Token(t) => resolve(&t),
        })
        .collect()
}

/// Token as a path suffix, escaped like model paths.
fn token_suffix(token: &str) -> String {
    token
        .split('/')
        .map(pointer::escape)
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of the field a sibling token of `field` reads.
///
/// The containing objects of `field` are searched from the innermost outward,
/// stopping at the nearest repeated item, so fields of the same item win.
/// Otherwise the schema-level field, then the first field of the schema whose
/// `pathNoIndex` ends with the token, is used.
pub fn resolve_source<'a>(
    token: &str,
    tree: &ModelTree,
    field: &ModelNode,
    flat: &'a FlattenMap,
) -> Option<&'a str> {
    let suffix = token_suffix(token);
    let lookup = |path: String| {
        flat.get_key_value(&path)
            .map(|(k, _)| k.as_str())
            .filter(|k| *k != field.path)
    };

    let mut current = field;
    while let Some(parent) = current.parent.map(|id| tree.get(id)) {
        if matches!(parent.kind, NodeKind::Array { .. }) {
            // `current` is an item
            break;
        }
        if let Some(found) = lookup(format!("{}/{suffix}", parent.path)) {
            return Some(found);
        }
        current = parent;
    }

    let schema = field.schema_name();
    let exact = format!("{schema}/{suffix}");
    let tail = format!("/{suffix}");
    let candidates = || {
        flat.iter()
            .filter(|(path, _)| **path != field.path && pointer::root(path) == schema)
    };
    candidates()
        .find(|(_, e)| e.path_no_index == exact)
        .or_else(|| candidates().find(|(_, e)| e.path_no_index.ends_with(&tail)))
        .map(|(path, _)| path.as_str())
}

/// Resolve a sibling token for `field` to its current value.
pub fn resolve_token(token: &str, tree: &ModelTree, field: &ModelNode, flat: &FlattenMap) -> Option<Value> {
    resolve_source(token, tree, field, flat)
        .and_then(|path| flat.get(path))
        .map(|e| e.value.clone())
}

/// Text form of a value inside a query. Lists are joined with `,`.
pub fn query_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(query_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Substitute the tokens of `template` for `field`.
pub fn resolve_template(
    template: &str,
    tree: &ModelTree,
    field: &ModelNode,
    flat: &FlattenMap,
    typed: &str,
) -> String {
    substitute(template, |token| {
        if token == VALUE_TOKEN {
            typed.to_string()
        } else {
            resolve_token(token, tree, field, flat)
                .map(|v| query_text(&v))
                .unwrap_or_default()
        }
    })
}

/// Build the lookup request for a field whose schema declares `askQuery`.
pub fn build_request(
    schema: &SchemaNode,
    tree: &ModelTree,
    field: &ModelNode,
    flat: &FlattenMap,
    typed: &str,
) -> Option<LookupRequest> {
    let template = schema.wiki.ask_query.as_deref()?;
    Some(LookupRequest {
        query: resolve_template(template, tree, field, flat, typed),
        result_fields: schema.wiki.ask_query_printouts.clone(),
        schema_name: schema.wiki.ask_query_schema.clone(),
        option_formula: schema.wiki.option_formula.clone(),
        label_formula: schema.wiki.label_formula.clone(),
    })
}

/// Leaves whose `askQuery` reads the field `changed`.
///
/// A token only counts when it resolves to `changed` for that leaf, so a
/// top-level field and a same-named field of a repeated item do not clear
/// each other's dependents.
pub fn dependents_of(tree: &ModelTree, flat: &FlattenMap, changed: NodeId) -> Vec<NodeId> {
    let source = tree.get(changed);
    let Some(root) = tree.root(source.schema_name()) else {
        return Vec::new();
    };
    tree.leaves(root)
        .into_iter()
        .filter(|id| *id != changed)
        .filter(|id| {
            let node = tree.get(*id);
            node.schema.wiki.ask_query.as_deref().is_some_and(|q| {
                scan_tokens(q)
                    .iter()
                    .filter(|t| t.as_str() != VALUE_TOKEN)
                    .any(|t| resolve_source(t, tree, node, flat) == Some(source.path.as_str()))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        builder::{BuildContext, ModelBuilder},
        flatten,
        schema::SchemaDocument,
    };
    use serde_json::json;

    #[test]
    fn test_scan_tokens() {
        assert_eq!(
            scan_tokens("[[Category::<genre>]][[Author::<value>]]<genre>"),
            vec!["genre".to_string(), "value".to_string()]
        );
        assert!(scan_tokens("a < b").is_empty());
        assert!(scan_tokens("<>").is_empty());
        assert_eq!(scan_tokens("x << y >"), vec!["y".to_string()]);
        assert_eq!(scan_tokens("<a/b>"), vec!["a/b".to_string()]);
    }

    #[test]
    fn test_substitute_keeps_malformed_text() {
        let out = substitute("a < b <c> <d", |t| t.to_uppercase());
        assert_eq!(out, "a < b C <d");
        assert_eq!(substitute("<>", |_| "X".into()), "<>");
    }

    fn album() -> (SchemaDocument, ModelTree) {
        let doc = SchemaDocument::parse(
            "Album",
            json!({"type": "object", "properties": {
                "genre": {"type": "string"},
                "artist": {"type": "string",
                           "wiki": {"askQuery": "[[Category::<genre>]][[Name::~<value>*]]",
                                    "askQueryPrintouts": ["Label"],
                                    "askQuerySchema": "Artist"}},
                "tracks": {"type": "array", "items": {"type": "object", "properties": {
                    "genre": {"type": "string"},
                    "composer": {"type": "string", "wiki": {"askQuery": "[[Category::<genre>]]"}},
                    "details": {"type": "object", "properties": {
                        "arranger": {"type": "string", "wiki": {"askQuery": "[[Category::<genre>]]"}}
                    }}
                }}}
            }}),
        )
        .unwrap();
        let mut tree = ModelTree::new();
        let mut builder = ModelBuilder::new(&mut tree, BuildContext::default());
        builder.build_schema(
            "Album",
            &doc.root,
            Some(&json!({
                "genre": "Jazz",
                "tracks": [{"genre": "Blues"}, {}]
            })),
        );
        builder.finish();
        (doc, tree)
    }

    fn paths(tree: &ModelTree, ids: Vec<NodeId>) -> Vec<String> {
        ids.into_iter().map(|id| tree.get(id).path.clone()).collect()
    }

    #[test]
    fn test_build_request_substitutes_siblings() {
        let (_, tree) = album();
        let flat = flatten::flatten(&tree, Some("Album"));
        let artist = tree.get(tree.find("Album/artist").unwrap());
        let req = build_request(&artist.schema, &tree, artist, &flat, "Mil").unwrap();
        assert_eq!(req.query, "[[Category::Jazz]][[Name::~Mil*]]");
        assert_eq!(req.result_fields, vec!["Label".to_string()]);
        assert_eq!(req.schema_name.as_deref(), Some("Artist"));
    }

    #[test]
    fn test_same_item_siblings_win() {
        let (_, tree) = album();
        let flat = flatten::flatten(&tree, Some("Album"));

        let c0 = tree.get(tree.find("Album/tracks/0/composer").unwrap());
        let req = build_request(&c0.schema, &tree, c0, &flat, "").unwrap();
        assert_eq!(req.query, "[[Category::Blues]]");

        // item 1 has no genre of its own (null), which is still a match
        let c1 = tree.get(tree.find("Album/tracks/1/composer").unwrap());
        let req = build_request(&c1.schema, &tree, c1, &flat, "").unwrap();
        assert_eq!(req.query, "[[Category::]]");
        assert_eq!(
            resolve_source("genre", &tree, c1, &flat),
            Some("Album/tracks/1/genre")
        );
    }

    #[test]
    fn test_nested_field_reads_its_item() {
        let (_, tree) = album();
        let flat = flatten::flatten(&tree, Some("Album"));

        let a0 = tree.get(tree.find("Album/tracks/0/details/arranger").unwrap());
        let req = build_request(&a0.schema, &tree, a0, &flat, "").unwrap();
        assert_eq!(req.query, "[[Category::Blues]]");

        // not in the item, so the schema-level field is used
        assert_eq!(resolve_source("artist", &tree, a0, &flat), Some("Album/artist"));
        assert_eq!(resolve_source("nope", &tree, a0, &flat), None);
    }

    #[test]
    fn test_dependents_follow_resolution() {
        let (_, tree) = album();
        let flat = flatten::flatten(&tree, Some("Album"));

        let genre = tree.find("Album/genre").unwrap();
        assert_eq!(paths(&tree, dependents_of(&tree, &flat, genre)), vec!["Album/artist"]);

        let track_genre = tree.find("Album/tracks/0/genre").unwrap();
        assert_eq!(
            paths(&tree, dependents_of(&tree, &flat, track_genre)),
            vec!["Album/tracks/0/composer", "Album/tracks/0/details/arranger"]
        );

        let artist = tree.find("Album/artist").unwrap();
        assert!(dependents_of(&tree, &flat, artist).is_empty());
    }

    #[test]
    fn test_sequencer() {
        let mut seq = LookupSequencer::default();
        let a1 = seq.issue("f");
        let a2 = seq.issue("f");
        let b1 = seq.issue("g");
        assert!(!seq.is_latest("f", a1));
        assert!(seq.is_latest("f", a2));
        assert!(seq.is_latest("g", b1));
        seq.reset();
        assert!(!seq.is_latest("f", a2));
    }

    #[test]
    fn test_query_text() {
        assert_eq!(query_text(&json!(["a", "", 3])), "a,3");
        assert_eq!(query_text(&json!(null)), "");
        assert_eq!(query_text(&json!(true)), "true");
    }
}

//! Form sessions.
//!
//! A [`FormSession`] is the handle every form operation goes through. It owns
//! the schema documents of the attached schemas, the model tree built from
//! them, and the bookkeeping that has to survive a rebuild (upload keys,
//! lookup sequence numbers, the last validation pass).
//!
//! The model tree is never patched in place when its shape changes. Attaching
//! or detaching a schema and adding or removing an array item all read the
//! live values of the current tree and rebuild it wholesale.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    data::{
        BuildContext, FlattenMap, InputValue, ModelBuilder, ModelTree, NodeId, NodeKind,
        SchemaDocument, ValueMode, flatten, pointer,
    },
    error::{FormError, Result, StructuralAnomaly},
    query::{self, LookupOptions, LookupSequencer, LookupService, LookupTicket},
    store::{FetchedSchema, SchemaStore},
    validate::{ValidationOutcome, Validator},
    view::{self, Panel},
    workflow::SubmitRequest,
};

/// What the form does to the entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormAction {
    Create,
    #[default]
    Edit,
    Delete,
}

/// How schema panels are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormLayout {
    #[default]
    Tabs,
    Steps,
    Single,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormOptions {
    pub layout: FormLayout,
    pub action: FormAction,
}

/// Stored data of the entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormData {
    /// Value tree per schema name.
    pub schemas: Map<String, Value>,
    pub categories: Vec<String>,
    pub freetext: String,
}

/// A form as opened by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormInstance {
    pub form_id: String,
    /// Attached schemas, in panel order.
    pub schema_names: Vec<String>,
    pub data: FormData,
    pub options: FormOptions,
}

/// Metadata sent along with every submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormMetadata {
    pub categories: Vec<String>,
    pub freetext: String,
    pub layout: FormLayout,
    /// Upload keys by field path.
    pub files: BTreeMap<String, String>,
}

/// Read mode of [`FormSession::get_model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAction {
    Fetch,
    Validate,
    Submit,
    ValidateAndSubmit,
    Delete,
    /// Flatten one named schema only.
    Schema(String),
}

/// What [`FormSession::get_model`] produced.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    Flatten(FlattenMap),
    Validation(ValidationOutcome),
    Submission(SubmitRequest),
}

fn document_of(name: &str, fetched: FetchedSchema) -> SchemaDocument {
    match fetched {
        Ok(schema) => SchemaDocument::parse_lenient(name, schema),
        Err(e) => SchemaDocument::unreadable(name, e),
    }
}

/// One open form.
#[derive(Debug)]
pub struct FormSession {
    instance: FormInstance,
    documents: Vec<SchemaDocument>,
    tree: ModelTree,
    /// Schemas attached during this session; their fields receive defaults.
    new_schemas: HashSet<String>,
    file_keys: BTreeMap<String, String>,
    lookup_results: BTreeMap<String, LookupOptions>,
    anomalies: Vec<StructuralAnomaly>,
    last_validation: Option<ValidationOutcome>,
    active_panel: Option<String>,
    lookups: LookupSequencer,
    closed: bool,
}

impl FormSession {
    /// Open a form, fetching its schemas from `store` in one batch.
    ///
    /// Every schema named by the instance must be known to the store. A
    /// schema that is known but unparsable still opens; it fails validation
    /// of its own panel.
    pub async fn open(instance: FormInstance, store: &dyn SchemaStore) -> Result<Self> {
        let mut raw = store.get_schemas(&instance.schema_names).await?;
        let mut documents = Vec::with_capacity(instance.schema_names.len());
        for name in &instance.schema_names {
            let Some(fetched) = raw.remove(name) else {
                warn!("form {} names unknown schema {name}", instance.form_id);
                return Err(FormError::SchemaNotFound(name.clone()));
            };
            documents.push(document_of(name, fetched));
        }
        Ok(Self::from_parts(instance, documents))
    }

    /// Open a form from already parsed documents. Schema names are taken
    /// from the documents, in order.
    pub fn from_parts(mut instance: FormInstance, documents: Vec<SchemaDocument>) -> Self {
        instance.schema_names = documents.iter().map(|d| d.name.clone()).collect();
        info!(
            "opening form {} with schema(s) [{}]",
            instance.form_id,
            instance.schema_names.join(", ")
        );
        let mut session = Self {
            instance,
            documents,
            tree: ModelTree::new(),
            new_schemas: HashSet::new(),
            file_keys: BTreeMap::new(),
            lookup_results: BTreeMap::new(),
            anomalies: Vec::new(),
            last_validation: None,
            active_panel: None,
            lookups: LookupSequencer::default(),
            closed: false,
        };
        session.rebuild_with(HashMap::new(), HashMap::new());
        session
    }

    pub fn instance(&self) -> &FormInstance {
        &self.instance
    }

    pub fn form_id(&self) -> &str {
        &self.instance.form_id
    }

    /// Attached schema names, in panel order.
    pub fn schema_names(&self) -> &[String] {
        &self.instance.schema_names
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaDocument> {
        self.documents.iter().find(|d| d.name == name)
    }

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn tree(&self) -> &ModelTree {
        &self.tree
    }

    pub fn action(&self) -> FormAction {
        self.instance.options.action
    }

    pub fn layout(&self) -> FormLayout {
        self.instance.options.layout
    }

    fn creating(&self) -> bool {
        self.action() == FormAction::Create
    }

    /// Shape mismatches found while building from stored data.
    pub fn anomalies(&self) -> &[StructuralAnomaly] {
        &self.anomalies
    }

    pub fn last_validation(&self) -> Option<&ValidationOutcome> {
        self.last_validation.as_ref()
    }

    /// Panel focused by the last failed validation, or by the host.
    pub fn active_panel(&self) -> Option<&str> {
        self.active_panel.as_deref()
    }

    pub fn focus(&mut self, schema_name: &str) -> Result<()> {
        if self.schema(schema_name).is_none() {
            return Err(FormError::SchemaNotFound(schema_name.to_string()));
        }
        self.active_panel = Some(schema_name.to_string());
        Ok(())
    }

    /// Options returned by the last applied lookup of a field.
    pub fn lookup_options(&self, path: &str) -> Option<&LookupOptions> {
        self.lookup_results.get(path)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(FormError::Closed)
        } else {
            Ok(())
        }
    }

    fn node_at(&self, path: &str) -> Result<NodeId> {
        self.tree
            .find(path)
            .ok_or_else(|| FormError::UnknownPath(path.to_string()))
    }

    fn leaf_at(&self, path: &str) -> Result<NodeId> {
        let id = self.node_at(path)?;
        if self.tree.get(id).is_leaf() {
            Ok(id)
        } else {
            Err(FormError::WrongNodeKind {
                path: path.to_string(),
                expected: "a field",
            })
        }
    }

    /// Current value of a field.
    pub fn value(&self, path: &str) -> Option<&InputValue> {
        self.tree.find(path).and_then(|id| self.tree.get(id).value())
    }

    /// Whether the entity has stored data for any attached schema.
    pub fn has_stored_data(&self) -> bool {
        self.instance.schema_names.iter().any(|name| {
            match self.instance.data.schemas.get(name) {
                None | Some(Value::Null) => false,
                Some(Value::Object(map)) => !map.is_empty(),
                Some(_) => true,
            }
        })
    }

    /// Value trees of the current model, by schema name.
    fn live_values(&self) -> HashMap<String, Value> {
        let flat = flatten::flatten(&self.tree, None);
        self.tree
            .roots()
            .map(|(name, root)| {
                (
                    name.to_string(),
                    flatten::value_tree(&self.tree, root, &flat, ValueMode::Submit),
                )
            })
            .collect()
    }

    /// Rebuild the model tree. Schemas without an entry in `values` are
    /// built from the stored data of the instance.
    ///
    /// Anomalies are only collected when a schema is built from stored data;
    /// live values always match the model they came from.
    fn rebuild_with(&mut self, mut values: HashMap<String, Value>, extra_items: HashMap<String, usize>) {
        let mut tree = ModelTree::new();
        let creating = self.creating();
        for doc in &self.documents {
            let (data, from_store) = match values.remove(&doc.name) {
                Some(live) => (Some(live), false),
                None => (self.instance.data.schemas.get(&doc.name).cloned(), true),
            };
            let ctx = BuildContext {
                creating,
                new_schema: self.new_schemas.contains(&doc.name),
            };
            let mut builder = ModelBuilder::new(&mut tree, ctx).with_extra_items(extra_items.clone());
            builder.build_schema(&doc.name, &doc.root, data.as_ref());
            let found = builder.finish();
            if from_store {
                self.anomalies.retain(|a| pointer::root(&a.path) != doc.name);
                self.anomalies.extend(found);
            }
        }

        self.file_keys.retain(|path, key| match tree.find(path) {
            Some(id) => {
                tree.get_mut(id).file_key = Some(key.clone());
                true
            }
            None => false,
        });
        self.lookup_results.retain(|path, _| tree.find(path).is_some());

        debug!(
            "rebuilt model of form {}: {} node(s)",
            self.instance.form_id,
            tree.len()
        );
        self.tree = tree;
    }

    fn rebuild(&mut self, extra_items: HashMap<String, usize>) {
        let values = self.live_values();
        self.rebuild_with(values, extra_items);
    }

    /// Set the value of a field.
    ///
    /// Fields whose lookup query depends on the changed field are cleared,
    /// transitively. Returns the paths of the cleared fields.
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<Vec<String>> {
        self.ensure_open()?;
        let id = self.leaf_at(path)?;
        let node = self.tree.get_mut(id);
        let multiselect = node.multiselect;
        if let Some(input) = node.input_mut() {
            input.value = InputValue::from_value(value, multiselect);
        }
        Ok(self.invalidate_dependents(&[id]))
    }

    fn invalidate_dependents(&mut self, changed: &[NodeId]) -> Vec<String> {
        let mut cleared = Vec::new();
        let mut seen: HashSet<NodeId> = changed.iter().copied().collect();
        let mut queue = changed.to_vec();
        // only paths matter for resolving dependents
        let flat = flatten::flatten(&self.tree, None);

        while let Some(current) = queue.pop() {
            for dep in query::dependents_of(&self.tree, &flat, current) {
                if !seen.insert(dep) {
                    continue;
                }
                let node = self.tree.get_mut(dep);
                let multiselect = node.multiselect;
                if let Some(input) = node.input_mut() {
                    input.value = InputValue::cleared(multiselect);
                }
                debug!("cleared dependent field {}", node.path);
                self.lookup_results.remove(&node.path);
                cleared.push(node.path.clone());
                queue.push(dep);
            }
        }
        cleared
    }

    /// Append a new item to a repeated field. Returns the item's path.
    pub fn add_item(&mut self, array_path: &str) -> Result<String> {
        self.ensure_open()?;
        let id = self.node_at(array_path)?;
        let node = self.tree.get(id);
        let NodeKind::Array { items } = &node.kind else {
            return Err(FormError::WrongNodeKind {
                path: array_path.to_string(),
                expected: "a repeated field",
            });
        };
        let count = items.len();
        if let Some(max) = node.schema.max_items() {
            if count >= max {
                return Err(FormError::Cardinality {
                    path: array_path.to_string(),
                    reason: format!("at most {max} item(s) allowed"),
                });
            }
        }

        self.rebuild(HashMap::from([(array_path.to_string(), 1)]));
        let item = pointer::join_index(array_path, count);
        debug!("added item {item}");
        Ok(item)
    }

    /// Remove an item of a repeated field.
    ///
    /// At `minItems` the item is kept and its values are cleared instead.
    /// Returns whether the item was removed.
    pub fn remove_item(&mut self, item_path: &str) -> Result<bool> {
        self.ensure_open()?;
        let id = self.node_at(item_path)?;
        let not_an_item = || FormError::WrongNodeKind {
            path: item_path.to_string(),
            expected: "an array item",
        };
        let array_id = self.tree.get(id).parent.ok_or_else(not_an_item)?;
        let array = self.tree.get(array_id);
        let NodeKind::Array { items } = &array.kind else {
            return Err(not_an_item());
        };
        let index = items.iter().position(|i| *i == id).ok_or_else(not_an_item)?;
        let count = items.len();
        let array_path = array.path.clone();

        if count <= array.schema.min_items() {
            let leaves = self.tree.leaves(id);
            for leaf in &leaves {
                let node = self.tree.get_mut(*leaf);
                let multiselect = node.multiselect;
                if let Some(input) = node.input_mut() {
                    input.value = InputValue::cleared(multiselect);
                }
                node.file_key = None;
                self.file_keys.remove(&node.path);
            }
            self.invalidate_dependents(&leaves);
            info!("{array_path} is at its minimum length, cleared {item_path} instead");
            return Ok(false);
        }

        let mut values = self.live_values();
        let schema_name = pointer::root(&array_path);
        let location = &array_path[schema_name.len()..];
        if let Some(list) = values
            .get_mut(schema_name)
            .and_then(|v| v.pointer_mut(location))
            .and_then(Value::as_array_mut)
        {
            if index < list.len() {
                list.remove(index);
            }
        }
        self.shift_file_keys(&array_path, index);
        self.rebuild_with(values, HashMap::new());
        debug!("removed item {item_path}");
        Ok(true)
    }

    /// Move upload keys of items after `removed` down by one index.
    fn shift_file_keys(&mut self, array_path: &str, removed: usize) {
        let prefix = format!("{array_path}/");
        self.file_keys = std::mem::take(&mut self.file_keys)
            .into_iter()
            .filter_map(|(path, key)| {
                let moved = match path.strip_prefix(&prefix) {
                    None => Some(path.clone()),
                    Some(rest) => {
                        let (index, tail) = rest.split_once('/').unwrap_or((rest, ""));
                        match index.parse::<usize>() {
                            Ok(i) if i == removed => None,
                            Ok(i) if i > removed => {
                                let mut p = pointer::join_index(array_path, i - 1);
                                if !tail.is_empty() {
                                    p.push('/');
                                    p.push_str(tail);
                                }
                                Some(p)
                            }
                            _ => Some(path.clone()),
                        }
                    }
                };
                moved.map(|p| (p, key))
            })
            .collect();
    }

    /// Record an uploaded file for a file field.
    pub fn attach_file(&mut self, path: &str, filename: &str, file_key: &str) -> Result<()> {
        self.ensure_open()?;
        let id = self.leaf_at(path)?;
        let node = self.tree.get_mut(id);
        if !node.is_file {
            return Err(FormError::WrongNodeKind {
                path: path.to_string(),
                expected: "a file field",
            });
        }
        node.file_key = Some(file_key.to_string());
        if let Some(input) = node.input_mut() {
            input.value = InputValue::Single(Value::String(filename.to_string()));
        }
        self.file_keys.insert(path.to_string(), file_key.to_string());
        self.invalidate_dependents(&[id]);
        Ok(())
    }

    pub fn set_categories(&mut self, categories: Vec<String>) -> Result<()> {
        self.ensure_open()?;
        self.instance.data.categories = categories;
        Ok(())
    }

    pub fn set_freetext(&mut self, freetext: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.instance.data.freetext = freetext.into();
        Ok(())
    }

    /// Attach schemas by name, fetching the ones not yet loaded in one batch.
    ///
    /// Either all requested schemas are attached or none is. Returns the
    /// names that were newly attached.
    pub async fn attach_schemas(
        &mut self,
        names: &[String],
        store: &dyn SchemaStore,
    ) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut missing: Vec<String> = Vec::new();
        for name in names {
            if self.schema(name).is_none() && !missing.contains(name) {
                missing.push(name.clone());
            }
        }
        if missing.is_empty() {
            return Ok(missing);
        }

        let mut raw = store.get_schemas(&missing).await?;
        if let Some(unknown) = missing.iter().find(|n| !raw.contains_key(*n)) {
            warn!("cannot attach unknown schema {unknown}");
            return Err(FormError::SchemaNotFound(unknown.clone()));
        }
        let documents = missing
            .iter()
            .filter_map(|name| raw.remove(name).map(|fetched| document_of(name, fetched)))
            .collect();
        self.attach_documents(documents);
        Ok(missing)
    }

    /// Attach an already parsed schema. Attaching a schema twice is a no-op.
    pub fn attach_schema(&mut self, doc: SchemaDocument) -> Result<()> {
        self.ensure_open()?;
        if self.schema(&doc.name).is_some() {
            debug!("schema {} is already attached", doc.name);
            return Ok(());
        }
        self.attach_documents(vec![doc]);
        Ok(())
    }

    fn attach_documents(&mut self, documents: Vec<SchemaDocument>) {
        let values = self.live_values();
        for doc in documents {
            info!("attaching schema {} to form {}", doc.name, self.instance.form_id);
            self.new_schemas.insert(doc.name.clone());
            self.instance.schema_names.push(doc.name.clone());
            self.documents.push(doc);
        }
        self.rebuild_with(values, HashMap::new());
    }

    /// Detach a schema. Its fields leave the model and the submission.
    pub fn detach_schema(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let pos = self
            .documents
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| FormError::SchemaNotFound(name.to_string()))?;
        let values = self.live_values();
        info!("detaching schema {name} from form {}", self.instance.form_id);
        self.documents.remove(pos);
        self.instance.schema_names.retain(|n| n != name);
        self.new_schemas.remove(name);
        self.anomalies.retain(|a| pointer::root(&a.path) != name);
        if self.active_panel.as_deref() == Some(name) {
            self.active_panel = None;
        }
        if let Some(outcome) = &mut self.last_validation {
            outcome.reports.retain(|r| r.schema_name != name);
        }
        self.rebuild_with(values, HashMap::new());
        Ok(())
    }

    /// Flatten every attached schema, or one.
    pub fn flatten(&self, schema_name: Option<&str>) -> FlattenMap {
        flatten::flatten(&self.tree, schema_name)
    }

    /// Validate the attached schemas in panel order, stopping at the first
    /// failure. The failing schema's panel becomes the active panel.
    pub fn validate(&mut self) -> Result<ValidationOutcome> {
        self.ensure_open()?;
        let validator = Validator::new(self.creating());
        let docs: Vec<&SchemaDocument> = self.documents.iter().collect();
        let outcome = validator.validate_schemas(&docs, &mut self.tree);
        if let Some(failed) = &outcome.failed_schema {
            self.active_panel = Some(failed.clone());
        }
        self.last_validation = Some(outcome.clone());
        Ok(outcome)
    }

    fn metadata(&self) -> FormMetadata {
        FormMetadata {
            categories: self.instance.data.categories.clone(),
            freetext: self.instance.data.freetext.clone(),
            layout: self.layout(),
            files: self.file_keys.clone(),
        }
    }

    /// Fill empty fields that declare a `valueFormula`.
    fn apply_value_formulas(&self, flat: &mut FlattenMap) {
        let snapshot = flat.clone();
        for id in self.tree.all_leaves() {
            let node = self.tree.get(id);
            let Some(formula) = node.schema.wiki.value_formula.as_deref() else {
                continue;
            };
            if !node.value().is_none_or(InputValue::is_blank) {
                continue;
            }
            let text = query::resolve_template(formula, &self.tree, node, &snapshot, "");
            if let Some(entry) = flat.get_mut(&node.path) {
                entry.value = flatten::coerce(
                    &node.schema,
                    &InputValue::Single(Value::String(text)),
                    node.multiselect,
                );
            }
        }
    }

    /// Payload carrying the data of every attached schema.
    pub fn submission(&self, action: FormAction) -> SubmitRequest {
        let mut flat = self.flatten(None);
        self.apply_value_formulas(&mut flat);
        let data: Map<String, Value> = self
            .tree
            .roots()
            .map(|(name, root)| {
                (
                    name.to_string(),
                    flatten::value_tree(&self.tree, root, &flat, ValueMode::Submit),
                )
            })
            .collect();
        SubmitRequest {
            form_id: self.instance.form_id.clone(),
            schema_names: self.instance.schema_names.clone(),
            flattened_data: Value::Object(data),
            form_metadata: self.metadata(),
            action,
        }
    }

    /// Payload deleting the attached schemas' data.
    pub fn delete_request(&self) -> SubmitRequest {
        SubmitRequest {
            form_id: self.instance.form_id.clone(),
            schema_names: self.instance.schema_names.clone(),
            flattened_data: Value::Object(Map::new()),
            form_metadata: self.metadata(),
            action: FormAction::Delete,
        }
    }

    /// Read the model in one of the accessor modes.
    pub fn get_model(&mut self, action: ModelAction) -> Result<ModelOutput> {
        self.ensure_open()?;
        let output = match action {
            ModelAction::Fetch => ModelOutput::Flatten(self.flatten(None)),
            ModelAction::Schema(name) => {
                if self.schema(&name).is_none() {
                    return Err(FormError::SchemaNotFound(name));
                }
                ModelOutput::Flatten(self.flatten(Some(&name)))
            }
            ModelAction::Validate => ModelOutput::Validation(self.validate()?),
            ModelAction::Submit => ModelOutput::Submission(self.submission(self.action())),
            ModelAction::ValidateAndSubmit => {
                let outcome = self.validate()?;
                if outcome.valid {
                    ModelOutput::Submission(self.submission(self.action()))
                } else {
                    ModelOutput::Validation(outcome)
                }
            }
            ModelAction::Delete => ModelOutput::Submission(self.delete_request()),
        };
        Ok(output)
    }

    /// Issue a lookup for a field whose schema declares `askQuery`.
    pub fn begin_lookup(&mut self, path: &str, typed: &str) -> Result<LookupTicket> {
        self.ensure_open()?;
        let id = self.leaf_at(path)?;
        let node = self.tree.get(id);
        let flat = self.flatten(Some(node.schema_name()));
        let request = query::build_request(&node.schema, &self.tree, node, &flat, typed).ok_or_else(|| {
            FormError::WrongNodeKind {
                path: path.to_string(),
                expected: "a lookup field",
            }
        })?;
        let seq = self.lookups.issue(path);
        debug!("lookup #{seq} for {path}: {}", request.query);
        Ok(LookupTicket {
            path: path.to_string(),
            seq,
            request,
        })
    }

    /// Apply the response to a lookup.
    ///
    /// Returns `Ok(None)` when the response is stale (a newer request was
    /// issued for the field) or the session was closed meanwhile.
    pub fn finish_lookup(
        &mut self,
        ticket: &LookupTicket,
        response: Result<LookupOptions>,
    ) -> Result<Option<LookupOptions>> {
        if self.closed {
            debug!("form closed, dropping lookup #{} for {}", ticket.seq, ticket.path);
            return Ok(None);
        }
        if !self.lookups.is_latest(&ticket.path, ticket.seq) {
            debug!("dropping stale lookup #{} for {}", ticket.seq, ticket.path);
            return Ok(None);
        }
        match response {
            Ok(options) => {
                self.lookup_results
                    .insert(ticket.path.clone(), options.clone());
                Ok(Some(options))
            }
            Err(e) => {
                warn!("lookup for {} failed: {e}", ticket.path);
                Err(match e {
                    FormError::Lookup(msg) => FormError::Lookup(msg),
                    other => FormError::Lookup(other.to_string()),
                })
            }
        }
    }

    /// Run a dependent lookup for a field against `service`.
    pub async fn perform_query(
        &mut self,
        path: &str,
        typed: &str,
        service: &dyn LookupService,
    ) -> Result<Option<LookupOptions>> {
        let ticket = self.begin_lookup(path, typed)?;
        let response = service.lookup(&ticket.request).await;
        self.finish_lookup(&ticket, response)
    }

    /// Render the panels of the attached schemas.
    pub fn panels(&self) -> Vec<Panel> {
        view::panels(self)
    }

    /// Close the form. The model is discarded and late lookups are ignored.
    pub fn close(&mut self) {
        if !self.closed {
            info!("closing form {}", self.instance.form_id);
        }
        self.closed = true;
        self.tree = ModelTree::new();
        self.lookups.reset();
        self.lookup_results.clear();
    }
}

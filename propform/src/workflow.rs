//! Validate → submit workflow.
//!
//! With a single attached schema the form has one step: validate and submit
//! run together. With several schemas validation is a separate phase; once
//! every schema validates the user may submit or go back to editing. Going
//! back leaves the model untouched.
//!
//! ```text
//! editing ──validate──▶ validating ──▶ validated ──submit──▶ submitting ──▶ done
//!    ▲                      │              │                     │
//!    └──────── invalid ─────┘   go back ───┘        error ◀──────┘
//! editing ──delete──▶ deleting ──▶ done
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{FormError, Result},
    session::{FormAction, FormMetadata, FormSession},
    validate::ValidationOutcome,
};

/// Payload sent to the persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub form_id: String,
    pub schema_names: Vec<String>,
    /// Value tree per schema name.
    pub flattened_data: Value,
    pub form_metadata: FormMetadata,
    pub action: FormAction,
}

/// Answer of the persistence service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitResponse {
    /// Rejection messages; empty on success.
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// Stores submitted forms.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Editing,
    Validating,
    Validated,
    Submitting,
    Deleting,
    Done,
    Error,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Editing => "editing",
            WorkflowState::Validating => "validating",
            WorkflowState::Validated => "validated",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Deleting => "deleting",
            WorkflowState::Done => "done",
            WorkflowState::Error => "error",
        };
        f.write_str(name)
    }
}

/// User actions offered by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowAction {
    Validate,
    Submit,
    ValidateAndSubmit,
    GoBack,
    Delete,
}

impl WorkflowAction {
    pub fn name(self) -> &'static str {
        match self {
            WorkflowAction::Validate => "validate",
            WorkflowAction::Submit => "submit",
            WorkflowAction::ValidateAndSubmit => "validate&submit",
            WorkflowAction::GoBack => "go back",
            WorkflowAction::Delete => "delete",
        }
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub action: WorkflowAction,
}

/// Result of [`WorkflowController::validate_and_submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Invalid(ValidationOutcome),
    Done(SubmitResponse),
}

/// Drives one form session through the workflow.
#[derive(Debug, Clone)]
pub struct WorkflowController {
    state: WorkflowState,
    history: Vec<Transition>,
    errors: Vec<String>,
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowController {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Editing,
            history: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Every transition so far, oldest first.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Messages of the last rejected submission.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Actions offered in the current state.
    pub fn available_actions(&self, session: &FormSession) -> Vec<WorkflowAction> {
        match self.state {
            WorkflowState::Editing => {
                let mut actions = if session.schema_names().len() > 1 {
                    vec![WorkflowAction::Validate]
                } else {
                    vec![WorkflowAction::ValidateAndSubmit]
                };
                if session.action() != FormAction::Create && session.has_stored_data() {
                    actions.push(WorkflowAction::Delete);
                }
                actions
            }
            WorkflowState::Validated => vec![WorkflowAction::Submit, WorkflowAction::GoBack],
            _ => Vec::new(),
        }
    }

    fn ensure_available(&self, session: &FormSession, action: WorkflowAction) -> Result<()> {
        if self.available_actions(session).contains(&action) {
            Ok(())
        } else {
            Err(FormError::InvalidTransition {
                from: self.state,
                action: action.name(),
            })
        }
    }

    fn transition(&mut self, to: WorkflowState, action: WorkflowAction) {
        info!("workflow: {} -> {to} ({})", self.state, action.name());
        self.history.push(Transition {
            from: self.state,
            to,
            action,
        });
        self.state = to;
    }

    /// Validate every attached schema (multi-schema forms).
    pub fn validate(&mut self, session: &mut FormSession) -> Result<ValidationOutcome> {
        self.ensure_available(session, WorkflowAction::Validate)?;
        self.transition(WorkflowState::Validating, WorkflowAction::Validate);
        let outcome = match session.validate() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(WorkflowState::Editing, WorkflowAction::Validate);
                return Err(e);
            }
        };
        let next = if outcome.valid {
            WorkflowState::Validated
        } else {
            WorkflowState::Editing
        };
        self.transition(next, WorkflowAction::Validate);
        Ok(outcome)
    }

    /// Return to editing after a successful validation. Entered values stay.
    pub fn go_back(&mut self, session: &FormSession) -> Result<()> {
        self.ensure_available(session, WorkflowAction::GoBack)?;
        self.transition(WorkflowState::Editing, WorkflowAction::GoBack);
        Ok(())
    }

    /// Submit a validated multi-schema form.
    ///
    /// A rejected submission returns the workflow to `validated` and fails
    /// with [`FormError::Submission`]; it is not retried.
    pub async fn submit(
        &mut self,
        session: &FormSession,
        persistence: &dyn PersistenceService,
    ) -> Result<SubmitResponse> {
        self.ensure_available(session, WorkflowAction::Submit)?;
        let request = session.submission(session.action());
        self.transition(WorkflowState::Submitting, WorkflowAction::Submit);
        self.send(&request, persistence, WorkflowState::Validated, WorkflowAction::Submit)
            .await
    }

    /// Validate, then submit on success (single-schema forms).
    pub async fn validate_and_submit(
        &mut self,
        session: &mut FormSession,
        persistence: &dyn PersistenceService,
    ) -> Result<SubmitOutcome> {
        let action = WorkflowAction::ValidateAndSubmit;
        self.ensure_available(session, action)?;
        self.transition(WorkflowState::Validating, action);
        let outcome = match session.validate() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(WorkflowState::Editing, action);
                return Err(e);
            }
        };
        if !outcome.valid {
            self.transition(WorkflowState::Editing, action);
            return Ok(SubmitOutcome::Invalid(outcome));
        }

        let request = session.submission(session.action());
        self.transition(WorkflowState::Submitting, action);
        let response = self
            .send(&request, persistence, WorkflowState::Editing, action)
            .await?;
        Ok(SubmitOutcome::Done(response))
    }

    /// Delete the stored data of the attached schemas.
    pub async fn delete(
        &mut self,
        session: &FormSession,
        persistence: &dyn PersistenceService,
        confirmed: bool,
    ) -> Result<SubmitResponse> {
        let action = WorkflowAction::Delete;
        self.ensure_available(session, action)?;
        if !confirmed {
            return Err(FormError::ConfirmationRequired);
        }
        let request = session.delete_request();
        self.transition(WorkflowState::Deleting, action);
        self.send(&request, persistence, WorkflowState::Editing, action)
            .await
    }

    async fn send(
        &mut self,
        request: &SubmitRequest,
        persistence: &dyn PersistenceService,
        fallback: WorkflowState,
        action: WorkflowAction,
    ) -> Result<SubmitResponse> {
        let errors = match persistence.submit(request).await {
            Ok(response) if response.errors.is_empty() => {
                info!("form {} stored ({:?})", request.form_id, request.action);
                self.errors.clear();
                self.transition(WorkflowState::Done, action);
                return Ok(response);
            }
            Ok(response) => response.errors,
            Err(e) => vec![e.to_string()],
        };

        warn!(
            "form {} rejected: {}",
            request.form_id,
            errors.join("; ")
        );
        self.transition(WorkflowState::Error, action);
        self.errors = errors.clone();
        self.transition(fallback, action);
        Err(FormError::Submission(errors))
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
    use std::sync::Mutex;

    /// Persistence double recording requests and answering with canned errors.
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<SubmitRequest>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl PersistenceService for Recorder {
        async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(SubmitResponse {
                errors: self.reject.clone(),
                redirect_url: Some(format!("/wiki/{}", request.form_id)),
            })
        }
    }

    fn string_schema(field: &str) -> serde_json::Value {
        json!({"type": "object", "properties": {
            field: {"type": "string", "wiki": {"required": true}}
        }})
    }

    fn session(names: &[&str], data: serde_json::Value) -> FormSession {
        let docs = names
            .iter()
            .map(|n| SchemaDocument::parse(n, string_schema("name")).unwrap())
            .collect();
        FormSession::from_parts(
            FormInstance {
                form_id: "Item:1".into(),
                data: FormData {
                    schemas: data.as_object().cloned().unwrap_or_default(),
                    ..Default::default()
                },
                ..Default::default()
            },
            docs,
        )
    }

    fn states(wf: &WorkflowController) -> Vec<WorkflowState> {
        wf.history().iter().map(|t| t.to).collect()
    }

    #[tokio::test]
    async fn test_two_valid_schemas_go_back_and_submit() {
        let mut s = session(&["A", "B"], json!({"A": {"name": "a"}, "B": {"name": "b"}}));
        let mut wf = WorkflowController::new();
        assert_eq!(
            wf.available_actions(&s),
            vec![WorkflowAction::Validate, WorkflowAction::Delete]
        );

        s.set_value("A/name", json!("edited")).unwrap();
        let outcome = wf.validate(&mut s).unwrap();
        assert!(outcome.valid);
        assert_eq!(wf.state(), WorkflowState::Validated);
        assert_eq!(
            wf.available_actions(&s),
            vec![WorkflowAction::Submit, WorkflowAction::GoBack]
        );

        let before = s.tree().len();
        wf.go_back(&s).unwrap();
        assert_eq!(wf.state(), WorkflowState::Editing);
        assert_eq!(s.tree().len(), before);
        assert_eq!(s.value("A/name"), Some(&crate::data::InputValue::Single(json!("edited"))));

        wf.validate(&mut s).unwrap();
        let recorder = Recorder::default();
        let response = wf.submit(&s, &recorder).await.unwrap();
        assert_eq!(response.redirect_url.as_deref(), Some("/wiki/Item:1"));
        assert_eq!(wf.state(), WorkflowState::Done);
        assert_eq!(
            states(&wf),
            vec![
                WorkflowState::Validating,
                WorkflowState::Validated,
                WorkflowState::Editing,
                WorkflowState::Validating,
                WorkflowState::Validated,
                WorkflowState::Submitting,
                WorkflowState::Done
            ]
        );
        let sent = recorder.requests.lock().unwrap();
        assert_eq!(sent[0].flattened_data["A"]["name"], json!("edited"));
        assert_eq!(sent[0].action, FormAction::Edit);
    }

    #[tokio::test]
    async fn test_invalid_first_schema_stops_validation() {
        let mut s = session(&["A", "B"], json!({"A": {"name": ""}, "B": {}}));
        let mut wf = WorkflowController::new();
        let outcome = wf.validate(&mut s).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.failed_schema.as_deref(), Some("A"));
        assert_eq!(wf.state(), WorkflowState::Editing);

        let recorder = Recorder::default();
        let err = wf.submit(&s, &recorder).await.unwrap_err();
        assert!(matches!(
            err,
            FormError::InvalidTransition {
                from: WorkflowState::Editing,
                action: "submit"
            }
        ));
        assert_eq!(wf.state(), WorkflowState::Editing);
    }

    #[tokio::test]
    async fn test_single_schema_is_one_step() {
        let mut s = session(&["A"], json!({}));
        let mut wf = WorkflowController::new();
        // nothing stored yet, so delete is not offered
        assert_eq!(
            wf.available_actions(&s),
            vec![WorkflowAction::ValidateAndSubmit]
        );
        assert!(wf.validate(&mut s).is_err());

        let recorder = Recorder::default();
        let outcome = wf.validate_and_submit(&mut s, &recorder).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
        assert!(recorder.requests.lock().unwrap().is_empty());

        s.set_value("A/name", json!("x")).unwrap();
        let outcome = wf.validate_and_submit(&mut s, &recorder).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Done(_)));
        assert_eq!(wf.state(), WorkflowState::Done);
        assert!(wf.available_actions(&s).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_returns_to_validated() {
        let mut s = session(&["A", "B"], json!({"A": {"name": "a"}, "B": {"name": "b"}}));
        let mut wf = WorkflowController::new();
        wf.validate(&mut s).unwrap();
        let recorder = Recorder {
            reject: vec!["Page is protected".into()],
            ..Default::default()
        };
        let err = wf.submit(&s, &recorder).await.unwrap_err();
        assert!(matches!(err, FormError::Submission(ref e) if e == &["Page is protected".to_string()]));
        assert_eq!(wf.state(), WorkflowState::Validated);
        assert_eq!(wf.errors(), ["Page is protected".to_string()]);
        let tail: Vec<_> = states(&wf).into_iter().rev().take(3).collect();
        assert_eq!(
            tail,
            vec![
                WorkflowState::Validated,
                WorkflowState::Error,
                WorkflowState::Submitting
            ]
        );
        // one round trip, no retry
        assert_eq!(recorder.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_single_schema_returns_to_editing() {
        let mut s = session(&["A"], json!({"A": {"name": "a"}}));
        let mut wf = WorkflowController::new();
        let recorder = Recorder {
            reject: vec!["nope".into()],
            ..Default::default()
        };
        assert!(wf.validate_and_submit(&mut s, &recorder).await.is_err());
        assert_eq!(wf.state(), WorkflowState::Editing);
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let s = session(&["A"], json!({"A": {"name": "a"}}));
        let mut wf = WorkflowController::new();
        let recorder = Recorder::default();

        let err = wf.delete(&s, &recorder, false).await.unwrap_err();
        assert!(matches!(err, FormError::ConfirmationRequired));
        assert_eq!(wf.state(), WorkflowState::Editing);
        assert!(wf.history().is_empty());

        wf.delete(&s, &recorder, true).await.unwrap();
        assert_eq!(
            states(&wf),
            vec![WorkflowState::Deleting, WorkflowState::Done]
        );
        let sent = recorder.requests.lock().unwrap();
        assert_eq!(sent[0].action, FormAction::Delete);
        assert_eq!(sent[0].flattened_data, json!({}));
    }
}

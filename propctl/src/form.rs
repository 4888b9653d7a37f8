//! Form commands.
//!
//! Every command opens the configured form, applies the `--set` assignments
//! given on the command line and then shows, validates, submits or deletes
//! it. Output is rendered as colored text or JSON.

use std::{fmt::Write as _, path::PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde_json::{Map, Value};

use propform::{
    FieldView, FormInstance, FormSession, LookupService, Panel, SubmitOutcome, SubmitResponse,
    ValidationOutcome, Validator, WorkflowController,
    view::FieldRole,
};

use crate::{
    config::PropctlConfig,
    ctx::{AppContext, store_from_files},
    utils::parse_assignment,
};

/// Output format of `show`, `fetch` and `validate`.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options shared by the form commands.
#[derive(Debug, Clone, Default)]
pub struct FormArgs {
    /// Extra schemas to attach, in order.
    pub attach: Vec<String>,
    /// `PATH=VALUE` assignments applied after opening.
    pub set: Vec<String>,
}

/// Handler for form commands.
pub struct FormCommandHandler;

impl FormCommandHandler {
    /// Open the form and apply the assignments.
    pub async fn prepare(ctx: &AppContext, args: &FormArgs) -> Result<FormSession> {
        let mut session = ctx.open_session(&args.attach).await?;
        for assignment in &args.set {
            let (path, value) = parse_assignment(assignment)?;
            let cleared = session.set_value(&path, value)?;
            for dependent in cleared {
                info!("cleared {dependent}, it depends on {path}");
            }
        }
        Ok(session)
    }

    /// Print the panels of the form.
    pub async fn handle_show(ctx: &AppContext, args: &FormArgs, format: OutputFormat) -> Result<()> {
        let session = Self::prepare(ctx, args).await?;
        let panels = session.panels();
        match format {
            OutputFormat::Text => print!("{}", render_panels(&panels)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&panels)?),
        }
        Ok(())
    }

    /// Print the flattened values, optionally of one schema only.
    pub async fn handle_fetch(
        ctx: &AppContext,
        args: &FormArgs,
        schema: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        let session = Self::prepare(ctx, args).await?;
        if let Some(name) = &schema
            && session.schema(name).is_none()
        {
            bail!("schema {name} is not attached to {}", session.form_id());
        }
        let flat = session.flatten(schema.as_deref());
        match format {
            OutputFormat::Text => {
                for (path, entry) in &flat {
                    println!("{} = {}", path.cyan(), entry.value);
                }
            }
            OutputFormat::Json => {
                let values: Map<String, Value> = flat
                    .into_iter()
                    .map(|(path, entry)| (path, entry.value))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            }
        }
        Ok(())
    }

    /// Validate every attached schema. Fails when the data is invalid.
    pub async fn handle_validate(
        ctx: &AppContext,
        args: &FormArgs,
        format: OutputFormat,
    ) -> Result<()> {
        let mut session = Self::prepare(ctx, args).await?;
        let outcome = session.validate()?;
        match format {
            OutputFormat::Text => print!("{}", render_outcome(&outcome)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        }
        if !outcome.valid {
            bail!("validation failed");
        }
        Ok(())
    }

    /// Validate and store the form.
    pub async fn handle_submit(ctx: &AppContext, args: &FormArgs) -> Result<()> {
        let mut session = Self::prepare(ctx, args).await?;
        let persistence = ctx.persistence();
        let mut workflow = WorkflowController::new();

        let response = if session.schema_names().len() > 1 {
            let outcome = workflow.validate(&mut session)?;
            if !outcome.valid {
                print!("{}", render_outcome(&outcome));
                bail!("validation failed");
            }
            workflow.submit(&session, &persistence).await?
        } else {
            match workflow.validate_and_submit(&mut session, &persistence).await? {
                SubmitOutcome::Invalid(outcome) => {
                    print!("{}", render_outcome(&outcome));
                    bail!("validation failed");
                }
                SubmitOutcome::Done(response) => response,
            }
        };
        report_stored(&session, &response);
        session.close();
        Ok(())
    }

    /// Delete the stored data of the form. Requires `confirmed`.
    pub async fn handle_delete(ctx: &AppContext, args: &FormArgs, confirmed: bool) -> Result<()> {
        let session = Self::prepare(ctx, args).await?;
        let persistence = ctx.persistence();
        let mut workflow = WorkflowController::new();
        if !confirmed {
            println!(
                "{}",
                format!("Deleting {} can not be undone, pass --yes to confirm", session.form_id())
                    .yellow()
            );
        }
        workflow.delete(&session, &persistence, confirmed).await?;
        println!("{}", format!("Deleted {}", session.form_id()).green());
        Ok(())
    }

    /// Run the dependent lookup of a field and print its options.
    pub async fn handle_lookup(
        ctx: &AppContext,
        args: &FormArgs,
        path: &str,
        typed: &str,
    ) -> Result<()> {
        let mut session = Self::prepare(ctx, args).await?;
        let service = ctx.lookup_service().await?;
        let ticket = session.begin_lookup(path, typed)?;
        println!("{} {}", "query:".bold(), ticket.request.query);
        let response = service.lookup(&ticket.request).await;
        let Some(options) = session.finish_lookup(&ticket, response)? else {
            bail!("lookup for {path} was superseded");
        };
        if options.is_empty() {
            println!("{}", "no options".yellow());
        }
        for (value, label) in &options {
            println!("  {} {}", value.cyan(), label);
        }
        Ok(())
    }

    /// Check schema files: parse errors and whether they compile.
    pub async fn handle_check(files: &[PathBuf]) -> Result<()> {
        let (store, names) = store_from_files(files).await?;
        let instance = FormInstance {
            form_id: "check".into(),
            schema_names: names,
            ..Default::default()
        };
        let session = FormSession::open(instance, &store).await?;
        let validator = Validator::new(true);

        let mut failed = 0;
        for doc in session.documents() {
            let mut problems: Vec<String> =
                doc.malformed().iter().map(|e| e.to_string()).collect();
            if let Err(e) = validator.compile(doc) {
                problems.push(e.to_string());
            }
            if problems.is_empty() {
                println!("{} {}", "ok".green().bold(), doc.name);
            } else {
                failed += 1;
                println!("{} {}", "failed".red().bold(), doc.name);
                for problem in problems {
                    println!("  {problem}");
                }
            }
        }
        if failed > 0 {
            bail!("{failed} schema(s) failed the check");
        }
        Ok(())
    }

    /// Print the JSON Schema of `.propctl.toml`.
    pub fn handle_config_schema() -> Result<()> {
        println!("{}", PropctlConfig::json_schema()?);
        Ok(())
    }
}

fn report_stored(session: &FormSession, response: &SubmitResponse) {
    let target = response
        .redirect_url
        .as_deref()
        .unwrap_or("the persistence service");
    println!(
        "{}",
        format!("Stored {} in {target}", session.form_id()).green()
    );
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_field(out: &mut String, field: &FieldView) {
    let indent = "  ".repeat(field.depth + 1);
    let marker = if field.required { "*" } else { "" };
    match field.role {
        FieldRole::Group => {
            let _ = writeln!(out, "{indent}{}{marker}", field.label.bold());
        }
        FieldRole::Item => {
            let _ = writeln!(out, "{indent}{}", field.label.dimmed());
        }
        FieldRole::Content => {
            let text = field.content.as_deref().unwrap_or_default();
            let _ = writeln!(out, "{indent}{}", text.italic());
        }
        FieldRole::Field => {
            let input = field
                .input
                .and_then(|kind| serde_json::to_value(kind).ok())
                .map(|kind| render_value(&kind))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{indent}{}{marker} [{input}] = {}",
                field.label,
                render_value(&field.value).cyan()
            );
            if !field.options.is_empty() {
                let options: Vec<&str> = field.options.iter().map(|o| o.label.as_str()).collect();
                let _ = writeln!(out, "{indent}  options: {}", options.join(", ").dimmed());
            }
            if let Some(key) = &field.file_key {
                let _ = writeln!(out, "{indent}  file: {key}");
            }
        }
    }
    for error in &field.errors {
        let _ = writeln!(out, "{indent}  {} {error}", "error:".red());
    }
}

/// Text rendering of panels.
pub fn render_panels(panels: &[Panel]) -> String {
    let mut out = String::new();
    for panel in panels {
        let title = if panel.active {
            format!("== {} ==", panel.title).bold().to_string()
        } else {
            format!("-- {} --", panel.title)
        };
        let _ = writeln!(out, "{title}");
        for message in &panel.banner {
            let _ = writeln!(out, "  {} {message}", "!".red().bold());
        }
        for field in &panel.fields {
            render_field(&mut out, field);
        }
    }
    out
}

/// Text rendering of a validation pass.
pub fn render_outcome(outcome: &ValidationOutcome) -> String {
    let mut out = String::new();
    for report in &outcome.reports {
        let status = if report.valid {
            "valid".green().to_string()
        } else {
            "invalid".red().to_string()
        };
        let _ = writeln!(out, "{}: {status}", report.schema_name.bold());
        for message in &report.banner {
            let _ = writeln!(out, "  {message}");
        }
        for error in &report.errors {
            let at = error.path.as_deref().unwrap_or(&error.instance_path);
            let _ = writeln!(out, "  {at}: {}", error.message);
        }
    }
    if let Some(schema) = &outcome.failed_schema {
        let _ = writeln!(out, "{}", format!("Fix {schema} before submitting").yellow());
    }
    out
}

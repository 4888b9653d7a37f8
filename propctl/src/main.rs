use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

use propctl::{
    ctx::AppContext,
    form::{FormArgs, FormCommandHandler, OutputFormat},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace directory, defaults to the current directory
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Configuration file, defaults to `.propctl.toml` in the workspace
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Attach an extra schema to the form (repeatable)
    #[arg(short, long, global = true)]
    attach: Vec<String>,

    /// Set a field before running the command, as `PATH=VALUE` (repeatable)
    #[arg(short, long, global = true)]
    set: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the panels of the form
    Show {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the flattened field values
    Fetch {
        /// Only this schema
        #[arg(long)]
        schema: Option<String>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate every attached schema
    Validate {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate and store the form
    Submit,
    /// Delete the stored data of the form
    Delete {
        /// Confirm the deletion
        #[arg(short, long)]
        yes: bool,
    },
    /// Run the dependent lookup of a field
    Lookup {
        /// Field path, e.g. `Album/artist`
        path: String,
        /// Text typed into the field
        #[arg(long, default_value = "")]
        typed: String,
    },
    /// Check schema files
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the JSON Schema of the configuration file
    ConfigSchema,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Check { files } => return FormCommandHandler::handle_check(files).await,
        Commands::ConfigSchema => return FormCommandHandler::handle_config_schema(),
        _ => {}
    }

    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    debug!("workspace: {}", workspace.display());
    let ctx = AppContext::load(workspace, cli.config).await?;
    let args = FormArgs {
        attach: cli.attach,
        set: cli.set,
    };

    match cli.command {
        Commands::Show { format } => FormCommandHandler::handle_show(&ctx, &args, format).await,
        Commands::Fetch { schema, format } => {
            FormCommandHandler::handle_fetch(&ctx, &args, schema, format).await
        }
        Commands::Validate { format } => {
            FormCommandHandler::handle_validate(&ctx, &args, format).await
        }
        Commands::Submit => FormCommandHandler::handle_submit(&ctx, &args).await,
        Commands::Delete { yes } => FormCommandHandler::handle_delete(&ctx, &args, yes).await,
        Commands::Lookup { path, typed } => {
            FormCommandHandler::handle_lookup(&ctx, &args, &path, &typed).await
        }
        Commands::Check { .. } | Commands::ConfigSchema => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

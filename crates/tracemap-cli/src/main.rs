mod cmd;
mod output;
mod render;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, template::TemplateSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tracemap",
    about = "Reconcile automation execution traces against their workflow templates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .tracemap/ or .git/)
    #[arg(long, global = true, env = "TRACEMAP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log reconciliation decisions to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize tracemap in the current project
    Init,

    /// Inspect workflow templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },

    /// Show which template an endpoint or trigger name maps to
    Resolve {
        /// Endpoint path or trigger key
        endpoint: String,
        /// Inbound payload (JSON) used by alias rules
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Annotate a template with one captured execution
    Reconcile {
        /// Trace bundle file: {"trace": {...}, "steps": [...]}
        bundle: PathBuf,
        /// Trigger key (default: taken from the trace)
        #[arg(long)]
        trigger: Option<String>,
        /// Result classifier provider (default: the trace's, then the configured default)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Template { subcommand } => cmd::template::run(&root, subcommand, cli.json),
        Commands::Resolve { endpoint, payload } => {
            cmd::resolve::run(&root, &endpoint, payload.as_deref(), cli.json)
        }
        Commands::Reconcile {
            bundle,
            trigger,
            provider,
        } => cmd::reconcile::run(
            &root,
            &bundle,
            trigger.as_deref(),
            provider.as_deref(),
            cli.json,
        ),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

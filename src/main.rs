use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repodoc::cli::commands::docs::{DocumentSelector, PublishArgs};
use repodoc::cli::commands::synthesize::SynthesizeArgs;
use repodoc::{DocumentKind, SelectionMode};

#[derive(Parser)]
#[command(name = "repodoc")]
#[command(
    version,
    about = "Synthesizes documentation from a hosted repository and publishes it back"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a document for a repository and commit it to the branch
    Synthesize {
        #[arg(help = "Repository as owner/name")]
        repository: String,
        #[arg(long, short, default_value = "main", help = "Branch to read from and publish to")]
        branch: String,
        #[arg(
            long,
            short,
            default_value = "user-manual",
            help = "Document kind: user-manual, contributing-guide, project-structure, api-reference, overview"
        )]
        kind: DocumentKind,
        #[arg(long, short, help = "Repository path to publish to (default depends on kind)")]
        target: Option<String>,
        #[arg(long, short, help = "Selection mode: curated, full")]
        mode: Option<SelectionMode>,
        #[arg(long, help = "Maximum tokens per chunk")]
        max_tokens_per_chunk: Option<usize>,
        #[arg(long, help = "Maximum file size in bytes")]
        max_file_size: Option<u64>,
        #[arg(long, help = "Maximum publish attempts")]
        max_publish_retries: Option<u32>,
        #[arg(long, help = "Overall run timeout in seconds")]
        timeout_secs: Option<u64>,
        #[arg(long, help = "Commit message (default depends on kind)")]
        message: Option<String>,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "Source host token")]
        token: Option<String>,
        #[arg(long, env = "REPODOC_USER", default_value = "local", help = "User to record the document under")]
        user: String,
    },

    /// Inspect locally recorded documents or publish one again
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List recorded documents, most recent first
    List {
        #[arg(long, short, help = "Only documents of this user")]
        user: Option<String>,
    },
    /// Print one recorded document with its body
    Show {
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Commit a recorded document to its branch again
    Publish {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(long, help = "Commit message (default depends on kind)")]
        message: Option<String>,
        #[arg(long, help = "Maximum publish attempts")]
        max_publish_retries: Option<u32>,
        #[arg(long, help = "Overall timeout in seconds")]
        timeout_secs: Option<u64>,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "Source host token")]
        token: Option<String>,
    },
}

#[derive(clap::Args)]
struct DocumentArgs {
    #[arg(help = "Repository as owner/name")]
    repository: String,
    #[arg(long, short, default_value = "main")]
    branch: String,
    #[arg(long, short, default_value = "user-manual", help = "Document kind")]
    kind: DocumentKind,
    #[arg(long, short, env = "REPODOC_USER", default_value = "local", help = "User the document is recorded under")]
    user: String,
}

impl From<DocumentArgs> for DocumentSelector {
    fn from(args: DocumentArgs) -> Self {
        Self {
            repository: args.repository,
            branch: args.branch,
            kind: args.kind,
            user: args.user,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(long, help = "Print JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
    /// Write a default configuration file
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mrepodoc encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Synthesize {
            repository,
            branch,
            kind,
            target,
            mode,
            max_tokens_per_chunk,
            max_file_size,
            max_publish_retries,
            timeout_secs,
            message,
            token,
            user,
        } => {
            let code = repodoc::cli::commands::synthesize::run(SynthesizeArgs {
                repository,
                branch,
                kind,
                target,
                mode,
                max_tokens_per_chunk,
                max_file_size,
                max_publish_retries,
                timeout_secs,
                message,
                token,
                user,
            })?;
            return Ok(code);
        }
        Commands::Docs { action } => match action {
            DocsAction::List { user } => {
                repodoc::cli::commands::docs::list(user.as_deref())?;
            }
            DocsAction::Show { document } => {
                repodoc::cli::commands::docs::show(&document.into())?;
            }
            DocsAction::Publish {
                document,
                message,
                max_publish_retries,
                timeout_secs,
                token,
            } => {
                return Ok(repodoc::cli::commands::docs::publish(PublishArgs {
                    document: document.into(),
                    message,
                    max_publish_retries,
                    timeout_secs,
                    token,
                })?);
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                repodoc::cli::commands::config::show(json)?;
            }
            ConfigAction::Path => {
                repodoc::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                repodoc::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(0)
}

//! Command-line interface for the pyspace Python environment manager.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

pub use commands::Context;
pub use output::*;

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber. Later calls are ignored.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
/// with `--verbose`. Logs go to stderr so command output stays clean.
pub fn init_logging(verbose: bool) {
    LOGGING.get_or_init(|| {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(verbose)
            .with_file(verbose)
            .with_line_number(verbose)
            .try_init();
    });
}

/// CLI arguments parser
#[derive(Debug, Parser)]
#[command(name = "pyspace", author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use DIR instead of $PYSPACE_HOME or ~/.pyspace
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write pyspace.json in the current directory
    Init {
        /// Environment the project should use
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Declare an existing environment for the current project
    Use {
        /// Environment name
        name: String,
    },

    /// Create a new environment
    Create {
        /// Environment name
        name: String,

        /// Python version (defaults to the configured python_version)
        #[arg(short, long, value_name = "VERSION")]
        python: Option<String>,
    },

    /// Install a package into the current environment
    Install {
        /// Package requirement, e.g. `requests` or `requests==2.31.0`
        package: String,

        /// Install into the system interpreter instead
        #[arg(short, long)]
        global: bool,
    },

    /// List environments
    List,

    /// Delete an environment
    Remove {
        /// Environment name
        name: String,
    },

    /// Show the current environment, daemon and cache status
    Status,

    /// Delete cached packages
    CacheClear {
        /// Only drop packages cached more than DAYS days ago
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u64>,
    },

    /// Check the Python toolchain
    Doctor,

    /// Run the reconciliation daemon in the foreground
    Daemon {
        /// Project directory to watch (defaults to the current directory)
        #[arg(short, long, value_name = "DIR")]
        project: Option<PathBuf>,
    },
}

/// Parse the process arguments and run the CLI application
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli).await
}

/// Run an already-parsed command line
pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.home)?;
    debug!(home = %ctx.paths.root().display(), "Loaded pyspace context");

    match cli.command {
        Commands::Init { name } => commands::init::execute(&ctx, name).await,
        Commands::Use { name } => commands::use_env::execute(&ctx, &name).await,
        Commands::Create { name, python } => commands::create::execute(&ctx, &name, python).await,
        Commands::Install { package, global } => {
            commands::install::execute(&ctx, &package, global).await
        }
        Commands::List => commands::list::execute(&ctx).await,
        Commands::Remove { name } => commands::remove::execute(&ctx, &name).await,
        Commands::Status => commands::status::execute(&ctx).await,
        Commands::CacheClear { older_than } => {
            commands::cache_clear::execute(&ctx, older_than).await
        }
        Commands::Doctor => commands::doctor::execute(&ctx).await,
        Commands::Daemon { project } => commands::daemon::execute(&ctx, project).await,
    }
}

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use char3_dashboard::config::{CliOverrides, DashboardConfig};
use char3_dashboard::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "char3")]
#[command(version, about = "Team dashboard back end over Trello boards")]
pub struct Cli {
    /// Path to dashboard.toml (defaults to .char3/dashboard.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Write logs to a daily-rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Board API token. Overrides TRELLO_TOKEN and the config file.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dashboard HTTP and WebSocket server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,

        /// Open the browser after the server starts
        #[arg(long)]
        open: bool,

        /// Disable the background snapshot refresh
        #[arg(long)]
        no_poll: bool,
    },
    /// Create the project database and exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Print this week's planning buckets
    Week {
        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print deliverables and admin tasks grouped by client
    Clients,
    /// Print milestone completion for one client project
    Milestones {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        dir: cli.log_dir.clone(),
    })?;

    let (port, db_path) = match &cli.command {
        Commands::Serve { port, db_path, .. } => (*port, db_path.clone()),
        Commands::InitDb { db_path } => (None, db_path.clone()),
        _ => (None, None),
    };
    let config = DashboardConfig::load(
        cli.config.clone(),
        CliOverrides {
            token: cli.token.clone(),
            port,
            db_path,
        },
    )?;

    match &cli.command {
        Commands::Serve {
            dev, open, no_poll, ..
        } => cmd::cmd_serve(&config, *dev, *open, *no_poll).await?,
        Commands::InitDb { .. } => cmd::cmd_init_db(&config)?,
        Commands::Week { today } => cmd::cmd_week(&config, *today).await?,
        Commands::Clients => cmd::cmd_clients(&config).await?,
        Commands::Milestones { client, project } => {
            cmd::cmd_milestones(&config, client, project).await?
        }
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}

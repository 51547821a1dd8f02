use anyhow::{Context, Result};
use clap::Parser;
use std::env;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STORAGE_DIR: &str = "./uploads";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/editais.db";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
}

/// One-shot maintenance task requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Serve,
    Migrate,
    Reconcile { prune: bool },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Admin panel for uploading and managing PDF editais")]
pub struct Args {
    /// Host to bind to (overrides EDITAL_PANEL_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EDITAL_PANEL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded PDFs are stored (overrides EDITAL_PANEL_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides EDITAL_PANEL_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "reconcile")]
    pub migrate: bool,

    /// Compare stored files against the documents table, report and exit
    #[arg(long)]
    pub reconcile: bool,

    /// With --reconcile: delete orphaned files and rows whose file is missing
    #[arg(long, requires = "reconcile")]
    pub prune: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the requested task.
    pub fn from_env_and_args() -> Result<(Self, Task)> {
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key))
    }

    /// Merge parsed arguments with variables looked up through `lookup`.
    /// Arguments win over the environment, the environment over defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, Task)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = lookup("EDITAL_PANEL_HOST").unwrap_or_else(|_| DEFAULT_HOST.into());
        let env_port = match lookup("EDITAL_PANEL_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing EDITAL_PANEL_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_PORT,
            Err(err) => return Err(err).context("reading EDITAL_PANEL_PORT"),
        };
        let env_storage =
            lookup("EDITAL_PANEL_STORAGE_DIR").unwrap_or_else(|_| DEFAULT_STORAGE_DIR.into());
        let env_db =
            lookup("EDITAL_PANEL_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
        };

        let task = if args.migrate {
            Task::Migrate
        } else if args.reconcile {
            Task::Reconcile { prune: args.prune }
        } else {
            Task::Serve
        };

        Ok((cfg, task))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

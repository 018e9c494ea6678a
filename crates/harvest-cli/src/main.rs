//! Harvest Store - terminal stage of the collection pipeline
//!
//! Reads one execution report from stdin, uploads the artifacts it lists and
//! upserts an agency monthly record into every configured store.
//!
//! Every option can be given as a flag or as an environment variable; a
//! `.env` file in the working directory is loaded first.
//!
//! ## Exit codes
//!
//! - `0`: record stored
//! - `2`: decode, upload, backup or store failure
//! - `3`: a backend client could not be created
//! - `4`: missing or invalid configuration

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser, ValueEnum};
use harvest_core::{
    ingest, CollectionRouter, ConfiguredBackends, DatabaseBackend, DispatchPolicy, IngestError,
    IngestSettings, ObjectBackend, ReportFormat, EXIT_CONFIG,
};
use harvest_state::{PostgresConfig, SurrealConfig, SwiftConfig};
use tracing::{info, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    Surreal,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ObjectStoreKind {
    Swift,
    Fs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "harvest-store")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Store a collection run's execution report", long_about = None)]
struct Cli {
    /// Agency id (stored lower-cased)
    #[arg(long, env = "AID")]
    aid: String,

    /// Month of the collected period (1-12)
    #[arg(long, env = "MONTH")]
    month: u32,

    /// Year of the collected period
    #[arg(long, env = "YEAR")]
    year: u32,

    /// Exit codes that count as success
    #[arg(long, env = "SUCC_CODES", value_delimiter = ',', default_value = "0", allow_negative_numbers = true)]
    succ_codes: Vec<i32>,

    /// Start of the run (RFC 3339 or unix seconds)
    #[arg(long, env = "START_TIME")]
    start_time: Option<String>,

    /// Encoding of the report on stdin: json, proto or proto-delimited
    #[arg(long, env = "REPORT_FORMAT", default_value = "json")]
    report_format: ReportFormat,

    /// Record stores, in dispatch order
    #[arg(long, env = "STORE_BACKENDS", value_enum, value_delimiter = ',', default_value = "surreal")]
    store_backends: Vec<StoreBackend>,

    /// Collection for successful runs
    #[arg(long, env = "STORE_COLLECTION")]
    store_collection: String,

    /// Collection for failed runs (defaults to the success collection)
    #[arg(long, env = "STORE_ERROR_COLLECTION")]
    store_error_collection: Option<String>,

    /// Behaviour when a store fails: fail-fast or attempt-all
    #[arg(long, env = "DISPATCH_POLICY", default_value = "fail-fast")]
    dispatch_policy: DispatchPolicy,

    #[arg(long, env = "SURREALDB_ENDPOINT")]
    surrealdb_endpoint: Option<String>,

    #[arg(long, env = "SURREALDB_USERNAME")]
    surrealdb_username: Option<String>,

    #[arg(long, env = "SURREALDB_PASSWORD", hide_env_values = true)]
    surrealdb_password: Option<String>,

    #[arg(long, env = "SURREALDB_NAMESPACE", default_value = "harvest")]
    surrealdb_namespace: String,

    #[arg(long, env = "SURREALDB_DATABASE", default_value = "main")]
    surrealdb_database: String,

    /// Sign in as a root user
    #[arg(long, env = "SURREALDB_ROOT", action = ArgAction::Set, default_value_t = false, value_parser = BoolishValueParser::new())]
    surrealdb_root: bool,

    /// Postgres connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Object store for artifacts
    #[arg(long, env = "OBJECT_STORE", value_enum, default_value = "swift")]
    object_store: ObjectStoreKind,

    #[arg(long, env = "SWIFT_USERNAME")]
    swift_username: Option<String>,

    #[arg(long, env = "SWIFT_APIKEY", hide_env_values = true)]
    swift_apikey: Option<String>,

    #[arg(long, env = "SWIFT_AUTHURL")]
    swift_authurl: Option<String>,

    #[arg(long, env = "SWIFT_DOMAIN")]
    swift_domain: Option<String>,

    #[arg(long, env = "SWIFT_CONTAINER")]
    swift_container: Option<String>,

    /// Root directory of the filesystem object store
    #[arg(long, env = "OBJECT_STORE_DIR")]
    object_store_dir: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn required(value: &Option<String>, var: &str) -> Result<String, IngestError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::Config(format!("{var} is required")))
}

impl Cli {
    fn settings(&self) -> IngestSettings {
        let mut router = CollectionRouter::new(&self.store_collection, self.succ_codes.clone());
        if let Some(errors) = self
            .store_error_collection
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            router = router.with_error_collection(errors);
        }

        let mut settings = IngestSettings::new(&self.aid, self.month, self.year, router)
            .with_format(self.report_format)
            .with_policy(self.dispatch_policy);
        if let Some(start) = &self.start_time {
            settings = settings.with_start_time(start);
        }
        settings
    }

    fn surreal_config(&self) -> Result<SurrealConfig, IngestError> {
        let mut config = SurrealConfig::new(required(
            &self.surrealdb_endpoint,
            "SURREALDB_ENDPOINT",
        )?)
        .with_namespace(&self.surrealdb_namespace)
        .with_database(&self.surrealdb_database)
        .with_root(self.surrealdb_root);
        if let (Some(user), Some(pass)) = (&self.surrealdb_username, &self.surrealdb_password) {
            config = config.with_credentials(user, pass);
        }
        Ok(config)
    }

    fn backends(&self) -> Result<ConfiguredBackends, IngestError> {
        let mut databases = Vec::with_capacity(self.store_backends.len());
        for backend in &self.store_backends {
            databases.push(match backend {
                StoreBackend::Surreal => DatabaseBackend::Surreal(self.surreal_config()?),
                StoreBackend::Postgres => DatabaseBackend::Postgres(PostgresConfig::new(
                    required(&self.database_url, "DATABASE_URL")?,
                )),
                StoreBackend::Memory => DatabaseBackend::Memory,
            });
        }

        let objects = match self.object_store {
            ObjectStoreKind::Swift => ObjectBackend::Swift(SwiftConfig::new(
                required(&self.swift_username, "SWIFT_USERNAME")?,
                required(&self.swift_apikey, "SWIFT_APIKEY")?,
                required(&self.swift_authurl, "SWIFT_AUTHURL")?,
                required(&self.swift_domain, "SWIFT_DOMAIN")?,
                required(&self.swift_container, "SWIFT_CONTAINER")?,
            )),
            ObjectStoreKind::Fs => ObjectBackend::Fs(
                self.object_store_dir
                    .clone()
                    .ok_or_else(|| IngestError::Config("OBJECT_STORE_DIR is required".into()))?,
            ),
        };

        Ok(ConfiguredBackends::new(databases, objects))
    }
}

async fn run(cli: &Cli) -> Result<(), IngestError> {
    let settings = cli.settings();
    settings.validate()?;
    let factory = cli.backends()?;

    let outcome = ingest(std::io::stdin(), &settings, &factory).await?;
    info!(
        ingest_id = %outcome.ingest_id,
        key = %outcome.record.key(),
        collection = %outcome.collection,
        stored = ?outcome.stored,
        "Record stored"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                eprintln!("error loading config values: {e}");
                std::process::exit(EXIT_CONFIG);
            }
        },
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    harvest_core::init_tracing(cli.json || cli.log_format == LogFormat::Json, level);

    if let Err(e) = run(&cli).await {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

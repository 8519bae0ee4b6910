use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use covid_benchmark::databases::database::Database;
use covid_benchmark::harness::run_pipeline;
use covid_benchmark::loader::read_records;
use covid_benchmark::mongodb::MongoDB;
use covid_benchmark::postgres::PostgreSQL;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// Path to the caso_full CSV export to load and benchmark.
    csv: PathBuf,

    #[clap(name = "backend", short, long, default_value = "all")]
    backend: Backend,

    #[clap(
        long,
        env = "COVID_BENCH_POSTGRES",
        default_value = "host=localhost port=5432 user=bigdata password=bigdata dbname=bigdata"
    )]
    postgres: String,

    #[clap(long, env = "COVID_BENCH_MONGODB", default_value = "mongodb://localhost:27017")]
    mongodb: String,

    #[clap(long, default_value = "covid_benchmark.log")]
    log_file: PathBuf,

    #[clap(long, default_value = "info", env = "COVID_BENCH_LOG")]
    log_level: LevelFilter,

    /// MongoDB insert batch size.
    #[clap(long, default_value_t = 500)]
    batch_size: usize,

    /// Connect timeout in seconds, applied to both stores.
    #[clap(long, default_value_t = 5)]
    connect_timeout: u64,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Backend {
    Postgres,
    Mongodb,
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::try_parse().unwrap_or_else(|err| {
        if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            err.exit();
        }
        let _ = err.print();
        process::exit(1);
    });

    init_logging(&app.log_file, app.log_level)?;
    info!("covid_benchmark version: {}", env!("CARGO_PKG_VERSION"));

    let records = read_records(&app.csv)
        .with_context(|| format!("unable to read case records from {}", app.csv.display()))?;

    let timeout = Duration::from_secs(app.connect_timeout);
    let mut databases: Vec<Box<dyn Database>> = Vec::new();
    if matches!(app.backend, Backend::Postgres | Backend::All) {
        databases.push(Box::new(PostgreSQL::new(app.postgres.clone(), timeout)));
    }
    if matches!(app.backend, Backend::Mongodb | Backend::All) {
        databases.push(Box::new(MongoDB::new(app.mongodb.clone(), timeout)));
    }

    // A store that is down only loses its own pipeline, the other still runs.
    for db in databases.iter_mut() {
        if let Err(err) = run_pipeline(db.as_mut(), &records, app.batch_size).await {
            error!("{}: pipeline aborted: {err}", db.name());
        }
    }

    Ok(())
}

fn init_logging(path: &Path, level: LevelFilter) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("unable to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

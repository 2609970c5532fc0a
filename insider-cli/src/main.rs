//! Host CLI for the insider-threat correlation engine (spec §6). Wires
//! config loading, the fixture adapters, and the engine together; owns the
//! exit-code contract and the "always write a findings file" guarantee.

mod adapters;
mod config;
mod output;

use adapters::{FixtureActorDirectory, FixtureAdapter, FixtureFileContextSource};
use clap::Parser;
use insider_core::adapters::{ExfilAdapter, ReconAdapter};
use insider_core::config::ReconStateBackend;
use insider_core::engine::{ActorDirectory, Engine, NoDirectory};
use insider_core::file_context::FileContextProvider;
use insider_core::recon_store::{InMemoryReconStateStore, ReconStateStore};
use output::{AlertSink, FileSink, WebhookSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "insider-detect")]
#[command(about = "Correlates AI-assistant recon activity with file exfiltration to surface insider-threat findings")]
#[command(version)]
struct Cli {
    /// Path to the engine configuration TOML file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How many hours back to pull events for this run.
    #[arg(long, default_value_t = 24)]
    lookback_hours: i64,

    /// Override `window_minutes` from the config file.
    #[arg(long)]
    window_minutes: Option<i64>,

    /// Where to write the findings JSON file.
    #[arg(long, default_value = "findings.json")]
    output: PathBuf,

    /// Enable debug-level logging.
    #[arg(long)]
    verbose: bool,

    /// Path to a JSON array of ReconEvent records (fixture adapter input).
    #[arg(long, default_value = "recon_events.json")]
    recon_events: PathBuf,

    /// Path to a JSON array of ExfilEvent records (fixture adapter input).
    #[arg(long, default_value = "exfil_events.json")]
    exfil_events: PathBuf,

    /// Optional JSON map of doc_id -> file metadata (fixture file-context source).
    #[arg(long)]
    file_context: Option<PathBuf>,

    /// Optional JSON map of actor -> OU path (fixture actor directory).
    #[arg(long)]
    actor_directory: Option<PathBuf>,
}

const EXIT_OK: i32 = 0;
const EXIT_HIGH_FINDING: i32 = 1;
const EXIT_SOURCE_OR_CONFIG_ERROR: i32 = 2;
const EXIT_INTERNAL_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut engine_config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            return EXIT_SOURCE_OR_CONFIG_ERROR;
        }
    };
    if let Some(window_minutes) = cli.window_minutes {
        engine_config.window_minutes = window_minutes;
    }
    if let Err(err) = engine_config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return EXIT_SOURCE_OR_CONFIG_ERROR;
    }

    let recon_adapter = FixtureAdapter::new(&cli.recon_events, &cli.exfil_events);
    let now = chrono::Utc::now();
    let start = now - chrono::Duration::hours(cli.lookback_hours);

    let recon_events = match recon_adapter.fetch_recon(start, now).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "recon event source unavailable");
            return EXIT_SOURCE_OR_CONFIG_ERROR;
        }
    };
    let exfil_events = match recon_adapter.fetch_exfil(start, now).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "exfil event source unavailable");
            return EXIT_SOURCE_OR_CONFIG_ERROR;
        }
    };

    let (recon_store, baseline_store): (Arc<dyn ReconStateStore>, Arc<dyn insider_core::baseline::BaselineStore>) =
        match &engine_config.recon_state_backend {
            ReconStateBackend::Memory => (
                InMemoryReconStateStore::shared(),
                insider_core::baseline::InMemoryBaselineStore::shared(),
            ),
            ReconStateBackend::Kv { connection_string } => {
                match insider_kv::RedbReconStateStore::open(connection_string) {
                    Ok(store) => {
                        let baseline_store = Arc::new(store.baseline_store());
                        (Arc::new(store), baseline_store)
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to open kv recon state backend");
                        return EXIT_SOURCE_OR_CONFIG_ERROR;
                    }
                }
            }
        };

    let file_source: Arc<dyn insider_core::file_context::FileContextSource> =
        match cli.file_context.as_deref() {
            Some(path) => match FixtureFileContextSource::load(path) {
                Ok(source) => Arc::new(source),
                Err(err) => {
                    tracing::error!(error = %err, "failed to load file context fixture");
                    return EXIT_SOURCE_OR_CONFIG_ERROR;
                }
            },
            None => Arc::new(EmptyFileContextSource),
        };
    let file_context_provider = Arc::new(FileContextProvider::new(
        file_source,
        engine_config.file_context_cache_capacity,
        Duration::from_secs(engine_config.file_context_ttl_secs.max(0) as u64),
        Duration::from_secs(engine_config.file_context_negative_ttl_secs.max(0) as u64),
    ));

    let actor_directory: Arc<dyn ActorDirectory> = match cli.actor_directory.as_deref() {
        Some(path) => match FixtureActorDirectory::load(path) {
            Ok(dir) => Arc::new(dir),
            Err(err) => {
                tracing::error!(error = %err, "failed to load actor directory fixture");
                return EXIT_SOURCE_OR_CONFIG_ERROR;
            }
        },
        None => Arc::new(NoDirectory),
    };

    let baseline_tracker = Arc::new(insider_core::baseline::UserBaselineTracker::new(baseline_store));

    let engine = match Engine::new(
        engine_config.clone(),
        recon_store,
        file_context_provider,
        baseline_tracker,
        actor_directory,
    ) {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return EXIT_SOURCE_OR_CONFIG_ERROR;
        }
    };

    let findings = engine
        .run_batch(recon_events, exfil_events, now, CancellationToken::new())
        .await;

    let timezone: chrono_tz::Tz = engine_config
        .timezone
        .parse()
        .expect("validated by EngineConfig::validate above");

    let sinks: Vec<Box<dyn AlertSink>> = build_sinks(&engine_config, &cli.output, timezone);
    for sink in &sinks {
        if sink.send(&findings).await.is_err() {
            // spec §7 EmissionFailure: retry once, then dump to sibling
            // error file and exit 3.
            if sink.send(&findings).await.is_err() {
                if output::dump_to_error_file(&findings, &cli.output, timezone).is_err() {
                    tracing::error!("failed to dump findings to error file");
                }
                return EXIT_INTERNAL_ERROR;
            }
        }
    }

    if findings.iter().any(|f| f.severity == insider_core::types::Severity::High) {
        EXIT_HIGH_FINDING
    } else {
        EXIT_OK
    }
}

fn build_sinks(
    config: &insider_core::EngineConfig,
    output_path: &std::path::Path,
    timezone: chrono_tz::Tz,
) -> Vec<Box<dyn AlertSink>> {
    let mut sinks: Vec<Box<dyn AlertSink>> =
        vec![Box::new(FileSink::new(output_path.to_path_buf(), timezone))];
    if let Some(url) = &config.alerting.webhook_url {
        sinks.push(Box::new(WebhookSink::new(
            url.clone(),
            timezone,
            config.alerting.alert_on_severities.clone(),
        )));
    }
    sinks
}

/// Used when no `--file-context` fixture is given: every lookup misses,
/// so sensitivity falls back to `unknown` rather than failing findings.
struct EmptyFileContextSource;

#[async_trait::async_trait]
impl insider_core::file_context::FileContextSource for EmptyFileContextSource {
    async fn fetch(
        &self,
        _doc_id: &str,
    ) -> insider_core::error::Result<Option<insider_core::file_context::RawFileMetadata>> {
        Ok(None)
    }
}

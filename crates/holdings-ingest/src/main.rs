//! Holdings Ingest - file ingestion pipeline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use holdings_common::logging::{init_logging, LogConfig, LogLevel};
use holdings_ingest::audit::TracingAuditSink;
use holdings_ingest::config::{Config, RemoteProtocol};
use holdings_ingest::delivery::HttpDelivery;
use holdings_ingest::pipeline::{
    AcceptedPayload, ArchivedPayload, ArrivalNotifier, ObjectCreatedEvent, Pipeline, PipelineRun,
    RejectedPayload, RemoteFetcher,
};
use holdings_ingest::StageError;
use holdings_ingest::storage::{ObjectStore, S3Store};
use holdings_ingest::transport::ftp::{FtpConfig, FtpTransport};
use holdings_ingest::transport::sftp::{SftpConfig, SftpTransport};
use holdings_ingest::transport::RemoteTransport;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "holdings-ingest")]
#[command(author, version, about = "Holdings file ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy remote files into the staging store
    Fetch,

    /// Open a run from an object-created notification
    Notify {
        /// Notification JSON file, or - for stdin
        #[arg(short, long, default_value = "-")]
        event: PathBuf,
    },

    /// Classify an arrival payload
    Parse {
        #[arg(short, long, default_value = "-")]
        payload: PathBuf,
    },

    /// Archive an accepted file
    Archive {
        #[arg(short, long, default_value = "-")]
        payload: PathBuf,
    },

    /// Forward the manifest of an archived file
    Forward {
        #[arg(short, long, default_value = "-")]
        payload: PathBuf,
    },

    /// Move a rejected file to the error store and report it
    Reject {
        #[arg(short, long, default_value = "-")]
        payload: PathBuf,
    },

    /// Notify, then run every stage for the notified file
    Run {
        #[arg(short, long, default_value = "-")]
        event: PathBuf,
    },
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        Ok(input)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn transport(config: &Config) -> Result<Arc<dyn RemoteTransport>> {
    config.validate_remote()?;
    let credentials = config.remote.credentials.clone();
    Ok(match config.remote.protocol {
        RemoteProtocol::Sftp => {
            let mut sftp = SftpConfig::new(credentials);
            sftp.port = config.remote.port;
            Arc::new(SftpTransport::new(sftp))
        },
        RemoteProtocol::Ftp => {
            let mut ftp = FtpConfig::new(credentials);
            ftp.port = config.remote.port;
            Arc::new(FtpTransport::new(ftp))
        },
    })
}

/// Delivery settings are only required when the command forwards
async fn pipeline(config: &Config, store: Arc<dyn ObjectStore>, forwards: bool) -> Result<Pipeline> {
    let audit = Arc::new(TracingAuditSink);
    let pipeline = if forwards {
        config.validate_delivery()?;
        let delivery = HttpDelivery::new(config.http_delivery_config())?;
        Pipeline::new(
            store,
            Arc::new(delivery),
            audit,
            config.run_stores(),
            config.audit_destination(),
        )
    } else {
        Pipeline::without_delivery(store, audit, config.run_stores(), config.audit_destination())
    };
    Ok(pipeline.with_stage_timeout(config.stage_timeout()))
}

/// Print the run a failed stage handed back before failing the command
fn finish_stage(outcome: std::result::Result<PipelineRun, StageError>) -> Result<PipelineRun> {
    match outcome {
        Ok(run) => Ok(run),
        Err(e) => {
            error!("{}", e);
            print_json(&e.run)?;
            Err(e.into())
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("holdings-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    init_logging(&log_config)?;

    let config = Config::load()?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.s3).await?);

    match cli.command {
        Command::Fetch => {
            let fetcher = RemoteFetcher::new(transport(&config)?, store, config.fetch_config());
            let report = fetcher.fetch().await?;
            info!(
                "Fetched {} of {} listed entries",
                report.staged.len(),
                report.listed
            );
            for (name, reason) in &report.failed {
                error!("Not staged: {}: {}", name, reason);
            }
            println!(
                "listed={} staged={} skipped={} failed={}",
                report.listed,
                report.staged.len(),
                report.skipped,
                report.failed.len()
            );
        },
        Command::Notify { event } => {
            let event = ObjectCreatedEvent::from_json(&read_input(&event)?)?;
            let notifier = ArrivalNotifier::new(
                store,
                config.run_stores(),
                config.stores.staging_prefix.clone(),
            );
            let arrival = notifier.notify(&event).await?;
            print_json(&arrival.payload)?;
        },
        Command::Parse { payload } => {
            let document: serde_json::Value = serde_json::from_str(&read_input(&payload)?)
                .unwrap_or(serde_json::Value::Null);
            let pipeline = pipeline(&config, store, false).await?;
            print_json(&pipeline.parse_payload(&document))?;
        },
        Command::Archive { payload } => {
            let payload: AcceptedPayload = serde_json::from_str(&read_input(&payload)?)
                .context("Archive payload is malformed")?;
            let pipeline = pipeline(&config, store, false).await?;
            let run = payload.into_run(pipeline.stores())?;
            let run = finish_stage(pipeline.archive(run).await)?;
            print_json(&ArchivedPayload::from_run(&run)?)?;
        },
        Command::Forward { payload } => {
            let payload: ArchivedPayload = serde_json::from_str(&read_input(&payload)?)
                .context("Forward payload is malformed")?;
            let pipeline = pipeline(&config, store, true).await?;
            let run = payload.into_run(pipeline.stores())?;
            print_json(&finish_stage(pipeline.forward(run).await)?)?;
        },
        Command::Reject { payload } => {
            let payload: RejectedPayload = serde_json::from_str(&read_input(&payload)?)
                .context("Reject payload is malformed")?;
            let pipeline = pipeline(&config, store, false).await?;
            let run = payload.into_run(pipeline.stores(), &uuid::Uuid::new_v4().to_string())?;
            print_json(&finish_stage(pipeline.reject(run).await)?)?;
        },
        Command::Run { event } => {
            let event = ObjectCreatedEvent::from_json(&read_input(&event)?)?;
            let notifier = ArrivalNotifier::new(
                store.clone(),
                config.run_stores(),
                config.stores.staging_prefix.clone(),
            );
            let arrival = notifier.notify(&event).await?;
            let run = finish_stage(pipeline(&config, store, true).await?.drive(arrival.run).await)?;
            print_json(&run)?;
        },
    }

    Ok(())
}

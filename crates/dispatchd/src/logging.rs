//! Tracing subscriber setup: console, rolling file, or both.

use std::path::Path;

use anyhow::Result;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber per `logging`. Returns a guard
/// that must stay alive for the process lifetime when file output is used;
/// dropping it flushes the non-blocking file writer.
pub fn init(work_dir: &Path, logging: &LoggingConfig, dev: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_filter = if dev { "debug" } else { "info" };
    let quiet = "hyper=warn,tower_http=warn,mongodb=warn";
    let env_filter = EnvFilter::new(format!("{default_filter},{quiet}"));

    use crate::config::LoggingOutput;
    match logging.output {
        LoggingOutput::Stderr => {
            let level = console_level(logging, dev);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr.with_max_level(level))
                .init();
            tracing::info!("logging initialized: console only ({level})");
            Ok(None)
        }
        LoggingOutput::File => {
            let level = file_level(logging, dev);
            let logs_dir = work_dir.join("logs");
            std::fs::create_dir_all(&logs_dir)?;
            let appender = rolling::daily(&logs_dir, "dispatchd.log");
            let (writer, guard) = non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer.with_max_level(level))
                .init();
            tracing::info!("logging initialized: file only at {}/dispatchd.log ({level})", logs_dir.display());
            Ok(Some(guard))
        }
        LoggingOutput::Both => {
            let console = console_level(logging, dev);
            let file = file_level(logging, dev);
            let logs_dir = work_dir.join("logs");
            std::fs::create_dir_all(&logs_dir)?;
            let appender = rolling::daily(&logs_dir, "dispatchd.log");
            let (writer, guard) = non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr.with_max_level(console).and(writer.with_max_level(file)))
                .init();
            tracing::info!("logging initialized: console ({console}) and file at {}/dispatchd.log ({file})", logs_dir.display());
            Ok(Some(guard))
        }
    }
}

fn console_level(logging: &LoggingConfig, dev: bool) -> tracing::Level {
    logging
        .console_level
        .as_deref()
        .unwrap_or(if dev { "debug" } else { "info" })
        .parse()
        .unwrap_or(tracing::Level::INFO)
}

fn file_level(logging: &LoggingConfig, dev: bool) -> tracing::Level {
    logging
        .file_level
        .as_deref()
        .unwrap_or(if dev { "trace" } else { "debug" })
        .parse()
        .unwrap_or(tracing::Level::DEBUG)
}

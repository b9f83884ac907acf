use anyhow::Result;
use forkline_config::{LogFormat, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWriter {
    Stdout,
    /// Required for worker processes, whose stdout carries IPC messages
    Stderr,
}

impl LogWriter {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogWriter::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Initialize logging from configuration, writing to stdout
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    init_with_writer(config, LogWriter::Stdout)
}

/// Initialize logging from configuration inside a worker process
pub fn init_worker_logging_from_config(config: &LoggingConfig) -> Result<()> {
    init_with_writer(config, LogWriter::Stderr)
}

fn init_with_writer(config: &LoggingConfig, writer: LogWriter) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.filter_directives()))
        .with_writer(writer.make_writer())
        .with_ansi(writer == LogWriter::Stdout)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

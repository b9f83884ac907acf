use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};

mod cli;
mod demo;
mod tasks;

use cli::{Cli, Commands, ConfigCommands};
use forkline_config::{ConfigLoader, ForklineConfig, LogLevel};
use forkline_execution::TaskForkProcess;
use forkline_logging::{init_logging_from_config, init_worker_logging_from_config};

/// Load configuration from a file, or from the environment alone
fn load_config(config_path: Option<&PathBuf>) -> Result<ForklineConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file not found: {:?}",
                path
            ));
        }
    }
    ConfigLoader::new()
        .load(config_path)
        .with_context(|| match config_path {
            Some(path) => format!("Failed to load configuration from {:?}", path),
            None => "Failed to load configuration from environment".to_string(),
        })
}

/// Apply a `--log-level` override on top of the loaded configuration
fn apply_log_level(config: &mut ForklineConfig, log_level: Option<&str>) -> Result<()> {
    if let Some(level) = log_level {
        config.logging.level = LogLevel::from_str(level)
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;
    }
    Ok(())
}

/// Serve the demo task register to the controlling process
async fn run_worker_process() -> Result<()> {
    let mut worker = TaskForkProcess::new(tasks::register());
    worker.init().context("Failed to initialize worker process")?;

    worker.closed().await?;
    info!("Worker process shutting down");
    Ok(())
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    match load_config(Some(config_file)) {
        Ok(_config) => {
            println!("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle sample configuration generation
fn handle_config_generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    fs::write(output, ForklineConfig::generate_sample())
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

/// Handle printing the effective configuration
fn handle_config_show(config: &ForklineConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    apply_log_level(&mut config, cli.log_level.as_deref())?;

    // Workers log to stderr only: stdout carries the IPC channel
    let is_worker = matches!(cli.command, Some(Commands::Worker));
    if is_worker {
        init_worker_logging_from_config(&config.logging)?;
    } else {
        init_logging_from_config(&config.logging)?;
    }

    match &cli.command {
        Some(Commands::Demo {
            workers,
            worker_program,
        }) => {
            info!("Forkline demo starting");
            demo::run(&config, *workers, worker_program.clone()).await
        }
        Some(Commands::Worker) => run_worker_process().await,
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            ConfigCommands::Show => handle_config_show(&config),
        },
        None => {
            // If no subcommand is provided, print help
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_apply_log_level() {
        let mut config = ForklineConfig::default();
        apply_log_level(&mut config, Some("debug")).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);

        assert!(apply_log_level(&mut config, Some("chatty")).is_err());
        apply_log_level(&mut config, None).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_generate_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("forkline.yaml");

        handle_config_generate(&output, false).unwrap();
        assert!(handle_config_generate(&output, false).is_err());
        handle_config_generate(&output, true).unwrap();

        handle_config_validate(&output).unwrap();
    }

    #[test]
    fn test_load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"executor:\n  silent: true\n").unwrap();

        let config = load_config(Some(&file.path().to_path_buf())).unwrap();
        assert!(config.executor.silent);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"executor:\n  concurrency: 0\n").unwrap();

        assert!(handle_config_validate(&file.path().to_path_buf()).is_err());
        assert!(load_config(Some(&PathBuf::from("/no/such/forkline.yaml"))).is_err());
    }
}

//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo pipeline: an async wait, a CPU-bound task, then forked workers
    Demo {
        /// Number of worker processes to fork in parallel
        #[arg(long, value_name = "N", default_value_t = 4)]
        workers: usize,

        /// Worker program to fork (defaults to this binary's `worker` command)
        #[arg(long, value_name = "PATH")]
        worker_program: Option<PathBuf>,
    },

    /// Serve the demo task register over stdio (spawned by `demo`)
    #[command(hide = true)]
    Worker,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file
    Generate {
        /// Output file path
        #[arg(short, long, value_name = "PATH", default_value = "forkline.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as YAML
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo() {
        let cli = Cli::parse_from(["forkline", "--log-level", "debug", "demo", "--workers", "2"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::Demo {
                workers,
                worker_program,
            }) => {
                assert_eq!(workers, 2);
                assert!(worker_program.is_none());
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn test_parse_worker() {
        let cli = Cli::parse_from(["forkline", "worker"]);
        assert!(matches!(cli.command, Some(Commands::Worker)));
    }
}

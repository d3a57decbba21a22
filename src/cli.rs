// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `buildwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildwatch",
    version,
    about = "Bundle, regenerate the schema and run tests whenever sources change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// When omitted, `Buildwatch.toml` in the current directory is used if it
    /// exists, otherwise the built-in defaults apply.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't run anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once the config is loaded.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Bundle and minify once, then exit.
    Build,
    /// Regenerate the schema document once, then exit.
    Schema,
    /// Run the test suite once, then exit.
    Test,
    /// Run the named tasks once (prerequisites first), then exit.
    Run {
        #[arg(value_name = "TASK", required = true)]
        tasks: Vec<String>,
    },
    /// Build once, then rebuild whenever watched files change.
    Watch,
    /// Watch, run every task once, and serve the project with live reload.
    Serve,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_requires_at_least_one_task() {
        assert!(CliArgs::try_parse_from(["buildwatch", "run"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["buildwatch", "serve", "--config", "x.toml", "--dry-run"])
                .unwrap();
        assert!(matches!(args.command, Command::Serve));
        assert_eq!(args.config.as_deref(), Some("x.toml"));
        assert!(args.dry_run);
    }
}

// threadspace CLI entry point.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use threadspace_state::config::StateConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;

#[derive(Parser)]
#[command(name = "threadspace", about = "Inspect and repair persisted workspace state")]
struct Cli {
    /// State directory (overrides `[storage] dir` from the config file).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Config file to use instead of `~/.threadspace/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(error) => {
            output::print_anyhow_error(output::OutputFormat::detect(false), &error);
            return ExitCode::from_error(&error).into();
        }
    };
    init_tracing(&config.logging.filter);

    let ctx = commands::StateContext::new(config, cli.data_dir);
    match commands::run(cli.command, &ctx) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => ExitCode::from_error(&error).into(),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<StateConfig> {
    match path {
        Some(path) => StateConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display())),
        None => Ok(StateConfig::load()),
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so JSON on
/// stdout stays parseable.
fn init_tracing(configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["threadspace", "ls", "--data-dir", "/tmp/state", "--json"])
            .expect("arguments should parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/state")));
        assert!(matches!(cli.command, commands::Command::Ls(_)));
    }

    #[test]
    fn new_accepts_optional_title() {
        let cli = Cli::try_parse_from(["threadspace", "new", "--title", "Research"])
            .expect("arguments should parse");
        assert!(matches!(cli.command, commands::Command::New(_)));
        assert!(Cli::try_parse_from(["threadspace", "new"]).is_ok());
    }

    #[test]
    fn select_requires_an_id() {
        assert!(Cli::try_parse_from(["threadspace", "select"]).is_err());
    }

    #[test]
    fn explicit_config_that_is_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let error = load_config(Some(&path)).unwrap_err();
        assert_eq!(ExitCode::from_error(&error), ExitCode::Config);
    }
}

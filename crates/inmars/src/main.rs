//! inmars
//!
//! Uploads a finished script to a fleet of hosts over SSH, runs it and prints
//! the JSON each host answers with.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use inmars_core::{CoreSettings, ExecutionReport, Orchestrator};
use inmars_exec::SshConnector;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use config::Config;
use output::{OutputMode, render};

#[derive(Parser)]
#[command(name = "inmars")]
#[command(about = "Run a script on a fleet of hosts and collect their JSON answers", long_about = None)]
struct Cli {
    /// Configuration file location
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Hosts to run on (comma separated, may be repeated)
    #[arg(long, value_delimiter = ',')]
    limit: Vec<String>,

    /// Output mode
    #[arg(short = 'o', long = "output", value_enum, default_value_t)]
    output: OutputMode,

    /// Print short output
    #[arg(short = 's', long)]
    short: bool,

    /// Script to distribute, `-` reads it from stdin
    script: String,
}

/// Local script for the run
enum ScriptFile {
    /// File given on the command line
    Given(PathBuf),
    /// Script read from stdin into a temporary file
    Temp { path: PathBuf, keep: bool },
}

impl ScriptFile {
    async fn prepare(arg: &str, keep: bool) -> Result<Self> {
        if arg != "-" {
            return Ok(ScriptFile::Given(PathBuf::from(arg)));
        }

        let mut contents = Vec::new();
        tokio::io::stdin().read_to_end(&mut contents).await?;

        let path = std::env::temp_dir().join(format!("inmars-{}.sh", std::process::id()));
        tokio::fs::write(&path, &contents).await?;

        Ok(ScriptFile::Temp { path, keep })
    }

    fn path(&self) -> &Path {
        match self {
            ScriptFile::Given(path) | ScriptFile::Temp { path, .. } => path,
        }
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let ScriptFile::Temp { path, keep: false } = self
            && let Err(e) = std::fs::remove_file(&*path)
        {
            warn!(path = %path.display(), error = %e, "failed to remove temp script");
        }
    }
}

fn init_tracing(core: &CoreSettings) {
    let fallback = if core.debug {
        "debug"
    } else {
        core.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, config: &Config, script: &Path) -> Result<ExecutionReport> {
    let orchestrator = Orchestrator::new(config.run_config(), Arc::new(SshConnector::new()))?;
    let mut hosts = config.select_hosts(&cli.limit)?;

    info!(hosts = hosts.len(), script = %script.display(), "starting run");

    orchestrator.upload(&mut hosts, script).await?;

    let name = script.to_string_lossy();
    let report = orchestrator.execute(&mut hosts, &name).await;

    orchestrator.release_all(&mut hosts).await;

    Ok(report?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    init_tracing(&config.core);

    let script = ScriptFile::prepare(&cli.script, config.core.keep_temp_files).await?;
    let report = run(&cli, &config, script.path()).await?;

    let mut stdout = std::io::stdout().lock();
    render(&mut stdout, &report.responses, cli.output, cli.short)?;
    stdout.flush()?;

    for (host, outcome) in report.failed_hosts() {
        warn!(host = %host, outcome = %outcome, "no result");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_limits() {
        let cli = Cli::parse_from([
            "inmars", "-c", "/etc/inmars.toml", "--limit", "web1,web2", "--limit", "db1", "-o",
            "json", "-s", "run.sh",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/inmars.toml")));
        assert_eq!(cli.limit, vec!["web1", "web2", "db1"]);
        assert_eq!(cli.output, OutputMode::Json);
        assert!(cli.short);
        assert_eq!(cli.script, "run.sh");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["inmars", "-"]);

        assert!(cli.limit.is_empty());
        assert_eq!(cli.output, OutputMode::Plain);
        assert!(!cli.short);
    }

    #[tokio::test]
    async fn test_given_script_is_kept() {
        let script = ScriptFile::prepare("/tmp/run.sh", false).await.unwrap();
        assert_eq!(script.path(), Path::new("/tmp/run.sh"));
    }
}

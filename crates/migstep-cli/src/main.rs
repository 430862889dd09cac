use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migstep_config::{ConfigLoader, RunnerConfig};
use migstep_core::MigrationRunner;
use migstep_db::{DirectoryLoader, SqliteProcessor};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod output;

#[derive(Debug, Parser)]
#[command(name = "migstep", version, about = "Step a database between migration versions")]
struct Cli {
    /// Config file (YAML or TOML)
    #[arg(long, short, global = true, env = "MIGSTEP_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the config
    #[arg(long, global = true, env = "MIGSTEP_DATABASE")]
    database: Option<PathBuf>,

    /// Migrations directory, overrides the config
    #[arg(long, global = true)]
    migrations: Option<PathBuf>,

    /// Skip failing statements inside a migration and report them
    #[arg(long, global = true)]
    tolerant: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show applied and pending migrations
    Status,
    /// Upgrade to a specific version
    Up {
        #[arg(long)]
        to: i64,
        /// Leave a partially applied upgrade in place on failure
        #[arg(long)]
        no_rollback: bool,
    },
    /// Upgrade to the newest migration (never rolls back on failure)
    Latest,
    /// Revert down to a specific version (0 reverts everything)
    Down {
        #[arg(long)]
        to: i64,
    },
    /// Revert the most recent migrations
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    init_tracing(&config);
    run(&cli, &config)
}

fn resolve_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config =
        ConfigLoader::load_or_default(cli.config.as_deref()).context("failed to load config")?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(migrations) = &cli.migrations {
        config.migrations_dir = migrations.clone();
    }
    if cli.tolerant {
        config.tolerant = true;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &RunnerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: &Cli, config: &RunnerConfig) -> Result<()> {
    let processor = SqliteProcessor::open(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))?;
    let mut runner = MigrationRunner::new(
        processor,
        DirectoryLoader::new(&config.migrations_dir),
        config.runner_options(),
    );

    let outcome = match &cli.command {
        Command::Status => {
            let status = runner.status()?;
            println!("{}", output::format_status(&status, cli.json)?);
            return Ok(());
        }
        Command::Up { to, no_rollback } => {
            runner.upgrade_to_version(*to, config.auto_rollback && !no_rollback)
        }
        Command::Latest => runner.upgrade_to_latest(config.auto_rollback),
        Command::Down { to } => runner.rollback_to(*to),
        Command::Rollback { steps } => runner.rollback_steps(*steps),
    };

    if !runner.failures().is_empty() {
        eprintln!("{}", output::format_failures(runner.failures()));
    }

    let report = outcome.context("migration failed")?;
    info!(
        "{} migration(s) applied {}",
        report.applied.len(),
        report.direction
    );
    println!("{}", output::format_report(&report, cli.json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_up_with_target_and_globals() {
        let cli = Cli::try_parse_from([
            "migstep",
            "up",
            "--to",
            "5",
            "--no-rollback",
            "--database",
            "app.db",
            "--tolerant",
        ])
        .unwrap();
        assert!(cli.tolerant);
        assert_eq!(cli.database, Some(PathBuf::from("app.db")));
        match cli.command {
            Command::Up { to, no_rollback } => {
                assert_eq!(to, 5);
                assert!(no_rollback);
            }
            other => panic!("expected Up, got {other:?}"),
        }
    }

    #[test]
    fn rollback_defaults_to_one_step() {
        let cli = Cli::try_parse_from(["migstep", "rollback"]).unwrap();
        assert!(matches!(cli.command, Command::Rollback { steps: 1 }));
    }

    #[test]
    fn up_requires_a_target() {
        assert!(Cli::try_parse_from(["migstep", "up"]).is_err());
    }

    #[test]
    fn cli_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "database: from_file.db\nmigrations_dir: sql\n").unwrap();

        let cli = Cli::try_parse_from([
            "migstep",
            "--config",
            path.to_str().unwrap(),
            "--migrations",
            "other",
            "status",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database, PathBuf::from("from_file.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("other"));
    }

    #[test]
    fn status_against_a_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        std::fs::create_dir(&migrations).unwrap();
        std::fs::write(
            migrations.join("0001_init.up.sql"),
            "CREATE TABLE t (id INTEGER);",
        )
        .unwrap();

        let config = RunnerConfig {
            database: dir.path().join("app.db"),
            migrations_dir: migrations,
            ..RunnerConfig::default()
        };
        let cli = Cli::try_parse_from(["migstep", "latest"]).unwrap();
        run(&cli, &config).unwrap();

        let cli = Cli::try_parse_from(["migstep", "status"]).unwrap();
        run(&cli, &config).unwrap();
    }
}

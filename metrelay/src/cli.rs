use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use metrelay_config::{Config, OverridableConfig};
use metrelay_transform::{MetricSnapshot, Transform, UnixTimestamp};

use crate::cliapp::{self, DEFAULT_CONFIG_DIR};
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = cliapp::make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

    // Commands that do not need a loaded config.
    if let Some(("config", config_matches)) = matches.subcommand()
        && let Some(("init", _)) = config_matches.subcommand()
    {
        return init_config(&config_path);
    }

    let exists = Config::config_exists(&config_path);
    let mut config = if exists {
        Config::from_path(&config_path)?
    } else {
        Config::default_at(&config_path)
    };

    if let Some(("run", run_matches)) = matches.subcommand() {
        config.apply_override(extract_config_args(run_matches))?;
    }

    metrelay_log::init(config.logging());
    if !exists {
        metrelay_log::warn!(
            "config file {} not found, using defaults",
            config.file_path().display()
        );
    }

    match matches.subcommand() {
        Some(("run", _)) => run(config),
        Some(("config", config_matches)) => manage_config(&config, config_matches),
        Some(("transform", transform_matches)) => transform(&config, transform_matches),
        _ => unreachable!(),
    }
}

/// Extract config arguments from a parsed command line arguments object.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        upstream_host: matches.get_one("upstream_host").cloned(),
        upstream_port: matches.get_one("upstream_port").cloned(),
        ingest_port: matches.get_one("ingest_port").cloned(),
        log_level: matches.get_one("log_level").cloned(),
    }
}

pub fn init_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config_path = config_path.as_ref();

    if Config::config_exists(config_path) {
        metrelay_log::init(&Default::default());
        metrelay_log::info!(
            "there is already a config in {}, nothing to do",
            config_path.display()
        );
        return Ok(());
    }

    let config = Config::default_at(config_path);
    config
        .save()
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    metrelay_log::init(config.logging());
    metrelay_log::info!("wrote default config to {}", config.file_path().display());
    Ok(())
}

#[allow(clippy::print_stdout, reason = "prints the config for the user")]
pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", show_matches)) => {
            match show_matches.get_one::<String>("format").map(String::as_str) {
                Some("debug") => println!("{config:#?}"),
                _ => println!("{}", config.to_yaml_string()?),
            }
            Ok(())
        }
        _ => unreachable!(),
    }
}

/// Runs one flush cycle on a snapshot file and prints the payload.
pub fn transform(config: &Config, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("snapshot")
        .context("missing snapshot path")?;

    let contents = fs::read(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: MetricSnapshot = serde_json::from_slice(&contents)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;

    let transform = Transform::new(config.transform_config().clone());
    let payload = transform.flush(UnixTimestamp::now(), &snapshot, &|_body: Vec<u8>| {});

    let mut stdout = io::stdout().lock();
    if matches.get_flag("pretty") {
        serde_json::to_writer_pretty(&mut stdout, &payload)?;
    } else {
        serde_json::to_writer(&mut stdout, &payload)?;
    }
    writeln!(stdout)?;

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;
    metrelay_server::run(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_args() {
        let matches = cliapp::make_app()
            .try_get_matches_from([
                "metrelay",
                "run",
                "--upstream-port",
                "9001",
                "--log-level",
                "debug",
            ])
            .unwrap();
        let (_, run_matches) = matches.subcommand().unwrap();

        let overrides = extract_config_args(run_matches);
        assert_eq!(overrides.upstream_host, None);
        assert_eq!(overrides.upstream_port.as_deref(), Some("9001"));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_init_config_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrelay");

        init_config(&path).unwrap();
        assert!(Config::config_exists(&path));

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.upstream_descriptor().port, 8001);
    }
}

//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Relays statsd metrics to a collector as entity events.";

/// The config folder used when neither `--config` nor `METRELAY_CONFIG` is given.
pub const DEFAULT_CONFIG_DIR: &str = ".metrelay";

pub fn make_app() -> Command {
    Command::new("metrelay")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("METRELAY_CONFIG")
                .default_value(DEFAULT_CONFIG_DIR)
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the relay")
                .after_help(
                    "This runs the relay in the foreground until it's shut down. It will \
                     bind the statsd listener and the status server to the addresses \
                     configured in the config file.",
                )
                .arg(
                    Arg::new("upstream_host")
                        .value_name("HOST")
                        .long("upstream-host")
                        .env("METRELAY_UPSTREAM_HOST")
                        .help("The host name of the collector that receives payloads."),
                )
                .arg(
                    Arg::new("upstream_port")
                        .value_name("PORT")
                        .long("upstream-port")
                        .env("METRELAY_UPSTREAM_PORT")
                        .help("The port of the collector that receives payloads."),
                )
                .arg(
                    Arg::new("ingest_port")
                        .value_name("PORT")
                        .long("ingest-port")
                        .env("METRELAY_INGEST_PORT")
                        .help("The UDP port for statsd ingestion."),
                )
                .arg(
                    Arg::new("log_level")
                        .value_name("LEVEL")
                        .long("log-level")
                        .env("METRELAY_LOG_LEVEL")
                        .help("The log level, one of off, error, warn, info, debug or trace."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the relay config")
                .after_help(
                    "This command provides basic config management. It can be used \
                     primarily to initialize a new relay config and to print out the \
                     current config.",
                )
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("init")
                        .about("Initialize a new relay config")
                        .after_help(
                            "This writes a config file with default values into the \
                             config folder. An existing config is left untouched.",
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults. The default output format is YAML but \
                             a debug format can also be specific which is useful \
                             to understand how the relay interprets the individual \
                             values.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(ValueParser::from(["debug", "yaml"]))
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
        .subcommand(
            Command::new("transform")
                .about("Run one flush cycle on a snapshot file")
                .after_help(
                    "This reads a JSON snapshot of aggregated metrics, applies the \
                     configured rules and prints the payload that would be posted to \
                     the collector. Nothing is sent.",
                )
                .arg(
                    Arg::new("snapshot")
                        .value_name("FILE")
                        .long("snapshot")
                        .short('s')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the JSON snapshot."),
                )
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Pretty print the payload."),
                ),
        )
}

//! metrelay is a statsd relay that turns metrics into entity events.
//!
//! It listens for statsd datagrams, aggregates them over a flush interval, matches the resulting
//! metric names against configured rules, and posts the composed payload to a collector over
//! HTTP.
//!
//! # Usage
//!
//! ```text
//! metrelay config init
//! metrelay run --upstream-host collector.local --upstream-port 8001
//! metrelay transform --snapshot snapshot.json --pretty
//! ```
//!
//! # Workspace Crates
//!
//! metrelay is split into the following workspace crates:
//!
//!  - `metrelay`: Main entry point and command line interface.
//!  - [`metrelay-config`]: Static configuration for the CLI and server.
//!  - [`metrelay-log`]: Logging facade and initialization.
//!  - [`metrelay-server`]: Statsd ingestion, flush loop, upstream delivery and status endpoints.
//!  - [`metrelay-statsd`]: High-level StatsD metric client for internal measurements.
//!  - [`metrelay-transform`]: Rule matching and payload composition.
//!
//! [`metrelay-config`]: ../metrelay_config/index.html
//! [`metrelay-log`]: ../metrelay_log/index.html
//! [`metrelay-server`]: ../metrelay_server/index.html
//! [`metrelay-statsd`]: ../metrelay_statsd/index.html
//! [`metrelay-transform`]: ../metrelay_transform/index.html

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            metrelay_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

mod error;

use clap::{App, Arg, ArgMatches};
use common_config::RootConfig;
use protocol::ProtocolResult;

use crate::error::CliError;

/// Process entry point (§4.K): parses arguments, loads and merges the
/// configuration files and installs the logger before handing off to
/// `run::Node`. Exit codes are the caller's concern - `start` only ever
/// returns `Err` for a fatal startup failure.
pub struct Cli<'a> {
    matches: ArgMatches<'a>,
}

impl<'a> Cli<'a> {
    pub fn new() -> Self {
        Cli { matches: Self::generate_matches() }
    }

    fn generate_matches() -> ArgMatches<'a> {
        App::new("ledger-node")
            .version("0.1.0-alpha.0")
            .author("Ledger Dev <ledger@example.org>")
            .about("Permissioned BFT ledger node")
            .arg(
                Arg::with_name("config")
                    .short("c")
                    .long("config")
                    .value_name("FILE")
                    .multiple(true)
                    .number_of_values(1)
                    .help("a config file; later files override earlier ones")
                    .required(true),
            )
            .get_matches()
    }

    fn load_config(&self) -> ProtocolResult<RootConfig> {
        let paths: Vec<&str> = self.matches.values_of("config").ok_or(CliError::MissingConfig)?.collect();
        common_config::load(&paths).map_err(|err| protocol::ProtocolError::new(protocol::ProtocolErrorKind::Config, Box::new(err)))
    }

    fn install_logger(config: &RootConfig) {
        common_logger::init(
            &config.logger.filter,
            config.logger.log_to_console,
            config.logger.log_to_file,
            config.logger.log_path.clone(),
            &config.logger.modules_level,
        );
    }

    /// Runs to completion: loads config, installs logging, builds and runs
    /// the node. Blocks until a shutdown signal is observed.
    pub fn start(self) -> ProtocolResult<()> {
        let config = self.load_config()?;
        Self::install_logger(&config);
        log::info!(target: "cli", "starting node {}", config.node_address);

        run::Node::new(config)?.run()
    }

    /// Convenience wrapper for `main`: logs and returns a process exit code
    /// instead of propagating the error.
    pub fn run() -> i32 {
        match Cli::new().start() {
            Ok(()) => 0,
            Err(err) => {
                log::error!(target: "cli", "fatal startup error: {}", err);
                1
            }
        }
    }
}

impl<'a> Default for Cli<'a> {
    fn default() -> Self {
        Cli::new()
    }
}

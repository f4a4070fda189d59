//! Installs the process-wide logger (§4.J) and exposes a small [`Metrics`]
//! handle. Every component logs through the standard `log` facade at a
//! target named after itself (`"consensus"`, `"storage"`, `"mempool"`,
//! `"network"`, `"sync"`) — this crate only owns the one-time install and
//! the default metrics backend.

mod metrics;

use std::collections::HashMap;
use std::path::PathBuf;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

pub use metrics::{LogMetrics, Metrics};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {t} - {m}{n}";

fn level_from_str(filter: &str) -> LevelFilter {
    match filter.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Builds and installs the global logger from the typed logging
/// configuration. Safe to call at most once per process; the node binary
/// calls it during bootstrap (§4.K) before any other component logs.
pub fn init(
    filter: &str,
    log_to_console: bool,
    log_to_file: bool,
    log_path: Option<PathBuf>,
    modules_level: &HashMap<String, String>,
) {
    let root_level = level_from_str(filter);
    let encoder = || Box::new(PatternEncoder::new(PATTERN));

    let mut config = Config::builder();
    let mut appender_names = Vec::new();

    if log_to_console {
        let console = ConsoleAppender::builder().encoder(encoder()).build();
        config = config.appender(Appender::builder().build("console", Box::new(console)));
        appender_names.push("console");
    }

    if log_to_file {
        let path = log_path.unwrap_or_else(|| PathBuf::from("logs/ledger.log"));
        match FileAppender::builder().encoder(encoder()).build(&path) {
            Ok(file) => {
                config = config.appender(Appender::builder().build("file", Box::new(file)));
                appender_names.push("file");
            }
            Err(err) => {
                eprintln!("failed to open log file {:?}: {}", path, err);
            }
        }
    }

    for (module, level) in modules_level {
        config = config.logger(Logger::builder().build(module, level_from_str(level)));
    }

    let root = Root::builder()
        .appenders(appender_names)
        .build(root_level);

    match config.build(root) {
        Ok(built) => {
            if log4rs::init_config(built).is_err() {
                // Already initialized (e.g. by a previous test in the same process).
            }
        }
        Err(err) => eprintln!("failed to build logger config: {}", err),
    }
}

/// Installs a console-only logger at `debug` level, analogous to muta's
/// `Flag::Test` path; used by component test suites that want readable
/// output without a config file.
pub fn init_for_test() {
    init("debug", true, false, None, &HashMap::new());
}

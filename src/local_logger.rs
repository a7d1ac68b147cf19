use std::env;
use std::io::Write;

use crate::prelude::*;
use console::Style;
use log::Log;
use proctrack::spawner::CHILD_OUTPUT_TARGET;
use simplelog::{CombinedLogger, SharedLogger};

/// Environment variable holding the log level, e.g. `debug`
pub const LOG_LEVEL_ENV: &str = "PROCTRACK_LOG";

pub struct LocalLogger {
    log_level: log::LevelFilter,
}

impl LocalLogger {
    /// Level from the environment, raised by each `-v`
    pub fn new(verbosity: u8) -> Self {
        let from_env = env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|log_level| log_level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info);
        let from_flags = match verbosity {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        LocalLogger {
            log_level: from_env.max(from_flags),
        }
    }
}

impl Log for LocalLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.log_level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let _ = write_record(&mut std::io::stderr().lock(), record);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Every record goes to stderr, stdout only carries the report. The launched command's
/// output is written as is.
fn write_record<W: Write>(out: &mut W, record: &log::Record) -> std::io::Result<()> {
    if record.target() == CHILD_OUTPUT_TARGET {
        return writeln!(out, "{}", record.args());
    }

    let message = match record.level() {
        log::Level::Error | log::Level::Warn | log::Level::Info => record.args().to_string(),
        level => format!("[{level}::{}] {}", record.target(), record.args()),
    };
    let style = match record.level() {
        log::Level::Error => Style::new().red(),
        log::Level::Warn => Style::new().yellow(),
        log::Level::Info => Style::new().white(),
        log::Level::Debug => Style::new().blue().dim(),
        log::Level::Trace => Style::new().black().dim(),
    };

    writeln!(out, "{}", style.for_stderr().apply_to(message))
}

impl SharedLogger for LocalLogger {
    fn level(&self) -> log::LevelFilter {
        self.log_level
    }

    fn config(&self) -> Option<&simplelog::Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

pub fn init_local_logger(verbosity: u8) -> Result<()> {
    CombinedLogger::init(vec![Box::new(LocalLogger::new(verbosity))])?;
    Ok(())
}

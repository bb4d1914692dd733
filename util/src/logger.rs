//! Logger initialisation
//!
//! Every record is stamped with the seconds elapsed since the session epoch, so log lines line up
//! with the cycle archive. The terminal gets coloured level tags, the session log file gets plain
//! text so it can be grepped.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::Colorize;
use log::{info, Level, Record};
use std::fmt;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Dependencies which are too chatty below `INFO`.
const QUIET_TARGETS: [&str; 1] = ["zmq"];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of `INFO` or more verbose, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// Records go to stdout and to the session's log file. `min_level` must be `INFO` or more
/// verbose, so state transitions are never hidden.
///
/// This must only be called once per execution.
pub fn logger_init(
    min_level: LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    check_min_level(min_level)?;

    let log_file =
        fern::log_file(session.log_file_path.clone()).map_err(LoggerInitError::LogFileInitError)?;

    let mut root = fern::Dispatch::new().level(min_level);
    for target in QUIET_TARGETS.iter() {
        root = root.level_for(*target, LevelFilter::Info);
    }

    root.chain(
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!("{}", line(record, message, true)))
            })
            .chain(std::io::stdout()),
    )
    .chain(
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!("{}", line(record, message, false)))
            })
            .chain(log_file),
    )
    .apply()
    .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session: {:?}", session.session_root.file_name().unwrap_or_default());
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_min_level(min_level: LevelFilter) -> Result<(), LoggerInitError> {
    match min_level < Level::Info {
        true => Err(LoggerInitError::InvalidMinLogLevel(min_level)),
        false => Ok(()),
    }
}

fn line(record: &Record, message: &fmt::Arguments, colour: bool) -> String {
    format_line(
        session::get_elapsed_seconds(),
        record.level(),
        record.target(),
        message,
        colour,
    )
}

/// Format one log line as `[<elapsed> <LVL>] msg`, adding the target for DEBUG and TRACE so
/// per-cycle output can be traced back to its module.
fn format_line(
    elapsed_s: f64,
    level: Level,
    target: &str,
    message: &dyn fmt::Display,
    colour: bool,
) -> String {
    let tag = match colour {
        true => level_tag_coloured(level),
        false => level_tag(level).to_string(),
    };

    match level > Level::Info {
        true => format!("[{:10.6} {}] {}: {}", elapsed_s, tag, target, message),
        false => format!("[{:10.6} {}] {}", elapsed_s, tag, message),
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info => "INF",
        Level::Warn => "WRN",
        Level::Error => "ERR",
    }
}

fn level_tag_coloured(level: Level) -> String {
    let tag = level_tag(level);

    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info => tag.normal(),
        Level::Warn => tag.yellow(),
        Level::Error => tag.red().bold(),
    }
    .to_string()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

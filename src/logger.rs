use std::{path::PathBuf, str::FromStr, sync::Mutex};

use anyhow::Result;
use lazy_static::lazy_static;
use log::{warn, LevelFilter};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config, Handle,
};

use crate::env;

const LOG_FILE_NAME: &str = "servicify.log";
const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {f} {L} {l} - {m}\n";

lazy_static! {
    static ref LOG_HANDLE: Mutex<Option<Handle>> = Mutex::new(None);
}

/// Logs to the console and to `servicify.log` next to the executable. When
/// the file can't be opened, logging continues on the console alone.
pub fn init_log(log_level: &str) -> Result<()> {
    let (config, file_error) = create_config(parse_level(log_level), log_file_path())?;
    let handle = log4rs::init_config(config)?;
    if let Ok(mut global) = LOG_HANDLE.lock() {
        global.replace(handle);
    }
    if let Some(e) = file_error {
        warn!("couldn't open {}, logging to console only: {}", LOG_FILE_NAME, e);
    }
    Ok(())
}

/// Re-applies the appenders at a new level, keeping them if the level is bogus.
pub fn change_log_level(log_level: &str) {
    let level = match LevelFilter::from_str(log_level) {
        Ok(level) => level,
        Err(_) if log_level.is_empty() => LevelFilter::Info,
        Err(_) => {
            warn!("unknown log level {:?}, keeping info", log_level);
            LevelFilter::Info
        }
    };
    let config = match create_config(level, log_file_path()) {
        Ok((config, _)) => config,
        Err(e) => {
            warn!("couldn't rebuild log config: {}", e);
            return;
        }
    };
    if let Ok(mut handle) = LOG_HANDLE.lock() {
        if let Some(handle) = handle.as_mut() {
            handle.set_config(config);
        }
    }
}

fn parse_level(log_level: &str) -> LevelFilter {
    LevelFilter::from_str(log_level).unwrap_or(LevelFilter::Info)
}

fn log_file_path() -> Result<PathBuf> {
    let mut path = env::root_dir()?;
    path.push(LOG_FILE_NAME);
    Ok(path)
}

/// Builds the appender config. A log file that can't be opened is left out
/// and its error handed back next to the console-only config.
fn create_config(
    level: LevelFilter,
    log_file_path: Result<PathBuf>,
) -> Result<(Config, Option<anyhow::Error>)> {
    let log_pattern = Box::new(PatternEncoder::new(LOG_PATTERN));
    let console = ConsoleAppender::builder()
        .encoder(log_pattern.clone())
        .target(Target::Stdout)
        .build();
    let logfile = log_file_path.and_then(|path| {
        Ok(FileAppender::builder()
            .encoder(log_pattern)
            .build(path)?)
    });

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");
    let file_error = match logfile {
        Ok(logfile) => {
            builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
            root = root.appender("logfile");
            None
        }
        Err(e) => Some(e),
    };
    Ok((builder.build(root.build(level))?, file_error))
}

use std::{error::Error as _, path::Path};

use log::error;

use crate::{
    env::Action,
    error::AppError,
    logger, registrar,
    supervisor::Session,
};

use super::manager::{self, SysService};

/// Runs one CLI action against the native service manager and returns the
/// process exit code.
pub fn control(action: &Action) -> i32 {
    let sys = manager::native();
    let result = match action {
        Action::Install(config) => registrar::install(config, &sys).map(|_| 0),
        Action::Remove(name) => registrar::remove(name, &sys).map(|_| 0),
        Action::Run(config) => run(config, &sys),
    };
    match result {
        Ok(code) => code as i32,
        Err(err) => {
            report(&err);
            err.exit_code().value() as i32
        }
    }
}

fn run(config_path: &Path, sys: &dyn SysService) -> Result<u32, AppError> {
    // Config goes first: on Windows only the dispatcher can tell we aren't a
    // service, so a bad config from a console exits CantReadConfig, not NotAService.
    let session = Session::load(config_path)?;
    logger::change_log_level(&session.config().log_level);
    sys.run(session)
}

fn report(err: &AppError) {
    error!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        error!("  caused by: {}", cause);
        source = cause.source();
    }
}

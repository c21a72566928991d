use std::{ffi::OsString, path::Path};

use log::{debug, info};

use crate::{
    config,
    env::{self, RUN_ARG},
    error::AppError,
    sys_service::manager::{ServiceRegistration, SysService},
};

/// Registers the service described by `config_path`, so that starting it
/// runs this binary with `--run <absolute config path>`.
///
/// Returns the name of the created service.
pub fn install(config_path: &Path, sys: &dyn SysService) -> Result<String, AppError> {
    let exe = std::env::current_exe().map_err(AppError::PathNotFound)?;
    let config_path = env::absolute_path(config_path).map_err(AppError::CantFindConfigAbsPath)?;
    let config = config::load_config(&config_path).map_err(AppError::CantReadConfig)?;
    let settings = config.mold().map_err(AppError::InvalidConfigFile)?;

    debug!(
        "registering {} as service type {:#x}, start type {:#x}, delayed {}",
        config.name,
        settings.service_type(),
        settings.start_type(),
        settings.delayed_auto_start
    );

    let registry = sys.connect().map_err(AppError::CantConnectScm)?;
    let registration = ServiceRegistration {
        name: config.name.clone(),
        executable: exe,
        arguments: vec![OsString::from(RUN_ARG), config_path.into_os_string()],
        settings,
    };
    let name = registry
        .register(&registration)
        .map_err(AppError::CantCreateService)?;
    info!("service {} created", name);
    Ok(name)
}

pub fn remove(name: &str, sys: &dyn SysService) -> Result<(), AppError> {
    let registry = sys.connect().map_err(AppError::CantConnectScm)?;
    registry
        .unregister(name)
        .map_err(|e| AppError::CantDeleteService(name.to_string(), e))?;
    info!("service {} removed", name);
    Ok(())
}

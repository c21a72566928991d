use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Process exit codes, one per failure class. Success is 0.
///
/// `CantFindImage`, `CantStartImage` and `LostImage` are never process exit
/// codes of the installer; they are reported to the service manager as
/// service-specific exit codes of a running service.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    PathNotFound = 1,
    CantReadConfig = 2,
    InvalidConfigFile = 3,
    CantConnectScm = 4,
    CantCreateService = 5,
    CantFindConfigAbsPath = 6,
    NotAService = 7,
    CantDetectContext = 8,
    CantFindImage = 9,
    CantStartImage = 10,
    CantDeleteService = 11,
    LostImage = 12,
}

impl ExitCode {
    pub fn value(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("couldn't find servicify's own path")]
    PathNotFound(#[source] io::Error),
    #[error("couldn't find the absolute path to config file")]
    CantFindConfigAbsPath(#[source] io::Error),
    #[error("couldn't read config file")]
    CantReadConfig(#[source] ConfigError),
    #[error("invalid config file")]
    InvalidConfigFile(#[source] ConfigError),
    #[error("couldn't connect to the service control manager")]
    CantConnectScm(#[source] anyhow::Error),
    #[error("couldn't create service")]
    CantCreateService(#[source] anyhow::Error),
    #[error("couldn't delete service {0}")]
    CantDeleteService(String, #[source] anyhow::Error),
    #[error("not running as a service (hint: use --install to install a service)")]
    NotAService,
    #[error("can't detect current running context")]
    CantDetectContext(#[source] anyhow::Error),
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::PathNotFound(_) => ExitCode::PathNotFound,
            AppError::CantFindConfigAbsPath(_) => ExitCode::CantFindConfigAbsPath,
            AppError::CantReadConfig(_) => ExitCode::CantReadConfig,
            AppError::InvalidConfigFile(_) => ExitCode::InvalidConfigFile,
            AppError::CantConnectScm(_) => ExitCode::CantConnectScm,
            AppError::CantCreateService(_) => ExitCode::CantCreateService,
            AppError::CantDeleteService(..) => ExitCode::CantDeleteService,
            AppError::NotAService => ExitCode::NotAService,
            AppError::CantDetectContext(_) => ExitCode::CantDetectContext,
        }
    }
}

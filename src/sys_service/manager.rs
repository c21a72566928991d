use std::{ffi::OsString, path::PathBuf};

use anyhow::Result;

use crate::{config::ServiceSettings, error::AppError, supervisor::Session};

#[cfg(unix)]
use super::unix_service::UnixSysService as PlatformSysService;
#[cfg(windows)]
use super::windows_service::WindowsSysService as PlatformSysService;

/// Everything the service manager needs to create one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRegistration {
    pub name: String,
    pub executable: PathBuf,
    pub arguments: Vec<OsString>,
    pub settings: ServiceSettings,
}

/// The host's service manager.
pub trait SysService: Send + Sync {
    /// Opens a connection, released when the returned value is dropped.
    fn connect(&self) -> Result<Box<dyn ServiceRegistry + '_>>;

    /// Hands the session to the service manager and blocks until the service
    /// stops. Returns the exit code for this process.
    fn run(&self, session: Session) -> Result<u32, AppError>;
}

/// An open connection to the service manager.
pub trait ServiceRegistry {
    /// Creates the service and returns its name. An existing service with the
    /// same name is an error, never overwritten.
    fn register(&self, registration: &ServiceRegistration) -> Result<String>;

    fn unregister(&self, name: &str) -> Result<()>;
}

pub fn native() -> impl SysService {
    PlatformSysService::new()
}

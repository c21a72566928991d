//! Runtime supervision of one service instance.
//!
//! A [`Session`] is created when the service manager starts the service and
//! is consumed by [`supervise`], which launches the configured image, turns
//! stop and shutdown requests into a forced kill and reports the image's exit
//! code back as the service-specific exit code.

use std::path::{Path, PathBuf};

use log::warn;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    config::{self, Config},
    error::AppError,
};

mod runner;

pub use runner::supervise;

/// Control requests the service manager delivers to a running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Shutdown,
    Interrogate,
    ParamChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Starting,
    Running,
    StopPending,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlsAccepted {
    pub stop: bool,
    pub shutdown: bool,
}

impl ControlsAccepted {
    pub const NONE: ControlsAccepted = ControlsAccepted {
        stop: false,
        shutdown: false,
    };
    pub const STOP_AND_SHUTDOWN: ControlsAccepted = ControlsAccepted {
        stop: true,
        shutdown: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub controls_accepted: ControlsAccepted,
    pub process_id: u32,
    /// Service-specific exit code, only set once stopped.
    pub exit_code: Option<u32>,
}

/// Transient state of one running service instance.
#[derive(Debug)]
pub struct Session {
    config: Config,
    work_dir: PathBuf,
    status: ServiceStatus,
}

impl Session {
    pub fn new(config: Config, work_dir: PathBuf) -> Self {
        Session {
            config,
            work_dir,
            status: ServiceStatus {
                state: ServiceState::Starting,
                controls_accepted: ControlsAccepted::NONE,
                process_id: std::process::id(),
                exit_code: None,
            },
        }
    }

    /// Reads the config afresh; the service always runs what is on disk now.
    pub fn load(config_path: &Path) -> Result<Self, AppError> {
        let config = config::load_config(config_path).map_err(AppError::CantReadConfig)?;
        let work_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Session::new(config, work_dir))
    }

    pub fn service_name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Image to launch, relative paths resolved against the config directory.
    pub fn image_path(&self) -> Option<PathBuf> {
        let image = self.config.image.trim();
        if image.is_empty() {
            return None;
        }
        let image = Path::new(image);
        if image.is_absolute() {
            Some(image.to_path_buf())
        } else {
            Some(self.work_dir.join(image))
        }
    }

    fn report(
        &mut self,
        status_tx: &UnboundedSender<ServiceStatus>,
        state: ServiceState,
        controls_accepted: ControlsAccepted,
        exit_code: Option<u32>,
    ) {
        self.status = ServiceStatus {
            state,
            controls_accepted,
            process_id: self.status.process_id,
            exit_code,
        };
        if status_tx.send(self.status.clone()).is_err() {
            warn!("[{}] status receiver is gone, dropped {:?}", self.config.name, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_image(image: &str) -> Session {
        let config = Config {
            name: "demo".to_string(),
            image: image.to_string(),
            ..Default::default()
        };
        Session::new(config, PathBuf::from("/srv/demo"))
    }

    #[test]
    fn test_relative_image_joins_config_dir() {
        let session = session_with_image("bin/app");
        assert_eq!(session.image_path(), Some(PathBuf::from("/srv/demo/bin/app")));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_image_unchanged() {
        let session = session_with_image("/usr/bin/app");
        assert_eq!(session.image_path(), Some(PathBuf::from("/usr/bin/app")));
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(session_with_image("  ").image_path(), None);
    }

    #[test]
    fn test_new_session_is_starting() {
        let session = session_with_image("app");
        assert_eq!(session.status.state, ServiceState::Starting);
        assert_eq!(session.status.process_id, std::process::id());
        assert_eq!(session.status.exit_code, None);
    }

    #[test]
    fn test_load_uses_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        std::fs::write(&path, r#"{"Name":"demo","Image":"app","Options":["--flag"]}"#).unwrap();
        let session = Session::load(&path).unwrap();
        assert_eq!(session.service_name(), "demo");
        assert_eq!(session.work_dir(), dir.path());
        assert_eq!(session.config().options, vec!["--flag"]);
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = Session::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(AppError::CantReadConfig(_))));
    }
}

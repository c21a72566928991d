use std::{
    path::{Path, PathBuf},
    thread,
};

use anyhow::{anyhow, bail, Result};
use log::{error, info, warn};
use nix::unistd::{getppid, Pid};
use service_manager::{
    ServiceInstallCtx, ServiceLabel, ServiceManager, ServiceManagerKind, ServiceUninstallCtx,
};
use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::unbounded_channel;

use super::manager::{ServiceRegistration, ServiceRegistry, SysService};
use crate::{
    error::{AppError, ExitCode},
    supervisor::{self, ControlRequest, ServiceStatus, Session},
};

pub(crate) struct UnixSysService {}

impl UnixSysService {
    pub fn new() -> Self {
        UnixSysService {}
    }
}

impl SysService for UnixSysService {
    fn connect(&self) -> Result<Box<dyn ServiceRegistry + '_>> {
        let kind = ServiceManagerKind::native()?;
        let manager = <dyn ServiceManager>::target(kind);
        if !manager.available()? {
            bail!("native service manager is not available");
        }
        Ok(Box::new(UnixServiceRegistry { kind, manager }))
    }

    fn run(&self, session: Session) -> Result<u32, AppError> {
        if !is_service_context(std::env::var_os("INVOCATION_ID").is_some(), getppid()) {
            return Err(AppError::NotAService);
        }
        let name = session.service_name().to_string();
        let (control_tx, control_rx) = unbounded_channel();
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])
            .map_err(|e| AppError::CantDetectContext(e.into()))?;
        let signal_handle = signals.handle();
        let signal_thread = thread::spawn(move || {
            for signal in signals.forever() {
                let request = match signal {
                    SIGHUP => ControlRequest::ParamChange,
                    _ => ControlRequest::Stop,
                };
                if control_tx.send(request).is_err() {
                    break;
                }
            }
        });

        info!("starting {} as service", name);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build();
        let code = match runtime {
            Ok(runtime) => runtime.block_on(async move {
                let (status_tx, mut status_rx) = unbounded_channel::<ServiceStatus>();
                let reporter = tokio::spawn(async move {
                    while let Some(status) = status_rx.recv().await {
                        info!("[{}] service is {:?}", name, status.state);
                    }
                });
                let code = supervisor::supervise(session, vec![], control_rx, status_tx).await;
                let _ = reporter.await;
                code
            }),
            Err(e) => {
                error!("couldn't build runtime: {}", e);
                ExitCode::CantStartImage.value()
            }
        };
        signal_handle.close();
        let _ = signal_thread.join();
        Ok(code)
    }
}

/// Started by systemd (which sets `INVOCATION_ID`), or orphaned onto init by
/// another supervisor.
fn is_service_context(has_invocation_id: bool, parent: Pid) -> bool {
    has_invocation_id || parent == Pid::from_raw(1)
}

const SYSTEMD_UNIT_DIRS: [&str; 3] = [
    "/etc/systemd/system",
    "/usr/lib/systemd/system",
    "/lib/systemd/system",
];

/// Files where the given manager keeps a system-level service definition.
fn definition_paths(kind: ServiceManagerKind, label: &ServiceLabel) -> Vec<PathBuf> {
    let script = label.to_script_name();
    match kind {
        ServiceManagerKind::Systemd => SYSTEMD_UNIT_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(format!("{}.service", script)))
            .collect(),
        ServiceManagerKind::OpenRc => vec![Path::new("/etc/init.d").join(script)],
        ServiceManagerKind::Rcd => vec![Path::new("/usr/local/etc/rc.d").join(script)],
        ServiceManagerKind::Launchd => vec![Path::new("/Library/LaunchDaemons")
            .join(format!("{}.plist", label.to_qualified_name()))],
        _ => vec![],
    }
}

fn existing_definition(paths: &[PathBuf]) -> Option<&PathBuf> {
    paths.iter().find(|path| path.exists())
}

struct UnixServiceRegistry {
    kind: ServiceManagerKind,
    manager: Box<dyn ServiceManager>,
}

impl ServiceRegistry for UnixServiceRegistry {
    fn register(&self, registration: &ServiceRegistration) -> Result<String> {
        let settings = &registration.settings;
        let label = parse_label(&registration.name)?;
        // service-manager overwrites an existing definition in place
        if let Some(path) = existing_definition(&definition_paths(self.kind, &label)) {
            bail!("service {} already exists ({})", registration.name, path.display());
        }
        if !settings.dependencies.is_empty() {
            warn!(
                "{} dependencies are not supported by this service manager, ignored: {:?}",
                registration.name, settings.dependencies
            );
        }
        if settings.password.is_some() {
            warn!("{} password is not supported by this service manager, ignored", registration.name);
        }
        self.manager.install(ServiceInstallCtx {
            label,
            program: registration.executable.clone(),
            args: registration.arguments.clone(),
            contents: None,
            username: settings.account_name.clone(),
            working_directory: None,
            environment: None,
        })?;
        Ok(registration.name.clone())
    }

    fn unregister(&self, name: &str) -> Result<()> {
        self.manager.uninstall(ServiceUninstallCtx {
            label: parse_label(name)?,
        })?;
        Ok(())
    }
}

fn parse_label(name: &str) -> Result<ServiceLabel> {
    name.parse()
        .map_err(|e| anyhow!("invalid service name {:?}: {}", name, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        assert!(parse_label("demo").is_ok());
    }

    #[test]
    fn test_service_context() {
        assert!(is_service_context(true, Pid::from_raw(4242)));
        assert!(is_service_context(false, Pid::from_raw(1)));
        assert!(!is_service_context(false, Pid::from_raw(4242)));
    }

    #[test]
    fn test_run_outside_service_context() {
        // a test runner is neither started by systemd nor orphaned onto init
        if std::env::var_os("INVOCATION_ID").is_some() || getppid() == Pid::from_raw(1) {
            return;
        }
        let config = crate::config::Config {
            name: "demo".to_string(),
            image: "/bin/true".to_string(),
            ..Default::default()
        };
        let session = Session::new(config, PathBuf::from("."));
        let err = UnixSysService::new().run(session).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::NotAService);
        assert_eq!(err.exit_code().value(), 7);
    }

    #[test]
    fn test_systemd_definition_paths() {
        let label = parse_label("demo").unwrap();
        let paths = definition_paths(ServiceManagerKind::Systemd, &label);
        assert_eq!(paths[0], PathBuf::from("/etc/systemd/system/demo.service"));
        assert!(paths.iter().all(|path| path.ends_with("demo.service")));
        assert!(definition_paths(ServiceManagerKind::Sc, &label).is_empty());
    }

    #[test]
    fn test_existing_definition_found() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.service");
        let present = dir.path().join("demo.service");
        std::fs::write(&present, "[Unit]\n").unwrap();

        assert_eq!(existing_definition(&[absent.clone()]), None);
        assert_eq!(
            existing_definition(&[absent, present.clone()]),
            Some(&present)
        );
    }
}

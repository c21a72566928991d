use std::{ffi::OsString, sync::Mutex, time::Duration};

use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, error, info};
use tokio::sync::mpsc::unbounded_channel;
use windows_service::{
    define_windows_service,
    service::{
        self, ServiceAccess, ServiceControl, ServiceControlAccept, ServiceDependency,
        ServiceErrorControl, ServiceExitCode, ServiceInfo, ServiceStartType, ServiceType,
    },
    service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle},
    service_dispatcher,
    service_manager::{ServiceManager, ServiceManagerAccess},
};

use super::manager::{ServiceRegistration, ServiceRegistry, SysService};
use crate::{
    config::{ServiceKind, StartKind},
    error::{AppError, ExitCode},
    supervisor::{
        self, ControlRequest, ControlsAccepted, ServiceState, ServiceStatus, Session,
    },
};

define_windows_service!(ffi_service_main, sys_service_main);

const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

lazy_static! {
    static ref SESSION: Mutex<Option<Session>> = Mutex::new(None);
}

pub(crate) struct WindowsSysService {}

impl WindowsSysService {
    pub fn new() -> Self {
        WindowsSysService {}
    }
}

impl SysService for WindowsSysService {
    fn connect(&self) -> Result<Box<dyn ServiceRegistry + '_>> {
        let manager_access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
        let manager = ServiceManager::local_computer(None::<&str>, manager_access)?;
        Ok(Box::new(WindowsServiceRegistry { manager }))
    }

    fn run(&self, session: Session) -> Result<u32, AppError> {
        let service_name = session.service_name().to_string();
        if let Ok(mut global) = SESSION.lock() {
            global.replace(session);
        }
        info!("starting {} as windows service", service_name);
        match service_dispatcher::start(&service_name, ffi_service_main) {
            Ok(()) => Ok(0),
            Err(windows_service::Error::Winapi(e))
                if e.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) =>
            {
                Err(AppError::NotAService)
            }
            Err(e) => Err(AppError::CantDetectContext(e.into())),
        }
    }
}

struct WindowsServiceRegistry {
    manager: ServiceManager,
}

impl ServiceRegistry for WindowsServiceRegistry {
    fn register(&self, registration: &ServiceRegistration) -> Result<String> {
        let settings = &registration.settings;
        let display_name = if settings.display_name.is_empty() {
            &registration.name
        } else {
            &settings.display_name
        };
        let service_info = ServiceInfo {
            name: OsString::from(&registration.name),
            display_name: OsString::from(display_name),
            service_type: service_type(settings.service_kind),
            start_type: start_type(settings.start_kind),
            error_control: ServiceErrorControl::Normal,
            executable_path: registration.executable.clone(),
            launch_arguments: registration.arguments.clone(),
            dependencies: settings
                .dependencies
                .iter()
                .map(|name| ServiceDependency::Service(OsString::from(name)))
                .collect(),
            account_name: settings.account_name.as_ref().map(OsString::from),
            account_password: settings.password.as_ref().map(OsString::from),
        };
        let service = self.manager.create_service(
            &service_info,
            ServiceAccess::CHANGE_CONFIG | ServiceAccess::QUERY_CONFIG,
        )?;
        if !settings.description.is_empty() {
            service.set_description(&settings.description)?;
        }
        if settings.delayed_auto_start {
            service.set_delayed_auto_start(true)?;
        }
        Ok(registration.name.clone())
    }

    fn unregister(&self, name: &str) -> Result<()> {
        let service = self.manager.open_service(name, ServiceAccess::DELETE)?;
        service.delete()?;
        Ok(())
    }
}

fn service_type(kind: ServiceKind) -> ServiceType {
    match kind {
        ServiceKind::OwnProcess => ServiceType::OWN_PROCESS,
        ServiceKind::ShareProcess => ServiceType::SHARE_PROCESS,
        ServiceKind::UserOwnProcess => ServiceType::USER_OWN_PROCESS,
        ServiceKind::UserShareProcess => ServiceType::USER_SHARE_PROCESS,
        ServiceKind::KernelDriver => ServiceType::KERNEL_DRIVER,
        ServiceKind::FileSystemDriver => ServiceType::FILE_SYSTEM_DRIVER,
        ServiceKind::Interactive => ServiceType::INTERACTIVE_PROCESS,
    }
}

fn start_type(kind: StartKind) -> ServiceStartType {
    match kind {
        StartKind::Boot => ServiceStartType::BootStart,
        StartKind::System => ServiceStartType::SystemStart,
        StartKind::Auto | StartKind::DelayedAuto => ServiceStartType::AutoStart,
        StartKind::Manual => ServiceStartType::OnDemand,
        StartKind::Disabled => ServiceStartType::Disabled,
    }
}

fn native_status(status: &ServiceStatus) -> service::ServiceStatus {
    let current_state = match status.state {
        ServiceState::Starting => service::ServiceState::StartPending,
        ServiceState::Running => service::ServiceState::Running,
        ServiceState::StopPending => service::ServiceState::StopPending,
        ServiceState::Stopped => service::ServiceState::Stopped,
    };
    let mut controls_accepted = ServiceControlAccept::empty();
    if status.controls_accepted.stop {
        controls_accepted |= ServiceControlAccept::STOP;
    }
    if status.controls_accepted.shutdown {
        controls_accepted |= ServiceControlAccept::SHUTDOWN;
    }
    service::ServiceStatus {
        service_type: SERVICE_TYPE,
        current_state,
        controls_accepted,
        exit_code: match status.exit_code {
            Some(code) => ServiceExitCode::ServiceSpecific(code),
            None => ServiceExitCode::Win32(0),
        },
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: Some(status.process_id),
    }
}

fn run_service(session: Session, arguments: Vec<OsString>) -> Result<()> {
    let (control_tx, control_rx) = unbounded_channel();
    let event_handler = move |control_event| -> ServiceControlHandlerResult {
        let request = match control_event {
            ServiceControl::Stop => ControlRequest::Stop,
            ServiceControl::Shutdown => ControlRequest::Shutdown,
            // Always return NoError even if not implemented.
            ServiceControl::Interrogate => ControlRequest::Interrogate,
            _ => return ServiceControlHandlerResult::NotImplemented,
        };
        if control_tx.send(request).is_err() {
            debug!("supervisor gone, dropped {:?} request", request);
        }
        ServiceControlHandlerResult::NoError
    };
    let status_handle = service_control_handler::register(session.service_name(), event_handler)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build();
    let (code, stopped_reported) = match runtime {
        Ok(runtime) => runtime.block_on(async move {
            let (status_tx, mut status_rx) = unbounded_channel();
            let forwarder = tokio::spawn(async move {
                let mut stopped = false;
                while let Some(status) = status_rx.recv().await {
                    stopped |= status.state == ServiceState::Stopped;
                    set_status(status_handle, &status);
                }
                stopped
            });
            let code = supervisor::supervise(session, arguments, control_rx, status_tx).await;
            (code, forwarder.await.unwrap_or(false))
        }),
        Err(e) => {
            error!("couldn't build runtime: {}", e);
            (ExitCode::CantStartImage.value(), false)
        }
    };

    // launch failures never report, the manager still has to learn the code
    if !stopped_reported {
        set_status(
            status_handle,
            &ServiceStatus {
                state: ServiceState::Stopped,
                controls_accepted: ControlsAccepted::NONE,
                process_id: std::process::id(),
                exit_code: Some(code),
            },
        );
    }
    Ok(())
}

fn set_status(handle: ServiceStatusHandle, status: &ServiceStatus) {
    if let Err(e) = handle.set_service_status(native_status(status)) {
        error!("couldn't report {:?} status: {}", status.state, e);
    }
}

fn sys_service_main(arguments: Vec<OsString>) {
    let session = SESSION.lock().ok().and_then(|mut global| global.take());
    let Some(session) = session else {
        error!("service started without a session");
        return;
    };
    if let Err(e) = run_service(session, arguments) {
        error!("service main failed: {:?}", e);
    }
}

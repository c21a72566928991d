use std::{ffi::OsString, process::ExitStatus};

use log::{debug, error, info, warn};
use tokio::{
    process::Command,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
};
use tokio_util::sync::CancellationToken;

use super::{ControlRequest, ControlsAccepted, ServiceState, ServiceStatus, Session};
use crate::error::ExitCode;

/// Runs the configured image to completion and returns the service-specific
/// exit code to report.
///
/// Whichever comes first ends the session: the image exiting on its own, or a
/// stop/shutdown request, which kills the image. Either way the image's own
/// exit code is returned unchanged. Launch failures return
/// [`ExitCode::CantStartImage`] without reporting any status.
pub async fn supervise(
    mut session: Session,
    _arguments: Vec<OsString>,
    requests: UnboundedReceiver<ControlRequest>,
    status_tx: UnboundedSender<ServiceStatus>,
) -> u32 {
    let name = session.service_name().to_string();
    let Some(image) = session.image_path() else {
        error!("[{}] config names no image to run", name);
        return ExitCode::CantFindImage.value();
    };

    let mut command = Command::new(&image);
    command
        .args(&session.config().options)
        .current_dir(session.work_dir())
        .kill_on_drop(true);
    debug!(
        "[{}] launching {} {:?} in {}",
        name,
        image.display(),
        session.config().options,
        session.work_dir().display()
    );
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!("[{}] couldn't start image {}: {}", name, image.display(), e);
            return ExitCode::CantStartImage.value();
        }
    };
    info!(
        "[{}] started {} with pid {}",
        name,
        image.display(),
        child
            .id()
            .map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
    );
    session.report(
        &status_tx,
        ServiceState::Running,
        ControlsAccepted::STOP_AND_SHUTDOWN,
        None,
    );

    let stop = CancellationToken::new();
    let listener = tokio::spawn(listen_controls(name.clone(), requests, stop.clone()));

    let waited = tokio::select! {
        status = child.wait() => status,
        _ = stop.cancelled() => {
            session.report(&status_tx, ServiceState::StopPending, ControlsAccepted::NONE, None);
            info!("[{}] stop requested, killing image", name);
            if let Err(e) = child.start_kill() {
                warn!("[{}] kill failed: {}", name, e);
            }
            child.wait().await
        }
    };
    listener.abort();

    let code = match waited {
        Ok(status) => {
            info!("[{}] image exited with {}", name, status);
            exit_code(status)
        }
        Err(e) => {
            error!("[{}] lost track of image: {}", name, e);
            if let Err(e) = child.start_kill() {
                warn!("[{}] kill failed: {}", name, e);
            }
            ExitCode::LostImage.value()
        }
    };
    session.report(
        &status_tx,
        ServiceState::Stopped,
        ControlsAccepted::NONE,
        Some(code),
    );
    code
}

/// Drains control requests, firing `stop` on stop or shutdown.
async fn listen_controls(
    name: String,
    mut requests: UnboundedReceiver<ControlRequest>,
    stop: CancellationToken,
) {
    while let Some(request) = requests.recv().await {
        match request {
            ControlRequest::Stop | ControlRequest::Shutdown => {
                info!("[{}] received {:?} request", name, request);
                stop.cancel();
            }
            ControlRequest::Interrogate | ControlRequest::ParamChange => {
                debug!("[{}] ignoring {:?} request", name, request);
            }
        }
    }
    debug!("[{}] control channel closed", name);
}

/// The image's exit code reinterpreted as unsigned. A signal death on unix
/// maps to 128 + signal, as shells report it.
fn exit_code(status: ExitStatus) -> u32 {
    if let Some(code) = status.code() {
        return code as u32;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal as u32;
        }
    }
    ExitCode::LostImage.value()
}

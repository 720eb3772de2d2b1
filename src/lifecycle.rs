//! Startup and shutdown of the capture loop and the streaming server.
//!
//! ```text
//! Idle -> Opening -> Configuring -> Streaming -> ShuttingDown -> Closed
//! ```
//!
//! Any startup failure jumps straight to `Closed` before a listener exists.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::capture::{CameraDriver, CameraHandle};
use crate::error::{Error, Result};
use crate::pipeline::FrameBroker;
use crate::profile::{Profile, ProfileRegistry};
use crate::server::{ServerHandle, StreamServer};
use crate::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Opening,
    Configuring,
    /// Capture loop and HTTP server both running.
    Streaming,
    ShuttingDown,
    Closed,
}

type CaptureOutcome<H> = (H, Result<()>);

struct Running<H> {
    capture: JoinHandle<CaptureOutcome<H>>,
    stop_capture: Arc<AtomicBool>,
    server: ServerHandle,
}

/// Owns the camera driver and drives the system through its states.
pub struct LifecycleController<D: CameraDriver> {
    driver: D,
    registry: Arc<ProfileRegistry>,
    profile_name: String,
    server_config: ServerConfig,
    broker: Arc<FrameBroker>,
    state: watch::Sender<LifecycleState>,
    history: Vec<LifecycleState>,
    profile: Option<Profile>,
    running: Option<Running<D::Handle>>,
}

impl<D: CameraDriver> LifecycleController<D> {
    pub fn new(
        driver: D,
        registry: Arc<ProfileRegistry>,
        profile_name: impl Into<String>,
        server_config: ServerConfig,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            driver,
            registry,
            profile_name: profile_name.into(),
            server_config,
            broker: Arc::new(FrameBroker::new()),
            state,
            history: vec![LifecycleState::Idle],
            profile: None,
            running: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state changes from another task.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn broker(&self) -> Arc<FrameBroker> {
        self.broker.clone()
    }

    /// Profile applied to the camera, once configured.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Address the server is listening on while streaming.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.server.local_addr())
    }

    fn transition(&mut self, next: LifecycleState) {
        info!("Lifecycle: {:?} -> {:?}", self.state(), next);
        self.history.push(next);
        self.state.send_replace(next);
    }

    /// Start everything, stream until `shutdown` resolves or capture fails, then
    /// shut down. A capture failure is returned after the shutdown sequence.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        let finished = match self.running.as_mut() {
            Some(running) => tokio::select! {
                _ = shutdown => {
                    info!("Shutdown requested");
                    None
                }
                joined = &mut running.capture => Some(joined),
            },
            None => None,
        };

        self.shutdown_with(finished).await
    }

    /// Open, configure, start capturing, then start serving.
    ///
    /// A controller is single use: once `Closed` it refuses to start again.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        if self.state() == LifecycleState::Closed {
            return Err(Error::AlreadyClosed);
        }

        self.transition(LifecycleState::Opening);
        let mut handle = match self.driver.open() {
            Ok(handle) => handle,
            Err(e) => return Err(self.abort(None, e)),
        };

        self.transition(LifecycleState::Configuring);
        let profile = match self.registry.resolve(&self.profile_name) {
            Ok(profile) => profile,
            Err(e) => return Err(self.abort(Some(handle), e)),
        };
        info!(
            "Using profile `{}`: {} @ {} fps, sensor mode {}",
            profile.name, profile.device.resolution, profile.device.framerate, profile.device.sensor_mode
        );
        if let Err(e) = handle.configure(&profile.device) {
            return Err(self.abort(Some(handle), e));
        }
        if let Err(e) = handle.start_continuous_capture() {
            return Err(self.abort(Some(handle), e));
        }

        let server = match StreamServer::bind(&self.server_config, self.broker.clone()).await {
            Ok(server) => server,
            Err(e) => {
                if let Err(stop_err) = handle.stop() {
                    warn!("Failed to stop capture: {stop_err}");
                }
                return Err(self.abort(Some(handle), e));
            }
        };
        let server = match server.spawn() {
            Ok(server) => server,
            Err(source) => {
                let e = Error::Bind {
                    addr: format!("{}:{}", self.server_config.bind, self.server_config.port),
                    source,
                };
                return Err(self.abort(Some(handle), e));
            }
        };

        let stop_capture = Arc::new(AtomicBool::new(false));
        let capture = {
            let broker = self.broker.clone();
            let stop = stop_capture.clone();
            tokio::task::spawn_blocking(move || capture_loop(handle, broker, stop))
        };

        self.profile = Some(profile);
        self.running = Some(Running {
            capture,
            stop_capture,
            server,
        });
        self.transition(LifecycleState::Streaming);
        Ok(())
    }

    /// Stop capture, close the broker, close the device, then close the
    /// listening socket. Each step is best effort and waits at most the
    /// configured grace period; the state always ends `Closed`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown_with(None).await
    }

    async fn shutdown_with(
        &mut self,
        finished: Option<std::result::Result<CaptureOutcome<D::Handle>, JoinError>>,
    ) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            if self.state() != LifecycleState::Closed {
                self.transition(LifecycleState::Closed);
            }
            return Ok(());
        };
        self.transition(LifecycleState::ShuttingDown);
        let grace = self.server_config.shutdown_grace();

        // 1. Stop the capture loop
        running.stop_capture.store(true, Ordering::Release);
        let joined = match finished {
            Some(joined) => Some(joined),
            None => tokio::time::timeout(grace, &mut running.capture).await.ok(),
        };
        let (mut handle, outcome) = match joined {
            Some(Ok((handle, outcome))) => (Some(handle), outcome),
            Some(Err(e)) => (None, Err(Error::CaptureFailure(format!("capture thread panicked: {e}")))),
            None => {
                // The thread still owns the handle and drops it when the read returns
                warn!("Capture loop did not stop within {grace:?}, leaving it behind");
                (None, Ok(()))
            }
        };
        if let Some(handle) = handle.as_mut() {
            if let Err(e) = handle.stop() {
                warn!("Failed to stop capture: {e}");
            }
        }

        // 2. Release every waiting stream session
        self.broker.shutdown();

        // 3. Close the device
        if let Some(handle) = handle {
            if let Err(e) = handle.close() {
                warn!("Failed to close camera: {e}");
            }
        }

        // 4. Close the listening socket once the sessions have drained
        running.server.stop(grace).await;

        self.transition(LifecycleState::Closed);
        outcome
    }

    fn abort(&mut self, handle: Option<D::Handle>, cause: Error) -> Error {
        error!("Startup failed: {cause}");
        if let Some(handle) = handle {
            if let Err(e) = handle.close() {
                warn!("Failed to close camera: {e}");
            }
        }
        self.transition(LifecycleState::Closed);
        cause
    }
}

/// Pull frames into the broker until asked to stop or the sequence fails.
///
/// Runs on a blocking thread; the handle is handed back so the controller can
/// stop and close it.
fn capture_loop<H: CameraHandle>(
    mut handle: H,
    broker: Arc<FrameBroker>,
    stop: Arc<AtomicBool>,
) -> CaptureOutcome<H> {
    let outcome = pump_frames(&mut handle, &broker, &stop);
    if let Err(e) = &outcome {
        error!("Capture loop terminated: {e}");
    }
    (handle, outcome)
}

fn pump_frames<H: CameraHandle>(handle: &mut H, broker: &FrameBroker, stop: &AtomicBool) -> Result<()> {
    info!("Capture loop started");
    let mut frames = handle.frames();
    while !stop.load(Ordering::Acquire) {
        match frames.next() {
            Some(Ok(frame)) => {
                broker.publish(frame);
            }
            Some(Err(Error::CaptureFailure(reason))) => return Err(Error::CaptureFailure(reason)),
            Some(Err(other)) => return Err(Error::CaptureFailure(other.to_string())),
            None => {
                // A stop racing with the camera ending its sequence is still a clean stop
                if stop.load(Ordering::Acquire) {
                    break;
                }
                return Err(Error::CaptureFailure("frame sequence ended".into()));
            }
        }
    }
    info!("Capture loop stopped at version {}", broker.version());
    Ok(())
}

//! Session lifecycle: one camera stream, one render loop, one overlay.

use crate::capture::{CameraProvider, CaptureError, CaptureSource};
use crate::config::SessionConfig;
use crate::detection::{DetectionClient, Dispatch};
use crate::output::OutputSink;
use crate::overlay::composite;
use crate::scheduler::{FrameScheduler, TickOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Camera requested, no frame shown yet
    Starting,
    Running,
    Stopping,
}

/// What the user-facing controls should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub busy: bool,
    pub fps: u32,
}

impl Controls {
    pub fn idle() -> Self {
        Self {
            start_enabled: true,
            stop_enabled: false,
            busy: false,
            fps: 0,
        }
    }

    fn starting() -> Self {
        Self {
            start_enabled: false,
            stop_enabled: true,
            busy: true,
            fps: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera acquisition failed: {0}")]
    Acquisition(#[from] CaptureError),

    #[error("failed to spawn render loop: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("render loop exited before the camera opened")]
    Aborted,
}

struct Status {
    state: SessionState,
    controls: Controls,
}

/// Overlay and display surface, locked by the render loop once per tick
struct Surface {
    scheduler: FrameScheduler,
    sink: Box<dyn OutputSink + Send>,
}

struct RenderLoop {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct Session {
    config: SessionConfig,
    provider: Arc<dyn CameraProvider>,
    client: DetectionClient,
    surface: Arc<Mutex<Surface>>,
    status: Arc<Mutex<Status>>,
    render_loop: Option<RenderLoop>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn CameraProvider>,
        scheduler: FrameScheduler,
        client: DetectionClient,
        sink: Box<dyn OutputSink + Send>,
    ) -> Self {
        Self {
            config,
            provider,
            client,
            surface: Arc::new(Mutex::new(Surface { scheduler, sink })),
            status: Arc::new(Mutex::new(Status {
                state: SessionState::Idle,
                controls: Controls::idle(),
            })),
            render_loop: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().state
    }

    pub fn controls(&self) -> Controls {
        self.status.lock().controls
    }

    /// Whether a render loop is scheduled
    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.render_loop.is_some()
    }

    #[cfg(test)]
    pub fn overlay_is_clear(&self) -> bool {
        self.surface.lock().scheduler.canvas().is_clear()
    }

    pub fn client(&self) -> &DetectionClient {
        &self.client
    }

    /// Open `device` (or the default camera) and start rendering.
    ///
    /// Any running session is stopped first. Returns once the camera is open
    /// or has failed to open; the session reaches `Running` when the first
    /// frame is drawn.
    pub fn start(&mut self, device: Option<&str>) -> Result<(), SessionError> {
        self.stop();

        self.set_status(SessionState::Starting, Controls::starting());
        self.client.begin_session();
        tracing::info!("Starting session on {}", device.unwrap_or("default camera"));

        let cancel = Arc::new(AtomicBool::new(false));
        let (opened_tx, opened_rx) = mpsc::channel();
        let worker = RenderWorker {
            provider: Arc::clone(&self.provider),
            device: device.map(str::to_string),
            surface: Arc::clone(&self.surface),
            status: Arc::clone(&self.status),
            cancel: Arc::clone(&cancel),
            settle_delay: self.config.settle_delay,
            refresh_interval: self.config.refresh_interval(),
        };

        let handle = match thread::Builder::new()
            .name("render-loop".to_string())
            .spawn(move || worker.run(opened_tx))
        {
            Ok(handle) => handle,
            Err(err) => {
                self.set_idle();
                return Err(SessionError::Spawn(err));
            }
        };

        match opened_rx.recv() {
            Ok(Ok((width, height))) => {
                tracing::info!("Camera open at {}x{}, waiting for first frame", width, height);
                self.render_loop = Some(RenderLoop { cancel, handle });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                tracing::error!("Error accessing camera: {}", err);
                self.set_idle();
                Err(SessionError::Acquisition(err))
            }
            Err(_) => {
                let _ = handle.join();
                tracing::error!("Render loop exited before the camera opened");
                self.set_idle();
                Err(SessionError::Aborted)
            }
        }
    }

    /// Cancel the render loop, release the camera and reset the controls.
    /// Does nothing beyond re-asserting idle controls when already stopped.
    pub fn stop(&mut self) {
        if let Some(render_loop) = self.render_loop.take() {
            self.status.lock().state = SessionState::Stopping;
            render_loop.cancel.store(true, Ordering::Release);
            if render_loop.handle.join().is_err() {
                tracing::error!("Render loop panicked");
            }

            let mut surface = self.surface.lock();
            surface.scheduler.reset();
            if let Err(err) = surface.sink.clear() {
                tracing::warn!("Failed to clear output: {:#}", err);
            }
            tracing::info!("Session stopped");
        }
        self.set_idle();
    }

    /// Stop and release the session
    pub fn dispose(mut self) {
        self.stop();
    }

    fn set_status(&self, state: SessionState, controls: Controls) {
        let mut status = self.status.lock();
        status.state = state;
        status.controls = controls;
    }

    fn set_idle(&self) {
        self.set_status(SessionState::Idle, Controls::idle());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the render thread needs, moved onto it at start
struct RenderWorker {
    provider: Arc<dyn CameraProvider>,
    device: Option<String>,
    surface: Arc<Mutex<Surface>>,
    status: Arc<Mutex<Status>>,
    cancel: Arc<AtomicBool>,
    settle_delay: Duration,
    refresh_interval: Duration,
}

type OpenResult = Result<(u32, u32), CaptureError>;

impl RenderWorker {
    fn run(self, opened: mpsc::Sender<OpenResult>) {
        thread::sleep(self.settle_delay);

        let mut source = match self.provider.open(self.device.as_deref()) {
            Ok(source) => {
                let _ = opened.send(Ok(source.resolution()));
                source
            }
            Err(err) => {
                let _ = opened.send(Err(err));
                return;
            }
        };

        self.render(source.as_mut());

        if let Err(err) = source.stop() {
            tracing::warn!("{}", err);
        }
    }

    fn render(&self, source: &mut dyn CaptureSource) {
        let mut playing = false;
        let mut failed_reads = 0u32;

        while !self.cancel.load(Ordering::Acquire) {
            let tick_start = Instant::now();

            match source.capture_frame() {
                Ok(frame) => {
                    failed_reads = 0;
                    if let TickOutcome::Rendered { fps, .. } = self.draw(&frame, tick_start) {
                        if !playing {
                            playing = true;
                            self.mark_playing();
                        }
                        if let Some(fps) = fps {
                            self.status.lock().controls.fps = fps;
                            tracing::debug!(fps, "Render rate");
                        }
                    }
                }
                Err(err) => {
                    failed_reads += 1;
                    if failed_reads == 1 {
                        tracing::warn!("{}", err);
                    } else {
                        tracing::debug!(failed_reads, "{}", err);
                    }
                }
            }

            let elapsed = tick_start.elapsed();
            if elapsed < self.refresh_interval {
                thread::sleep(self.refresh_interval - elapsed);
            }
        }
    }

    fn draw(&self, frame: &image::RgbImage, now: Instant) -> TickOutcome {
        let mut surface = self.surface.lock();
        let outcome = surface.scheduler.tick(frame, now);
        if let TickOutcome::Rendered { dispatch, .. } = outcome {
            match dispatch {
                Some(Dispatch::Sent(seq)) => tracing::trace!(seq, "Frame sent for detection"),
                Some(Dispatch::Failed(seq)) => tracing::trace!(seq, "Frame not sent"),
                Some(Dispatch::Saturated) | None => {}
            }
            let composed = composite(frame, surface.scheduler.canvas());
            if let Err(err) = surface.sink.write_frame(&composed) {
                tracing::warn!("Failed to write frame: {:#}", err);
            }
        }
        outcome
    }

    fn mark_playing(&self) {
        let mut status = self.status.lock();
        if status.state == SessionState::Starting {
            status.state = SessionState::Running;
            status.controls.busy = false;
            tracing::info!(
                start_enabled = status.controls.start_enabled,
                stop_enabled = status.controls.stop_enabled,
                "Video playing, no longer busy"
            );
        }
    }
}

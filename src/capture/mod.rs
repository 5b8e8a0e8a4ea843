mod webcam;

pub use webcam::NokhwaProvider;

use image::RgbImage;
use thiserror::Error;

/// Failures while enumerating or opening capture devices
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("failed to read frame: {0}")]
    Frame(String),

    #[error("failed to stop camera stream: {0}")]
    Stop(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// A selectable video input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub display_name: String,
}

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture the current frame. A frame with a zero dimension means the
    /// stream has not buffered enough data yet.
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the native resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Stop every track of the stream
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Platform access to video input devices.
///
/// Sources returned by `open` are used only on the thread that opened them,
/// so they do not need to be `Send`.
pub trait CameraProvider: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a capture stream on `device`, or the platform default when `None`.
    fn open(&self, device: Option<&str>) -> Result<Box<dyn CaptureSource>>;
}

/// List the available video input devices.
///
/// Enumeration failures (for example before permission is granted) yield an
/// empty list instead of an error.
pub fn list_devices(provider: &dyn CameraProvider) -> Vec<DeviceInfo> {
    let devices = match provider.enumerate() {
        Ok(devices) => devices,
        Err(err) => {
            tracing::warn!("Device enumeration unavailable: {}", err);
            return Vec::new();
        }
    };

    devices
        .into_iter()
        .enumerate()
        .map(|(i, device)| {
            if device.display_name.trim().is_empty() {
                DeviceInfo {
                    display_name: format!("Camera {}", i + 1),
                    ..device
                }
            } else {
                device
            }
        })
        .collect()
}

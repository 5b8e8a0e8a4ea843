use super::{CameraProvider, CaptureError, CaptureSource, DeviceInfo, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Opens local webcams through nokhwa
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaProvider;

impl CameraProvider for NokhwaProvider {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| CaptureError::Enumeration(e.to_string()))?;

        Ok(cameras
            .into_iter()
            .map(|info| DeviceInfo {
                id: info.index().to_string(),
                display_name: info.human_name(),
            })
            .collect())
    }

    fn open(&self, device: Option<&str>) -> Result<Box<dyn CaptureSource>> {
        let index = device.map(camera_index).unwrap_or(CameraIndex::Index(0));
        Ok(Box::new(WebcamCapture::open(index)?))
    }
}

/// Numeric ids select by index, anything else is passed through as a device
/// path or platform identifier.
fn camera_index(device: &str) -> CameraIndex {
    match device.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(device.to_string()),
    }
}

/// Video-only capture stream bound to one webcam
pub struct WebcamCapture {
    camera: Camera,
    device: String,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn open(index: CameraIndex) -> Result<Self> {
        let device = index.to_string();
        tracing::info!("Opening webcam {}", device);

        let open_error = |e: nokhwa::NokhwaError| CaptureError::Open {
            device: device.clone(),
            reason: e.to_string(),
        };

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(index, requested).map_err(open_error)?;
        camera.open_stream().map_err(open_error)?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam {} streaming at {}x{}",
            device,
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
            device,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Frame(e.to_string()))?;

        buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Frame(e.to_string()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stop(&mut self) -> Result<()> {
        tracing::info!("Stopping webcam {}", self.device);
        self.camera
            .stop_stream()
            .map_err(|e| CaptureError::Stop(e.to_string()))
    }
}

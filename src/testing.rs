//! Fakes shared by the unit tests.

use crate::capture::{self, CameraProvider, CaptureError, CaptureSource, DeviceInfo};
use crate::detection::{DetectError, Detection, Detector};
use crate::output::OutputSink;
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn detection(label: &str) -> Detection {
    Detection {
        x1: 10.0,
        y1: 10.0,
        x2: 50.0,
        y2: 50.0,
        label: label.to_string(),
        score: 0.93,
    }
}

/// Poll `condition` for up to two seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Answers immediately with a fixed list
pub struct FixedDetector(pub Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectError> {
        Ok(self.0.clone())
    }
}

/// Holds every request until `release` is called, then answers with nothing
#[derive(Default)]
pub struct BlockingDetector {
    released: Mutex<bool>,
    wake: Condvar,
}

impl BlockingDetector {
    pub fn release(&self) {
        *self.released.lock() = true;
        self.wake.notify_all();
    }
}

impl Detector for BlockingDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectError> {
        let mut released = self.released.lock();
        while !*released {
            self.wake.wait(&mut released);
        }
        Ok(Vec::new())
    }
}

/// Camera provider producing solid grey 64x48 frames
#[derive(Default)]
pub struct FakeProvider {
    pub fail_open: bool,
    /// Zero-sized frames delivered before real ones
    pub unready_frames: usize,
    pub opened: Arc<Mutex<Vec<Option<String>>>>,
    pub stopped: Arc<AtomicUsize>,
}

impl CameraProvider for FakeProvider {
    fn enumerate(&self) -> capture::Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: "0".to_string(),
            display_name: "Fake Camera".to_string(),
        }])
    }

    fn open(&self, device: Option<&str>) -> capture::Result<Box<dyn CaptureSource>> {
        if self.fail_open {
            return Err(CaptureError::Open {
                device: device.unwrap_or("default").to_string(),
                reason: "device busy".to_string(),
            });
        }
        self.opened.lock().push(device.map(str::to_string));
        Ok(Box::new(FakeSource {
            unready_frames: self.unready_frames,
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeSource {
    unready_frames: usize,
    stopped: Arc<AtomicUsize>,
}

impl CaptureSource for FakeSource {
    fn capture_frame(&mut self) -> capture::Result<RgbImage> {
        if self.unready_frames > 0 {
            self.unready_frames -= 1;
            return Ok(RgbImage::new(0, 0));
        }
        Ok(RgbImage::from_pixel(64, 48, image::Rgb([90, 90, 90])))
    }

    fn resolution(&self) -> (u32, u32) {
        (64, 48)
    }

    fn stop(&mut self) -> capture::Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Output that counts what it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<AtomicUsize>,
    clears: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl OutputSink for RecordingSink {
    fn write_frame(&mut self, _frame: &RgbImage) -> anyhow::Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (64, 48)
    }
}

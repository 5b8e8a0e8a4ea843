mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbImage;

/// Trait for display surfaces receiving composited frames
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Detach the video from the surface
    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Headless surface that discards frames
#[derive(Debug, Default)]
pub struct NullOutput {
    frames: u64,
}

impl OutputSink for NullOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames += 1;
        tracing::trace!(frame = self.frames, "Discarding {}x{} frame", frame.width(), frame.height());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (0, 0)
    }
}

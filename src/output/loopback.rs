use super::OutputSink;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Display surface backed by a v4l2loopback device
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the YUYV format before any frame is written so readers
        // attaching to the loopback see the right geometry.
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let negotiated = Output::set_format(&device, &requested)
            .context("Failed to set v4l2loopback output format")?;
        if negotiated.width != width || negotiated.height != height {
            tracing::warn!(
                "Loopback negotiated {}x{} instead of {}x{}",
                negotiated.width,
                negotiated.height,
                width,
                height
            );
        }

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width: negotiated.width,
            height: negotiated.height,
        })
    }
}

/// Pack an RGB frame as YUYV 4:2:2, averaging chroma over each pixel pair
fn rgb_to_yuyv(frame: &RgbImage) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    let row_len = width as usize * 3;
    let mut yuyv = Vec::with_capacity(width as usize * height as usize * 2);

    for row in frame.as_raw().chunks_exact(row_len) {
        let mut pixels = row.chunks_exact(3);
        while let Some(first) = pixels.next() {
            // An odd trailing pixel is paired with itself
            let second = pixels.next().unwrap_or(first);
            let (y0, u0, v0) = bt601(first[0], first[1], first[2]);
            let (y1, u1, v1) = bt601(second[0], second[1], second[2]);
            yuyv.extend_from_slice(&[
                y0,
                ((u0 as u16 + u1 as u16) / 2) as u8,
                y1,
                ((v0 as u16 + v1 as u16) / 2) as u8,
            ]);
        }
    }

    yuyv
}

/// Integer BT.601 studio-swing conversion
fn bt601(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (
        y.clamp(0, 255) as u8,
        u.clamp(0, 255) as u8,
        v.clamp(0, 255) as u8,
    )
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let yuyv = if frame.dimensions() != (self.width, self.height) {
            let scaled = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
            rgb_to_yuyv(&scaled)
        } else {
            rgb_to_yuyv(frame)
        };

        self.file
            .write_all(&yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.write_frame(&blank)
            .context("Failed to blank v4l2loopback device")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

//! Remote object detection: the wire client, the shared snapshot it feeds and
//! the dispatcher that keeps requests off the render loop.

mod client;
mod http;
mod snapshot;

pub use client::{DetectionClient, Dispatch};
pub use http::HttpDetector;
pub use snapshot::{DetectionSnapshot, UpdatePolicy};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One bounding box reported by the detector, in source frame pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub label: String,
    pub score: f64,
}

impl Detection {
    /// Overlay caption, e.g. `helmet 0.93`
    pub fn caption(&self) -> String {
        format!("{} {}", self.label, fixed_two(self.score))
    }
}

/// Format with two decimals, rounding exact ties away from zero.
///
/// `{:.2}` already rounds on the exact binary value but sends a tie such as
/// 0.625 to the even digit. Forty digits are enough to tell a true tie from a
/// value merely close to one for any score of 0.005 or more.
fn fixed_two(value: f64) -> String {
    let exact = format!("{:.40}", value.abs());
    let tie = exact
        .split_once('.')
        .map(|(_, digits)| digits[2..].starts_with('5') && digits[3..].bytes().all(|d| d == b'0'))
        .unwrap_or(false);
    if tie {
        format!("{:.2}", value + value.signum() * 0.001)
    } else {
        format!("{:.2}", value)
    }
}

/// Failures of a single detection round trip. None of these are fatal; the
/// previous snapshot stays on screen and the next interval retries.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error("request to detector failed: {0}")]
    Transport(String),

    #[error("detector responded with HTTP {0}")]
    Status(u16),

    #[error("malformed detector response: {0}")]
    Malformed(String),

    #[error("detector response has no detections field")]
    MissingDetections,
}

/// Anything that turns a frame into detections
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectError>;
}

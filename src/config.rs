use crate::detection::UpdatePolicy;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/realtime/frame";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid detector endpoint '{url}': {reason}")]
    Endpoint { url: String, reason: String },

    #[error("JPEG quality must be between 1 and 100, got {0}")]
    JpegQuality(u8),

    #[error("refresh rate must be between 1 and 240 Hz, got {0}")]
    RefreshRate(u32),

    #[error("detection interval must be non-zero")]
    DetectionInterval,
}

/// Tunables for one capture/detect/render session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Url,
    /// Minimum time between detection dispatches
    pub detection_interval: Duration,
    pub jpeg_quality: u8,
    /// Pause between signalling busy and opening the camera
    pub settle_delay: Duration,
    /// Render ticks per second
    pub refresh_rate: u32,
    pub request_timeout: Duration,
    /// Concurrent detection requests allowed; 0 means unbounded
    pub max_in_flight: usize,
    pub update_policy: UpdatePolicy,
    pub font_size: u32,
    pub line_width: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            detection_interval: Duration::from_millis(200),
            jpeg_quality: 80,
            settle_delay: Duration::from_millis(1000),
            refresh_rate: 60,
            request_timeout: Duration::from_secs(5),
            max_in_flight: 1,
            update_policy: UpdatePolicy::LatestDispatch,
            font_size: 18,
            line_width: 3,
        }
    }
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Endpoint {
                url: self.endpoint.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        if !(1..=240).contains(&self.refresh_rate) {
            return Err(ConfigError::RefreshRate(self.refresh_rate));
        }
        if self.detection_interval.is_zero() {
            return Err(ConfigError::DetectionInterval);
        }
        Ok(())
    }
}

pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Endpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

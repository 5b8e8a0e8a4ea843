use super::{DetectError, Detection, Detector};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct FrameRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct FrameResponse {
    #[serde(default)]
    detections: Option<Vec<Detection>>,
}

/// Detector reached over HTTP: `POST {"image": <data URI>}` answered by
/// `{"detections": [...]}`.
pub struct HttpDetector {
    agent: ureq::Agent,
    endpoint: Url,
    jpeg_quality: u8,
}

impl HttpDetector {
    pub fn new(endpoint: Url, jpeg_quality: u8, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            endpoint,
            jpeg_quality,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Detector for HttpDetector {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectError> {
        let _span = tracing::debug_span!("detect", endpoint = %self.endpoint).entered();

        let image = encode_data_uri(frame, self.jpeg_quality)?;
        let body = serde_json::to_string(&FrameRequest { image: &image })
            .map_err(|e| DetectError::Encode(e.to_string()))?;
        tracing::debug!("Posting {}x{} frame ({} bytes)", frame.width(), frame.height(), body.len());

        let response = match self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(DetectError::Status(code)),
            Err(e) => return Err(DetectError::Transport(e.to_string())),
        };

        let text = response
            .into_string()
            .map_err(|e| DetectError::Transport(e.to_string()))?;
        parse_response(&text)
    }
}

/// JPEG-compress a frame and wrap it as a `data:image/jpeg;base64,` URI
pub fn encode_data_uri(frame: &RgbImage, quality: u8) -> Result<String, DetectError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(frame)
        .map_err(|e| DetectError::Encode(e.to_string()))?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(&jpeg)
    ))
}

/// Extract the detections from a response body.
///
/// A body without a `detections` field (such as `{"error": "no image"}`) is
/// not an update.
pub fn parse_response(body: &str) -> Result<Vec<Detection>, DetectError> {
    let response: FrameResponse =
        serde_json::from_str(body).map_err(|e| DetectError::Malformed(e.to_string()))?;
    response.detections.ok_or(DetectError::MissingDetections)
}

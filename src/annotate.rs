use crate::detection::Detector;
use crate::overlay::{composite, Canvas, OverlayRenderer};
use anyhow::{Context, Result};
use std::path::Path;

/// Run one detection round trip on a still image and save it with the overlay
/// burned in. Returns the number of detections drawn.
pub fn annotate_file(
    detector: &dyn Detector,
    renderer: &OverlayRenderer,
    input: &Path,
    output: &Path,
) -> Result<usize> {
    let frame = image::open(input)
        .with_context(|| format!("Failed to read image {}", input.display()))?
        .to_rgb8();
    tracing::info!(
        "Annotating {} ({}x{})",
        input.display(),
        frame.width(),
        frame.height()
    );

    let detections = detector
        .detect(&frame)
        .context("Detection request failed")?;

    let mut canvas = Canvas::new(frame.width(), frame.height());
    renderer.render(&mut canvas, &detections);
    composite(&frame, &canvas)
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!("Wrote {} with {} detections", output.display(), detections.len());
    Ok(detections.len())
}

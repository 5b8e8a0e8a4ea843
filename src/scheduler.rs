//! Per-display-frame tick: throttled detection dispatch plus a redraw of the
//! latest detections on every frame.

use crate::detection::{DetectionClient, Dispatch};
use crate::overlay::{Canvas, OverlayRenderer};
use image::RgbImage;
use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_millis(1000);

/// Gates the detection dispatch to one per interval
#[derive(Debug, Clone)]
pub struct DispatchThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl DispatchThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True once strictly more than `interval` has passed since the last stamp
    pub fn ready(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |last| now.saturating_duration_since(last) > self.interval)
    }

    pub fn stamp(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Counts ticks and publishes the count once per second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
        }
    }

    /// Record one tick; returns the new rate when a window closes
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        if now.saturating_duration_since(start) >= FPS_WINDOW {
            let rate = std::mem::take(&mut self.frames);
            self.window_start = Some(now);
            return Some(rate);
        }
        None
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame had no known dimensions yet; nothing was drawn
    NotReady,
    Rendered {
        dispatch: Option<Dispatch>,
        fps: Option<u32>,
    },
}

/// Owns the overlay canvas and drives detection and rendering for each frame
pub struct FrameScheduler {
    client: DetectionClient,
    renderer: OverlayRenderer,
    canvas: Canvas,
    throttle: DispatchThrottle,
    fps: FpsCounter,
}

impl FrameScheduler {
    pub fn new(client: DetectionClient, renderer: OverlayRenderer, interval: Duration) -> Self {
        Self {
            client,
            renderer,
            canvas: Canvas::new(0, 0),
            throttle: DispatchThrottle::new(interval),
            fps: FpsCounter::new(),
        }
    }

    pub fn tick(&mut self, frame: &RgbImage, now: Instant) -> TickOutcome {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return TickOutcome::NotReady;
        }

        if self.canvas.resize(width, height) {
            tracing::debug!("Overlay resized to {}x{}", width, height);
        }

        let dispatch = if self.throttle.ready(now) {
            let dispatch = self.client.dispatch(frame.clone());
            // A saturated client is retried on the next tick
            if dispatch != Dispatch::Saturated {
                self.throttle.stamp(now);
            }
            Some(dispatch)
        } else {
            None
        };

        let detections = self.client.snapshot().current();
        self.renderer.render(&mut self.canvas, &detections);

        TickOutcome::Rendered {
            dispatch,
            fps: self.fps.tick(now),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Back to the stopped state: blank overlay, zeroed counters
    pub fn reset(&mut self) {
        self.canvas.clear();
        self.throttle.reset();
        self.fps.reset();
    }
}

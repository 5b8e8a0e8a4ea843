use super::{DetectionSnapshot, Detector, UpdatePolicy};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Result of asking the client to send a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A request with this sequence number is now in flight
    Sent(u64),
    /// The in-flight bound is reached; nothing was sent
    Saturated,
    /// No worker could be started for this request
    Failed(u64),
}

/// Sends frames to a [`Detector`] on worker threads and folds the answers into
/// a [`DetectionSnapshot`]. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct DetectionClient {
    detector: Arc<dyn Detector>,
    snapshot: DetectionSnapshot,
    policy: UpdatePolicy,
    max_in_flight: usize,
    next_seq: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

/// Releases an in-flight slot when the worker finishes, panics included
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DetectionClient {
    /// `max_in_flight == 0` leaves concurrent requests unbounded.
    pub fn new(detector: Arc<dyn Detector>, policy: UpdatePolicy, max_in_flight: usize) -> Self {
        Self {
            detector,
            snapshot: DetectionSnapshot::new(),
            policy,
            max_in_flight,
            next_seq: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn snapshot(&self) -> &DetectionSnapshot {
        &self.snapshot
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Clear the snapshot for a new session. Requests already in flight can no
    /// longer update it.
    pub fn begin_session(&self) {
        self.snapshot.reset(self.next_seq.load(Ordering::Acquire));
    }

    /// Send `frame` without waiting for the answer.
    pub fn dispatch(&self, frame: RgbImage) -> Dispatch {
        if !self.reserve_slot() {
            tracing::trace!("Detection request skipped, {} in flight", self.in_flight());
            return Dispatch::Saturated;
        }
        let slot = InFlightSlot(Arc::clone(&self.in_flight));
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;

        let detector = Arc::clone(&self.detector);
        let snapshot = self.snapshot.clone();
        let policy = self.policy;

        let spawned = thread::Builder::new()
            .name(format!("detect-{}", seq))
            .spawn(move || {
                let _slot = slot;
                match detector.detect(&frame) {
                    Ok(detections) => {
                        let count = detections.len();
                        if snapshot.apply(seq, detections, policy) {
                            tracing::debug!(seq, "Applied {} detections", count);
                        } else {
                            tracing::debug!(seq, "Discarded stale detection response");
                        }
                    }
                    Err(err) => tracing::warn!(seq, "Detection round trip failed: {}", err),
                }
            });

        // On spawn failure the closure, and with it the slot, is dropped
        match spawned {
            Ok(_) => Dispatch::Sent(seq),
            Err(err) => {
                tracing::warn!(seq, "Failed to spawn detection worker: {}", err);
                Dispatch::Failed(seq)
            }
        }
    }

    fn reserve_slot(&self) -> bool {
        if self.max_in_flight == 0 {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            })
            .is_ok()
    }
}

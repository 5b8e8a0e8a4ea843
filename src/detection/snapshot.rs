use super::Detection;
use parking_lot::Mutex;
use std::sync::Arc;

/// How completed requests are allowed to overwrite the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Apply a response only if it was dispatched after the one currently shown
    #[default]
    LatestDispatch,
    /// Apply every response as it completes, even if an earlier dispatch
    /// finishes after a later one
    CompletionOrder,
}

struct SnapshotState {
    detections: Arc<[Detection]>,
    /// Sequence number of the response currently held
    applied: u64,
    /// Responses at or below this sequence number belong to an earlier session
    floor: u64,
}

impl Default for SnapshotState {
    fn default() -> Self {
        Self {
            detections: Arc::from(Vec::new()),
            applied: 0,
            floor: 0,
        }
    }
}

/// Most recent detections, shared between request workers and the renderer.
///
/// Replaced wholesale on every accepted response; readers get a cheap
/// reference to an immutable list.
#[derive(Clone, Default)]
pub struct DetectionSnapshot {
    state: Arc<Mutex<SnapshotState>>,
}

impl DetectionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<[Detection]> {
        Arc::clone(&self.state.lock().detections)
    }

    /// Offer the response to request `seq`. Returns whether it was applied.
    pub fn apply(&self, seq: u64, detections: Vec<Detection>, policy: UpdatePolicy) -> bool {
        let mut state = self.state.lock();
        if seq <= state.floor {
            return false;
        }
        if policy == UpdatePolicy::LatestDispatch && seq <= state.applied {
            return false;
        }
        state.detections = detections.into();
        state.applied = seq;
        true
    }

    /// Empty the snapshot and reject any response dispatched at or before `floor`
    pub fn reset(&self, floor: u64) {
        let mut state = self.state.lock();
        state.detections = Arc::from(Vec::new());
        state.applied = floor;
        state.floor = floor;
    }
}

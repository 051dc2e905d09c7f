//! Geometry checks behind the automatic load triggers.
//!
//! These are pure functions: the loader owns the state that decides *when* they are evaluated
//! (re-arming, debouncing) and the gate decides whether a positive answer becomes a fetch.

use crate::{ScrollMetrics, SentinelRect};

/// Returns `true` when the sentinel overlaps the viewport grown by `threshold` on both edges.
///
/// This mirrors an intersection observer with a symmetric root margin: the marker counts as
/// visible slightly before it scrolls into view.
pub fn sentinel_in_range(metrics: &ScrollMetrics, sentinel: &SentinelRect, threshold: u32) -> bool {
    let margin = threshold as u64;
    let view_start = metrics.scroll_offset.saturating_sub(margin);
    let view_end = metrics.viewport_end().saturating_add(margin);
    sentinel.start <= view_end && sentinel.end() >= view_start
}

/// Returns `true` when the end of the viewport is within `threshold` of the end of the content.
///
/// Content that fits entirely in the viewport is always "near the end".
pub fn near_end(metrics: &ScrollMetrics, threshold: u32) -> bool {
    metrics.distance_to_end() <= threshold as u64
}

/// Edge detector for the proximity signal.
///
/// Fires on a not-visible → visible transition. `rearm` forgets the last observation so that a
/// marker which is still visible fires again on the next evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ProximityLatch {
    visible: bool,
}

impl ProximityLatch {
    pub fn rearm(&mut self) {
        self.visible = false;
    }

    /// Records the latest visibility and reports whether it is a rising edge.
    pub fn observe(&mut self, visible: bool) -> bool {
        let fired = visible && !self.visible;
        self.visible = visible;
        fired
    }
}

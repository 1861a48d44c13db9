/// Discovery: the distance-filtered swipe queue
///
/// The queue is built once from a raw REST candidate page plus the viewer
/// coordinate, then mutated only through `advance`/`rewind`/rebuild. UI code
/// never splices the candidate list or moves the cursor directly, which is
/// what keeps the cursor/bounds invariant intact.
use crate::error::Result;
use crate::geo::{filter_by_radius, Coordinate};
use crate::rest::{Candidate, SwipeAction};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of the viewer's current coordinate. The platform location service
/// sits behind this seam; tests and the probe binary use `FixedLocation`.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_coordinate(&self) -> Result<Coordinate>;
}

pub struct FixedLocation(pub Coordinate);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_coordinate(&self) -> Result<Coordinate> {
        Ok(self.0)
    }
}

/// One consumed swipe, kept for history/rewind bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct SwipeRecord {
    pub candidate: Candidate,
    pub action: SwipeAction,
}

#[derive(Debug, Default)]
struct SwipeInner {
    /// Last-fetched unfiltered page; re-filters always start from this
    raw: Vec<Candidate>,
    candidates: Vec<Candidate>,
    cursor: usize,
    origin: Option<Coordinate>,
    radius_km: f64,
    history: Vec<SwipeRecord>,
}

#[derive(Clone)]
pub struct SwipeQueue {
    inner: Arc<RwLock<SwipeInner>>,
}

impl SwipeQueue {
    pub fn new(radius_km: f64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SwipeInner {
                radius_km,
                ..Default::default()
            })),
        }
    }

    /// Load a fresh raw candidate list and build the ordered queue from it.
    /// Resets the cursor; swipe history is preserved across loads.
    pub async fn load(&self, raw: Vec<Candidate>, origin: Coordinate) {
        let mut inner = self.inner.write().await;
        inner.raw = raw;
        inner.origin = Some(origin);
        Self::rebuild(&mut inner);
    }

    /// Candidate under the cursor, or `None` once the queue is exhausted.
    /// The UI renders a terminal "no more profiles" state, never an error.
    pub async fn current(&self) -> Option<Candidate> {
        let inner = self.inner.read().await;
        inner.candidates.get(inner.cursor).cloned()
    }

    /// Move past the current candidate, recording the decision. Called after
    /// the swipe-submission REST call resolves (success or failure), so a
    /// slow or failing backend can never wedge the deck. Clamps at the end.
    pub async fn advance(&self, action: SwipeAction) -> Option<Candidate> {
        let mut inner = self.inner.write().await;
        if let Some(candidate) = inner.candidates.get(inner.cursor).cloned() {
            inner.history.push(SwipeRecord { candidate, action });
        }
        inner.cursor = (inner.cursor + 1).min(inner.candidates.len());
        inner.candidates.get(inner.cursor).cloned()
    }

    /// Circular undo: from the top of the queue this wraps to the last
    /// candidate rather than clamping at zero. Deliberate product behavior,
    /// covered by tests.
    pub async fn rewind(&self) -> Option<Candidate> {
        let mut inner = self.inner.write().await;
        let len = inner.candidates.len();
        inner.cursor = if len == 0 { 0 } else { (inner.cursor + len - 1) % len };
        inner.candidates.get(inner.cursor).cloned()
    }

    /// Change the radius preference; the queue is rebuilt from the raw list
    /// and the cursor resets. Position is never preserved across a re-filter.
    pub async fn set_radius(&self, radius_km: f64) {
        let mut inner = self.inner.write().await;
        inner.radius_km = radius_km;
        Self::rebuild(&mut inner);
    }

    /// Viewer moved; same rebuild semantics as a radius change
    pub async fn set_origin(&self, origin: Coordinate) {
        let mut inner = self.inner.write().await;
        inner.origin = Some(origin);
        Self::rebuild(&mut inner);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.candidates.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.candidates.is_empty()
    }

    pub async fn remaining(&self) -> usize {
        let inner = self.inner.read().await;
        inner.candidates.len().saturating_sub(inner.cursor)
    }

    pub async fn history(&self) -> Vec<SwipeRecord> {
        self.inner.read().await.history.clone()
    }

    fn rebuild(inner: &mut SwipeInner) {
        inner.candidates = match inner.origin {
            Some(origin) => filter_by_radius(inner.raw.clone(), origin, inner.radius_km),
            None => Vec::new(),
        };
        inner.cursor = 0;
        debug!(
            "Swipe queue rebuilt: {} of {} candidates within {} km",
            inner.candidates.len(),
            inner.raw.len(),
            inner.radius_km
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(user_id: &str, lon: f64) -> Candidate {
        Candidate {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            age: None,
            bio: None,
            photo_url: None,
            coordinate: Some(Coordinate::new(0.0, lon)),
            distance_km: None,
        }
    }

    async fn loaded_queue() -> SwipeQueue {
        let queue = SwipeQueue::new(200.0);
        // Distances ~11, ~22, ~33 km; arrives shuffled, queue orders them
        let raw = vec![candidate("b", 0.2), candidate("a", 0.1), candidate("c", 0.3)];
        queue.load(raw, Coordinate::new(0.0, 0.0)).await;
        queue
    }

    #[tokio::test]
    async fn test_queue_ordered_by_distance() {
        let queue = loaded_queue().await;
        assert_eq!(queue.current().await.unwrap().user_id, "a");
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_advance_clamps_at_end() {
        let queue = loaded_queue().await;
        queue.advance(SwipeAction::Like).await;
        queue.advance(SwipeAction::Pass).await;
        queue.advance(SwipeAction::Like).await;
        assert!(queue.current().await.is_none());

        // Further advances stay clamped; no panic, still the empty sentinel
        queue.advance(SwipeAction::Like).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.remaining().await, 0);
        assert_eq!(queue.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_rewind_wraps_to_end() {
        let queue = loaded_queue().await;
        // Cursor at 0: a single rewind lands on the last candidate
        let back = queue.rewind().await.unwrap();
        assert_eq!(back.user_id, "c");

        // Consecutive rewinds keep walking backwards
        assert_eq!(queue.rewind().await.unwrap().user_id, "b");
        assert_eq!(queue.rewind().await.unwrap().user_id, "a");
    }

    #[tokio::test]
    async fn test_rewind_from_exhausted_returns_last() {
        let queue = loaded_queue().await;
        for _ in 0..3 {
            queue.advance(SwipeAction::Pass).await;
        }
        assert!(queue.current().await.is_none());
        assert_eq!(queue.rewind().await.unwrap().user_id, "c");
    }

    #[tokio::test]
    async fn test_rewind_on_empty_queue_is_safe() {
        let queue = SwipeQueue::new(50.0);
        assert!(queue.rewind().await.is_none());
        assert!(queue.current().await.is_none());
    }

    #[tokio::test]
    async fn test_refilter_rebuilds_and_resets_cursor() {
        let queue = loaded_queue().await;
        queue.advance(SwipeAction::Like).await;
        assert_eq!(queue.current().await.unwrap().user_id, "b");

        // Tighter radius keeps only the nearest candidate, cursor resets
        queue.set_radius(15.0).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.current().await.unwrap().user_id, "a");

        // Moving the viewer rebuilds as well
        queue.set_origin(Coordinate::new(0.0, 0.3)).await;
        assert_eq!(queue.current().await.unwrap().user_id, "c");
    }
}

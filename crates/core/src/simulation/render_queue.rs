//! Bounded hand-off of finished frames to the renderer
//!
//! The solver thread pushes one snapshot per step; a renderer thread polls
//! them in order. When the renderer falls behind, the oldest unconsumed frame
//! is evicted and returned to the snapshot pool (drop-oldest backpressure).

use super::pool::SnapshotPool;
use crate::error::SimError;
use crate::grid::GridSnapshot;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// FIFO ring of frames with overwrite-oldest semantics
pub struct RenderQueue {
    frames: Mutex<VecDeque<GridSnapshot>>,
    capacity: usize,
    pool: Arc<SnapshotPool>,
}

impl RenderQueue {
    /// Create a queue holding at most `capacity` frames (at least one)
    pub fn new(capacity: usize, pool: Arc<SnapshotPool>) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
            pool,
        }
    }

    /// Maximum number of queued frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// True when no frame is waiting
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Queue a frame, evicting the oldest ones beyond capacity
    ///
    /// Evicted frames go back to the pool. Returns how many were evicted.
    pub fn push(&self, frame: GridSnapshot) -> Result<usize, SimError> {
        let evicted: Vec<GridSnapshot> = {
            let mut frames = self.frames.lock();
            frames.push_back(frame);
            let excess = frames.len().saturating_sub(self.capacity);
            frames.drain(..excess).collect()
        };
        let count = evicted.len();
        if count > 0 {
            trace!("Render queue full, dropped {} oldest frame(s)", count);
        }
        self.give_back_all(evicted)?;
        Ok(count)
    }

    /// Take the oldest frame
    ///
    /// The caller owns it and should hand it back through [`Self::recycle`]
    /// once rendered.
    pub fn poll(&self) -> Option<GridSnapshot> {
        self.frames.lock().pop_front()
    }

    /// Look at the oldest frame without removing it
    ///
    /// The queue stays locked while the guard is alive.
    pub fn peek(&self) -> Option<MappedMutexGuard<'_, GridSnapshot>> {
        MutexGuard::try_map(self.frames.lock(), |frames| frames.front_mut()).ok()
    }

    /// Return a consumed frame to the pool
    pub fn recycle(&self, frame: GridSnapshot) -> Result<(), SimError> {
        self.pool.give_back(frame)
    }

    /// Return every queued frame to the pool
    pub fn clear(&self) -> Result<(), SimError> {
        let frames: Vec<GridSnapshot> = self.frames.lock().drain(..).collect();
        self.give_back_all(frames)
    }

    /// Hand every frame back, even past a failure; reports the first error
    fn give_back_all(&self, frames: Vec<GridSnapshot>) -> Result<(), SimError> {
        frames
            .into_iter()
            .map(|frame| self.pool.give_back(frame))
            .fold(Ok(()), |first, result| first.and(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FieldKind;

    fn tagged(pool: &SnapshotPool, tag: f64) -> GridSnapshot {
        let mut frame = pool.acquire();
        frame.field_mut(FieldKind::Pressure).fill(tag);
        frame
    }

    fn tag_of(frame: &GridSnapshot) -> f64 {
        frame.pressure.get(0, 0)
    }

    #[test]
    fn test_fifo_order() {
        let pool = Arc::new(SnapshotPool::new(4, 4, 0));
        let queue = RenderQueue::new(3, Arc::clone(&pool));
        for tag in 0..3_i32 {
            queue.push(tagged(&pool, f64::from(tag))).unwrap();
        }
        assert_eq!(queue.peek().map(|f| tag_of(&f)), Some(0.0));
        for expected in 0..3_i32 {
            let frame = queue.poll().unwrap();
            assert_eq!(tag_of(&frame), f64::from(expected));
            queue.recycle(frame).unwrap();
        }
        assert!(queue.poll().is_none());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_drop_oldest_backpressure() {
        let max = 4;
        let pool = Arc::new(SnapshotPool::with_capacity(4, 4, 0, 16));
        let queue = RenderQueue::new(max, Arc::clone(&pool));

        let frames: Vec<GridSnapshot> = (0..max + 5).map(|tag| tagged(&pool, tag as f64)).collect();
        let mut evicted = 0;
        for frame in frames {
            evicted += queue.push(frame).unwrap();
        }

        assert_eq!(evicted, 5);
        assert_eq!(queue.len(), max);
        // The five oldest are back in the pool
        assert_eq!(pool.available(), 5);
        assert_eq!(pool.outstanding(), max);

        let remaining: Vec<f64> = std::iter::from_fn(|| queue.poll())
            .map(|f| tag_of(&f))
            .collect();
        assert_eq!(remaining, vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_failed_return_does_not_strand_other_frames() {
        let pool = Arc::new(SnapshotPool::new(4, 4, 0));
        let queue = RenderQueue::new(3, Arc::clone(&pool));
        queue.push(GridSnapshot::new(3, 3)).unwrap();
        queue.push(tagged(&pool, 1.0)).unwrap();
        queue.push(tagged(&pool, 2.0)).unwrap();
        assert_eq!(pool.outstanding(), 2);

        let err = queue.clear().unwrap_err();
        assert!(matches!(err, SimError::SizeMismatch { .. }));
        assert!(queue.is_empty());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_failed_eviction_still_queues_new_frame() {
        let pool = Arc::new(SnapshotPool::new(4, 4, 0));
        let queue = RenderQueue::new(1, Arc::clone(&pool));
        queue.push(GridSnapshot::new(5, 5)).unwrap();

        assert!(queue.push(tagged(&pool, 3.0)).is_err());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|f| tag_of(&f)), Some(3.0));
    }

    #[test]
    fn test_clear_returns_everything() {
        let pool = Arc::new(SnapshotPool::new(4, 4, 0));
        let queue = RenderQueue::new(2, Arc::clone(&pool));
        queue.push(tagged(&pool, 1.0)).unwrap();
        queue.push(tagged(&pool, 2.0)).unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty());
        assert_eq!(pool.outstanding(), 0);
    }
}

//! Manually driven frame scheduler.

use std::{collections::VecDeque, time::Duration};

use parking_lot::Mutex;
use tabcast_core::{FrameCallback, FrameScheduler};

/// Scheduler whose frames run only when the owner says so.
///
/// Useful for deterministic tests and for embedders that already have a
/// frame clock of their own.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<FrameCallback>>,
    now: Mutex<Duration>,
    frames: Mutex<u64>,
}

impl ManualScheduler {
    /// Create a scheduler at timestamp zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame timestamp.
    #[must_use]
    pub fn now(&self) -> Duration {
        *self.now.lock()
    }

    /// Callbacks waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        *self.frames.lock()
    }

    /// Run one frame at the current timestamp.
    ///
    /// Callbacks requested while the frame runs wait for the next one.
    /// Returns the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        let batch: Vec<FrameCallback> = self.queue.lock().drain(..).collect();
        *self.frames.lock() += 1;

        let now = self.now();
        let count = batch.len();
        for callback in batch {
            callback(now);
        }
        count
    }

    /// Move the clock forward by `by`, then run one frame.
    pub fn advance(&self, by: Duration) -> usize {
        *self.now.lock() += by;
        self.run_frame()
    }

    /// Advance frame by frame until nothing is scheduled, at most `limit`
    /// frames. Returns the number of frames run.
    pub fn run_until_idle(&self, step: Duration, limit: usize) -> usize {
        let mut frames = 0;
        while frames < limit && self.pending() > 0 {
            self.advance(step);
            frames += 1;
        }
        frames
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        self.queue.lock().push_back(callback);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_frames_run_in_request_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scheduler.request_frame(Box::new(move |_| order.lock().push(i)));
        }

        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.advance(Duration::from_millis(16)), 3);
        assert_eq!(*order.lock(), [0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.frames(), 1);
    }

    #[test]
    fn test_requests_during_frame_wait_for_next() {
        let scheduler = Arc::new(ManualScheduler::new());
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&scheduler);
        let sink = Arc::clone(&stamps);
        scheduler.request_frame(Box::new(move |ts| {
            sink.lock().push(ts);
            let sink = Arc::clone(&sink);
            inner.request_frame(Box::new(move |ts| sink.lock().push(ts)));
        }));

        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert_eq!(
            *stamps.lock(),
            [Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_run_until_idle_respects_limit() {
        let scheduler = ManualScheduler::new();
        assert_eq!(scheduler.run_until_idle(Duration::from_millis(16), 10), 0);

        scheduler.request_frame(Box::new(|_| {}));
        assert_eq!(scheduler.run_until_idle(Duration::from_millis(16), 10), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(16));
    }
}

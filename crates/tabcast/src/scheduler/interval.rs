//! Tokio-driven frame scheduler.

use std::time::Duration;

use tabcast_core::{FrameCallback, FrameScheduler};
use tokio::{
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
    time::Instant,
};

/// Default frame interval (about 60 frames per second).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Scheduler running frames on a tokio task.
///
/// A frame runs one frame interval after the first callback of the batch was
/// requested; every callback queued by then runs in that frame. Timestamps
/// are measured from the scheduler's creation. Dropping the scheduler stops
/// the task.
pub struct IntervalScheduler {
    tx: mpsc::UnboundedSender<FrameCallback>,
    task: JoinHandle<()>,
    frame: Duration,
}

impl IntervalScheduler {
    /// Create a scheduler with the default frame interval.
    ///
    /// Returns `None` outside a tokio runtime.
    #[must_use]
    pub fn try_new() -> Option<Self> {
        Self::try_with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    /// Create a scheduler with a custom frame interval.
    ///
    /// Returns `None` outside a tokio runtime.
    #[must_use]
    pub fn try_with_frame_interval(frame: Duration) -> Option<Self> {
        let handle = Handle::try_current().ok()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = handle.spawn(drive(rx, frame, Instant::now()));
        Some(Self { tx, task, frame })
    }

    /// Time between frames.
    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        self.frame
    }
}

async fn drive(mut rx: mpsc::UnboundedReceiver<FrameCallback>, frame: Duration, origin: Instant) {
    while let Some(first) = rx.recv().await {
        tokio::time::sleep(frame).await;

        let mut batch = vec![first];
        while let Ok(callback) = rx.try_recv() {
            batch.push(callback);
        }

        let now = origin.elapsed();
        for callback in batch {
            callback(now);
        }
    }
}

impl FrameScheduler for IntervalScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        if self.tx.send(callback).is_err() {
            tracing::debug!("frame driver stopped, callback dropped");
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

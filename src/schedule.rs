use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type FrameCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback on the next frame of the host's render loop.
pub trait FrameScheduler {
    fn schedule(&self, callback: FrameCallback);
}

/// Runs the callback immediately, for hosts without a frame loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFrames;

impl FrameScheduler for ImmediateFrames {
    fn schedule(&self, callback: FrameCallback) {
        callback();
    }
}

/// Single-slot coalescing of preview adjustments: while one request is
/// waiting for its frame, further requests are dropped.
#[derive(Debug)]
pub struct AdjustmentScheduler<F> {
    frames: F,
    pending: Arc<AtomicBool>,
}

impl<F: FrameScheduler> AdjustmentScheduler<F> {
    pub fn new(frames: F) -> Self {
        Self {
            frames,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `false` when the request was folded into the pending one.
    pub fn request(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        let pending = Arc::clone(&self.pending);
        self.frames.schedule(Box::new(move || {
            pending.store(false, Ordering::Release);
            job();
        }));
        true
    }
}

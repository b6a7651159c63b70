use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::video::FrameListener;

/// Coalescing redraw request shared between decoder threads and the render thread
///
/// Decoder threads call [`request`](Self::request); only the first request after the
/// render thread [`take`](Self::take)s the flag invokes `wake`, which is expected to
/// post an event to the render thread's loop rather than render directly.
#[derive(Clone)]
pub struct RedrawSignal {
    pending: Arc<AtomicBool>,
    wake: Arc<dyn Fn() + Send + Sync>,
}

impl RedrawSignal {
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(wake),
        }
    }

    /// Signal whose wake-up posts through a fallible `send`
    ///
    /// A failed send only means the receiving loop has shut down; it is logged and dropped.
    pub fn with_sender<E: Display>(
        send: impl Fn() -> Result<(), E> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move || {
            if let Err(e) = send() {
                debug!("frame notification dropped: {e}");
            }
        })
    }

    pub fn request(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            (self.wake)();
        }
    }

    /// Clear the request; true if one was pending
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Frame listener that requests a redraw
    pub fn frame_listener(&self) -> FrameListener {
        let signal = self.clone();
        Arc::new(move || signal.request())
    }
}

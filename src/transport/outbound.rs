//! Bounded, lossy outbound frame queue
//!
//! `send_audio` must never block the capture path, and a congested channel
//! must never buffer without bound. Past capacity the OLDEST queued frame
//! is discarded, so what goes out is always the freshest audio.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::audio::AudioFrame;

/// Single-consumer frame queue between `send_audio` and the transport io
/// task. Cloning shares the same queue.
#[derive(Clone)]
pub struct OutboundQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

struct QueueState {
    frames: VecDeque<AudioFrame>,
    closed: bool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    frames: VecDeque::with_capacity(capacity.max(1)),
                    closed: false,
                }),
                notify: Notify::new(),
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue a frame without blocking
    ///
    /// At capacity the oldest queued frame is discarded to admit the new
    /// one. After close the frame is silently ignored.
    pub fn push(&self, frame: AudioFrame) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }
            if state.frames.len() == self.inner.capacity {
                state.frames.pop_front();
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("outbound queue full, dropped oldest frame ({} so far)", dropped);
            }
            state.frames.push_back(frame);
        }
        self.inner.notify.notify_one();
    }

    /// Dequeue the next frame in submission order
    ///
    /// Suspends while the queue is empty; `None` once it has been closed.
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().unwrap();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking dequeue
    pub fn try_pop(&self) -> Option<AudioFrame> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return None;
        }
        state.frames.pop_front()
    }

    /// Close the queue and discard anything still buffered
    ///
    /// A closing transport must not flush stale audio at the remote end.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.closed = true;
            state.frames.clear();
        }
        self.inner.notify.notify_one();
    }

    /// Frames discarded by the capacity bound so far
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot frame hand-off from the camera to the processing worker
//!
//! The camera never waits: a frame submitted while another is still pending
//! replaces it, and the replaced buffer goes straight back to the pool. The
//! worker therefore always sees the newest frame and at most one frame is
//! ever queued.

use crate::backends::camera::{BufferPool, Frame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

struct Slot {
    pending: Option<Frame>,
    shutdown: bool,
}

/// Newest-wins mailbox with a single consumer
pub struct FrameExchange {
    slot: Mutex<Slot>,
    ready: Condvar,
    pool: BufferPool,
    submitted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameExchange {
    /// Create an exchange that recycles overwritten frames into `pool`
    pub fn new(pool: BufferPool) -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                shutdown: false,
            }),
            ready: Condvar::new(),
            pool,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offer a frame, never blocks
    ///
    /// An unread pending frame is recycled and counted as dropped. After
    /// shutdown the frame is recycled immediately.
    pub fn submit(&self, frame: Frame) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let replaced = {
            let mut slot = self.lock();
            if slot.shutdown {
                Some(frame)
            } else {
                let replaced = slot.pending.replace(frame);
                self.ready.notify_one();
                replaced
            }
        };

        if let Some(old) = replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(sequence = old.sequence, "Dropping unprocessed frame");
            self.pool.recycle(old.into_buffer());
        }
    }

    /// Take the pending frame, waiting for one if necessary
    ///
    /// Returns `None` once the exchange is shut down.
    pub fn take_blocking(&self) -> Option<Frame> {
        let mut slot = self.lock();
        loop {
            if slot.shutdown {
                return None;
            }
            if let Some(frame) = slot.pending.take() {
                return Some(frame);
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Take the pending frame without waiting
    pub fn try_take(&self) -> Option<Frame> {
        let mut slot = self.lock();
        if slot.shutdown {
            return None;
        }
        slot.pending.take()
    }

    /// Wake the consumer and refuse further frames
    ///
    /// A frame still pending is returned to the pool.
    pub fn shutdown(&self) {
        let pending = {
            let mut slot = self.lock();
            slot.shutdown = true;
            self.ready.notify_all();
            slot.pending.take()
        };
        if let Some(frame) = pending {
            self.pool.recycle(frame.into_buffer());
        }
        debug!(
            submitted = self.submitted(),
            dropped = self.dropped(),
            "Frame exchange shut down"
        );
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Return a consumed frame's buffer to the pool
    pub fn recycle(&self, frame: Frame) {
        self.pool.recycle(frame.into_buffer());
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Frames submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Frames overwritten before the consumer saw them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn frame_from(pool: &BufferPool, sequence: u64) -> Frame {
        Frame {
            width: 4,
            height: 2,
            data: pool.acquire().expect("pool exhausted"),
            sequence,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_newest_frame_wins() {
        let pool = BufferPool::new(3, 12);
        let exchange = FrameExchange::new(pool.clone());

        for sequence in 0..5 {
            exchange.submit(frame_from(&pool, sequence));
        }

        let frame = exchange.try_take().unwrap();
        assert_eq!(frame.sequence, 4);
        assert_eq!(exchange.submitted(), 5);
        assert_eq!(exchange.dropped(), 4);
        assert!(exchange.try_take().is_none());

        // Everything except the frame in hand is back in the pool
        assert_eq!(pool.available(), 2);
        exchange.recycle(frame);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_take_blocking_waits_for_submit() {
        let pool = BufferPool::new(2, 12);
        let exchange = Arc::new(FrameExchange::new(pool.clone()));

        let consumer = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || exchange.take_blocking().map(|f| f.sequence))
        };

        thread::sleep(Duration::from_millis(20));
        exchange.submit(frame_from(&pool, 7));
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn test_shutdown_wakes_consumer() {
        let pool = BufferPool::new(2, 12);
        let exchange = Arc::new(FrameExchange::new(pool));

        let consumer = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || exchange.take_blocking().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        exchange.shutdown();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_submit_after_shutdown_recycles() {
        let pool = BufferPool::new(2, 12);
        let exchange = FrameExchange::new(pool.clone());
        exchange.submit(frame_from(&pool, 0));
        exchange.shutdown();
        assert_eq!(pool.available(), 2);

        exchange.submit(frame_from(&pool, 1));
        assert_eq!(pool.available(), 2);
        assert!(exchange.take_blocking().is_none());
    }
}

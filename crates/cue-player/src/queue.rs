//! Bounded thread-safe queues of interleaved audio samples.
//!
//! A [`SampleQueue`] connects the pipeline stages:
//! - decode thread → queue
//! - resampler thread → queue
//! - output callback drains the final queue (non-blocking)
//!
//! Closing a queue is the shutdown signal for everything downstream of it:
//! blocked producers return early, blocked consumers drain what is left and
//! then receive `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Size a queue (in samples) for roughly `seconds` of audio.
pub fn samples_for_seconds(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

struct QueueInner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Bounded multi-producer/multi-consumer queue of interleaved `f32` samples.
///
/// Samples are stored interleaved (`frame0[ch0], frame0[ch1], ...`) and the
/// channel count is fixed for the queue's lifetime. Capacity is a cap in
/// samples; use [`samples_for_seconds`] to derive one from a time target.
pub struct SampleQueue {
    channels: usize,
    capacity_samples: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl SampleQueue {
    pub fn new(channels: usize, capacity_samples: usize) -> Self {
        Self {
            channels,
            capacity_samples,
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Best-effort snapshot of buffered frames.
    pub fn len_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.samples.len() / self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Mark the queue closed and wake all waiters. Idempotent.
    ///
    /// Buffered samples stay available until drained.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns early (dropping the remainder) once the queue is closed.
    pub fn push_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.samples.len() >= self.capacity_samples && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return;
            }

            while offset < samples.len() && g.samples.len() < self.capacity_samples {
                g.samples.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Block until exactly `frames` whole frames are available.
    ///
    /// Returns `None` if the queue closes before enough data arrives.
    pub fn pop_exact(&self, frames: usize) -> Option<Vec<f32>> {
        let want = frames * self.channels;
        let mut g = self.inner.lock().unwrap();
        while g.samples.len() < want && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
        if g.samples.len() < want {
            return None;
        }
        let out = Self::take(&mut g, want);
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until at least one frame is available, then return up to
    /// `max_frames`. Returns `None` once the queue is closed and empty.
    pub fn pop_up_to(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        while g.samples.is_empty() && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
        if g.samples.is_empty() {
            return None;
        }
        let take = (g.samples.len() / self.channels).min(max_frames) * self.channels;
        let out = Self::take(&mut g, take);
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Return up to `max_frames` immediately, or `None` if currently empty.
    ///
    /// Safe to call from the real-time output callback.
    pub fn try_pop(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let take = (g.samples.len() / self.channels).min(max_frames) * self.channels;
        if take == 0 {
            return None;
        }
        let out = Self::take(&mut g, take);
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    fn take(g: &mut QueueInner, samples: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(samples);
        for _ in 0..samples {
            out.push(g.samples.pop_front().unwrap_or(0.0));
        }
        out
    }

    /// Block until the queue is closed and drained, or `cancel` becomes true.
    ///
    /// Returns `true` when the queue drained normally, `false` on cancel.
    pub fn wait_drained(&self, cancel: &Arc<AtomicBool>) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.samples.is_empty() {
                return true;
            }
            let (ng, _) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
            g = ng;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn samples_for_seconds_handles_bad_inputs() {
        assert_eq!(samples_for_seconds(48_000, 2, 2.0), 192_000);
        assert_eq!(samples_for_seconds(48_000, 2, -1.0), 192_000);
        assert_eq!(samples_for_seconds(48_000, 2, f32::NAN), 192_000);
    }

    #[test]
    fn try_pop_empty_returns_none() {
        let q = SampleQueue::new(2, 16);
        assert!(q.try_pop(4).is_none());
    }

    #[test]
    fn try_pop_returns_whole_frames() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = q.try_pop(2).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn pop_exact_waits_for_enough_frames() {
        let q = Arc::new(SampleQueue::new(2, 64));
        let q_pop = q.clone();
        let handle = thread::spawn(move || {
            let out = q_pop.pop_exact(3).unwrap();
            assert_eq!(out.len(), 6);
        });
        q.push_blocking(&[0.1, 0.2, 0.3, 0.4]);
        q.push_blocking(&[0.5, 0.6]);
        handle.join().unwrap();
    }

    #[test]
    fn pop_exact_returns_none_when_closed_short() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0]);
        q.close();
        assert!(q.pop_exact(2).is_none());
    }

    #[test]
    fn pop_up_to_drains_tail_then_none() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0]);
        q.close();
        let out = q.pop_up_to(8).unwrap();
        assert_eq!(out.len(), 4);
        assert!(q.pop_up_to(8).is_none());
    }

    #[test]
    fn push_after_close_is_dropped() {
        let q = SampleQueue::new(2, 64);
        q.close();
        q.push_blocking(&[1.0, 2.0]);
        assert_eq!(q.len_frames(), 0);
    }

    #[test]
    fn wait_drained_returns_true_when_closed_empty() {
        let q = SampleQueue::new(2, 64);
        let cancel = Arc::new(AtomicBool::new(false));
        q.close();
        assert!(q.wait_drained(&cancel));
    }

    #[test]
    fn wait_drained_respects_cancel() {
        let q = SampleQueue::new(2, 64);
        let cancel = Arc::new(AtomicBool::new(true));
        assert!(!q.wait_drained(&cancel));
    }
}

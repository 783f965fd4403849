//! Bounded sample queue between the decode thread and the output callback.
//!
//! Stores interleaved `f32` samples. The decoder blocks when the queue is
//! full; the output callback drains it without ever blocking. `close()`
//! makes shutdown deterministic: blocked pushes return early and the
//! callback can tell end-of-stream apart from a momentary underrun.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub(crate) struct SampleQueue {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct Inner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Queue capacity in samples for `(rate, channels, seconds)` of audio.
pub(crate) fn max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SampleQueue {
    pub(crate) fn new(channels: usize, max_buffered_samples: usize) -> Self {
        Self {
            channels,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels * 2),
        }
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    /// Closed queues may still hold samples until drained. Idempotent.
    pub(crate) fn close(&self) {
        let mut g = self.inner.lock().expect("sample queue lock");
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    pub(crate) fn is_done(&self) -> bool {
        self.inner.lock().expect("sample queue lock").done
    }

    /// Push interleaved samples, blocking while the queue is full.
    /// Returns early (dropping the remainder) once the queue is closed.
    pub(crate) fn push_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().expect("sample queue lock");
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).expect("sample queue lock");
            }
            if g.done {
                return;
            }
            while offset < samples.len() && g.queue.len() < self.max_buffered_samples {
                g.queue.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Take up to `max_frames` whole frames without blocking. `None`
    /// means no complete frame is buffered right now.
    pub(crate) fn pop_chunk(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().expect("sample queue lock");
        let available_frames = g.queue.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }
        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_falls_back_on_bogus_seconds() {
        assert_eq!(max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(max_buffered_samples(48_000, 2, f32::NAN), 192_000);
    }

    #[test]
    fn pop_returns_only_whole_frames() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0]);
        let out = q.pop_chunk(4).unwrap();
        assert_eq!(out, vec![1.0, 2.0]);
        assert!(q.pop_chunk(4).is_none());
    }

    #[test]
    fn pop_respects_max_frames() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = q.pop_chunk(2).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn close_unblocks_a_full_push() {
        let q = Arc::new(SampleQueue::new(1, 2));
        q.push_blocking(&[1.0, 2.0]);
        let pusher = {
            let q = q.clone();
            thread::spawn(move || q.push_blocking(&[3.0, 4.0, 5.0]))
        };
        q.close();
        pusher.join().unwrap();
        assert!(q.is_done());
    }

    #[test]
    fn closed_queue_still_drains_buffered_samples() {
        let q = SampleQueue::new(1, 16);
        q.push_blocking(&[1.0, 2.0]);
        q.close();
        assert_eq!(q.pop_chunk(8).unwrap(), vec![1.0, 2.0]);
        assert!(q.pop_chunk(8).is_none());
    }
}

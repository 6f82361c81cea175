//! Lock-free audio transport between the control and render contexts
//!
//! A bounded single-producer single-consumer ring of interleaved frames.
//! Callers hand in planar channel slices; the ring stores them interleaved
//! in one pre-allocated block so a frame is contiguous in memory.
//!
//! Each side owns exactly one cursor. The producer publishes `write` after
//! copying frames in, the consumer publishes `read` after copying frames out,
//! and each side loads the peer cursor with `Acquire`. One slot always stays
//! empty so `write == read` unambiguously means "empty": a ring of `capacity`
//! frames holds at most `capacity - 1`.
//!
//! Transfers may be partial. A write or read moves at most
//! `min(requested, slice bounds, available)` frames and returns the count;
//! the shortfall is the backpressure signal. Nothing here blocks, allocates
//! or panics on short slices, so both halves are safe to use from a
//! real-time callback.
//!
//! ```ignore
//! let ring = RingTransport::new(1024, 2);
//! let (mut tx, mut rx) = ring.split();
//!
//! // control side
//! let written = tx.write(&left, &right, 0, left.len());
//!
//! // render side
//! let read = rx.read(&mut out_l, &mut out_r, 0, block_size);
//! ```

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    /// `capacity * channels` interleaved samples
    storage: Box<[UnsafeCell<f32>]>,
    capacity: usize,
    channels: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// Safety: the producer only touches slots in [write, read-1) and the consumer
// only touches slots in [read, write). The regions never overlap and
// ownership of a slot moves across sides only through the Release/Acquire
// cursor handoff.
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn writable(&self, w: usize, r: usize) -> usize {
        if w >= r {
            self.capacity - (w - r) - 1
        } else {
            r - w - 1
        }
    }

    #[inline]
    fn readable(&self, w: usize, r: usize) -> usize {
        if w >= r {
            w - r
        } else {
            self.capacity - r + w
        }
    }

    #[inline]
    fn slot(&self, frame: usize, channel: usize) -> *mut f32 {
        self.storage[frame * self.channels + channel].get()
    }
}

/// Owning handle for a transport ring
///
/// Split it into a [`TransportProducer`] and a [`TransportConsumer`] to use
/// it; join the halves back to [`reset`](Self::reset) it.
pub struct RingTransport {
    shared: Arc<Shared>,
}

impl RingTransport {
    /// Create a ring of `capacity` frames with `channels` channels
    ///
    /// `capacity` is raised to 2 and `channels` to 1 if smaller.
    pub fn new(capacity: usize, channels: usize) -> Self {
        let capacity = capacity.max(2);
        let channels = channels.max(1);
        let storage = (0..capacity * channels)
            .map(|_| UnsafeCell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shared: Arc::new(Shared {
                storage,
                capacity,
                channels,
                write: AtomicUsize::new(0),
                read: AtomicUsize::new(0),
            }),
        }
    }

    /// Ring size in frames (one less is usable)
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn available_write(&self) -> usize {
        let s = &*self.shared;
        s.writable(s.write.load(Ordering::Acquire), s.read.load(Ordering::Acquire))
    }

    pub fn available_read(&self) -> usize {
        let s = &*self.shared;
        s.readable(s.write.load(Ordering::Acquire), s.read.load(Ordering::Acquire))
    }

    /// Discard all buffered frames
    ///
    /// Requires `&mut self`, so neither half can be active.
    pub fn reset(&mut self) {
        self.shared.write.store(0, Ordering::Release);
        self.shared.read.store(0, Ordering::Release);
    }

    pub fn split(self) -> (TransportProducer, TransportConsumer) {
        (
            TransportProducer {
                shared: Arc::clone(&self.shared),
            },
            TransportConsumer {
                shared: self.shared,
            },
        )
    }

    /// Reassemble the owning handle from its two halves
    ///
    /// Fails (handing both halves back) if they belong to different rings.
    pub fn join(
        producer: TransportProducer,
        consumer: TransportConsumer,
    ) -> Result<Self, (TransportProducer, TransportConsumer)> {
        if !Arc::ptr_eq(&producer.shared, &consumer.shared) {
            return Err((producer, consumer));
        }
        drop(producer);
        Ok(Self {
            shared: consumer.shared,
        })
    }
}

/// Write half, owned by the control context
pub struct TransportProducer {
    shared: Arc<Shared>,
}

impl TransportProducer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn available_write(&self) -> usize {
        let s = &*self.shared;
        s.writable(s.write.load(Ordering::Relaxed), s.read.load(Ordering::Acquire))
    }

    pub fn available_read(&self) -> usize {
        let s = &*self.shared;
        s.readable(s.write.load(Ordering::Relaxed), s.read.load(Ordering::Acquire))
    }

    /// Write `left[offset..]`/`right[offset..]` as stereo frames
    ///
    /// Returns the number of frames actually written.
    pub fn write(&mut self, left: &[f32], right: &[f32], offset: usize, length: usize) -> usize {
        self.write_planar(&[left, right], offset, length)
    }

    /// Write planar channels starting at `offset`
    ///
    /// Channels missing from `channels` are stored as silence; extra input
    /// channels are ignored.
    pub fn write_planar(&mut self, channels: &[&[f32]], offset: usize, length: usize) -> usize {
        let s = &*self.shared;
        let w = s.write.load(Ordering::Relaxed);
        let r = s.read.load(Ordering::Acquire);

        let mut frames = length.min(s.writable(w, r));
        for input in channels.iter().take(s.channels) {
            frames = frames.min(input.len().saturating_sub(offset));
        }
        if frames == 0 {
            return 0;
        }

        for i in 0..frames {
            let frame = (w + i) % s.capacity;
            for c in 0..s.channels {
                let value = channels.get(c).map_or(0.0, |input| input[offset + i]);
                // Safety: frame lies in the producer-owned region (see `Shared`)
                unsafe { *s.slot(frame, c) = value };
            }
        }

        s.write.store((w + frames) % s.capacity, Ordering::Release);
        frames
    }
}

/// Read half, owned by the render context
pub struct TransportConsumer {
    shared: Arc<Shared>,
}

impl TransportConsumer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn available_read(&self) -> usize {
        let s = &*self.shared;
        s.readable(s.write.load(Ordering::Acquire), s.read.load(Ordering::Relaxed))
    }

    pub fn available_write(&self) -> usize {
        let s = &*self.shared;
        s.writable(s.write.load(Ordering::Acquire), s.read.load(Ordering::Relaxed))
    }

    /// Read stereo frames into `left_out[offset..]`/`right_out[offset..]`
    ///
    /// Returns the number of frames actually read. On a mono ring the right
    /// output receives a copy of the single channel.
    pub fn read(
        &mut self,
        left_out: &mut [f32],
        right_out: &mut [f32],
        offset: usize,
        length: usize,
    ) -> usize {
        let s = &*self.shared;
        let w = s.write.load(Ordering::Acquire);
        let r = s.read.load(Ordering::Relaxed);

        let frames = length
            .min(s.readable(w, r))
            .min(left_out.len().saturating_sub(offset))
            .min(right_out.len().saturating_sub(offset));
        if frames == 0 {
            return 0;
        }

        let right_channel = if s.channels > 1 { 1 } else { 0 };
        for i in 0..frames {
            let frame = (r + i) % s.capacity;
            // Safety: frame lies in the consumer-owned region (see `Shared`)
            unsafe {
                left_out[offset + i] = *s.slot(frame, 0);
                right_out[offset + i] = *s.slot(frame, right_channel);
            }
        }

        s.read.store((r + frames) % s.capacity, Ordering::Release);
        frames
    }

    /// Read into planar outputs starting at `offset`
    ///
    /// Output channels beyond the ring's channel count are left untouched.
    pub fn read_planar(&mut self, outputs: &mut [&mut [f32]], offset: usize, length: usize) -> usize {
        let s = &*self.shared;
        let w = s.write.load(Ordering::Acquire);
        let r = s.read.load(Ordering::Relaxed);

        let mut frames = length.min(s.readable(w, r));
        for out in outputs.iter().take(s.channels) {
            frames = frames.min(out.len().saturating_sub(offset));
        }
        if frames == 0 {
            return 0;
        }

        let used = outputs.len().min(s.channels);
        for i in 0..frames {
            let frame = (r + i) % s.capacity;
            for (c, out) in outputs.iter_mut().enumerate().take(used) {
                // Safety: frame lies in the consumer-owned region (see `Shared`)
                out[offset + i] = unsafe { *s.slot(frame, c) };
            }
        }

        s.read.store((r + frames) % s.capacity, Ordering::Release);
        frames
    }

    /// Drop up to `length` buffered frames without copying them
    pub fn skip(&mut self, length: usize) -> usize {
        let s = &*self.shared;
        let w = s.write.load(Ordering::Acquire);
        let r = s.read.load(Ordering::Relaxed);
        let frames = length.min(s.readable(w, r));
        s.read.store((r + frames) % s.capacity, Ordering::Release);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_round_trip_preserves_order() {
        let (mut tx, mut rx) = RingTransport::new(16, 2).split();
        let left: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let right: Vec<f32> = (0..10).map(|i| -(i as f32)).collect();

        assert_eq!(tx.write(&left, &right, 0, 10), 10);

        let mut out_l = vec![0.0; 10];
        let mut out_r = vec![0.0; 10];
        assert_eq!(rx.read(&mut out_l, &mut out_r, 0, 10), 10);
        assert_eq!(out_l, left);
        assert_eq!(out_r, right);
    }

    #[test]
    fn test_usable_capacity_is_one_less() {
        let (mut tx, rx) = RingTransport::new(8, 2).split();
        let data = vec![1.0; 32];
        assert_eq!(tx.write(&data, &data, 0, 32), 7);
        assert_eq!(tx.available_write(), 0);
        assert_eq!(rx.available_read(), 7);
    }

    #[test]
    fn test_available_sum_invariant_across_wraparound() {
        let (mut tx, mut rx) = RingTransport::new(13, 2).split();
        let data = vec![0.5; 64];
        let mut sink_l = vec![0.0; 64];
        let mut sink_r = vec![0.0; 64];

        for step in 0..50 {
            tx.write(&data, &data, 0, (step * 7) % 11);
            assert_eq!(tx.available_write() + rx.available_read(), 12);
            rx.read(&mut sink_l, &mut sink_r, 0, (step * 5) % 9);
            assert_eq!(tx.available_write() + rx.available_read(), 12);
        }
    }

    #[test]
    fn test_write_bounded_by_slice_and_offset() {
        let (mut tx, rx) = RingTransport::new(64, 2).split();
        let left = vec![1.0; 10];
        let right = vec![1.0; 6];
        // right only has 2 frames past offset 4
        assert_eq!(tx.write(&left, &right, 4, 50), 2);
        assert_eq!(rx.available_read(), 2);

        // offset past the end writes nothing
        assert_eq!(tx.write(&left, &right, 20, 5), 0);
    }

    #[test]
    fn test_read_with_offset_leaves_prefix_untouched() {
        let (mut tx, mut rx) = RingTransport::new(16, 2).split();
        tx.write(&[1.0, 2.0], &[3.0, 4.0], 0, 2);

        let mut out_l = vec![-1.0; 4];
        let mut out_r = vec![-1.0; 4];
        assert_eq!(rx.read(&mut out_l, &mut out_r, 2, 4), 2);
        assert_eq!(out_l, vec![-1.0, -1.0, 1.0, 2.0]);
        assert_eq!(out_r, vec![-1.0, -1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_planar_missing_channels_are_silence() {
        let (mut tx, mut rx) = RingTransport::new(16, 3).split();
        let only = [0.25_f32; 4];
        assert_eq!(tx.write_planar(&[&only[..]], 0, 4), 4);

        let mut a = vec![9.0; 4];
        let mut b = vec![9.0; 4];
        let mut c = vec![9.0; 4];
        {
            let mut outs: [&mut [f32]; 3] = [&mut a, &mut b, &mut c];
            assert_eq!(rx.read_planar(&mut outs, 0, 4), 4);
        }
        assert_eq!(a, vec![0.25; 4]);
        assert_eq!(b, vec![0.0; 4]);
        assert_eq!(c, vec![0.0; 4]);
    }

    #[test]
    fn test_join_and_reset() {
        let (mut tx, rx) = RingTransport::new(8, 2).split();
        tx.write(&[1.0; 4], &[1.0; 4], 0, 4);

        let mut ring = match RingTransport::join(tx, rx) {
            Ok(ring) => ring,
            Err(_) => panic!("halves of one ring must join"),
        };
        assert_eq!(ring.available_read(), 4);
        ring.reset();
        assert_eq!(ring.available_read(), 0);
        assert_eq!(ring.available_write(), 7);
    }

    #[test]
    fn test_join_rejects_foreign_halves() {
        let (tx, _) = RingTransport::new(8, 2).split();
        let (_, rx) = RingTransport::new(8, 2).split();
        assert!(RingTransport::join(tx, rx).is_err());
    }

    #[test]
    fn test_skip_discards_frames() {
        let (mut tx, mut rx) = RingTransport::new(8, 1).split();
        tx.write_planar(&[&[1.0, 2.0, 3.0][..]], 0, 3);
        assert_eq!(rx.skip(2), 2);
        let mut out = [0.0];
        let mut outs: [&mut [f32]; 1] = [&mut out];
        rx.read_planar(&mut outs, 0, 1);
        assert_eq!(out[0], 3.0);
    }

    #[test]
    fn test_concurrent_fuzz_no_corruption() {
        const TOTAL: usize = 200_000;
        let (mut tx, mut rx) = RingTransport::new(257, 2).split();

        let producer = thread::spawn(move || {
            let mut next = 0usize;
            let mut left = vec![0.0f32; 64];
            let mut right = vec![0.0f32; 64];
            while next < TOTAL {
                let chunk = (next % 61 + 1).min(TOTAL - next);
                for i in 0..chunk {
                    left[i] = (next + i) as f32;
                    right[i] = -((next + i) as f32);
                }
                let written = tx.write(&left, &right, 0, chunk);
                next += written;
                if written == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0usize;
        let mut out_l = vec![0.0f32; 64];
        let mut out_r = vec![0.0f32; 64];
        while expected < TOTAL {
            let want = expected % 47 + 1;
            let got = rx.read(&mut out_l, &mut out_r, 0, want);
            for i in 0..got {
                assert_eq!(out_l[i], (expected + i) as f32);
                assert_eq!(out_r[i], -((expected + i) as f32));
            }
            expected += got;
            if got == 0 {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(rx.available_read(), 0);
    }
}

//! Lock-free single-producer/single-consumer transport from the render
//! thread to the file writer thread.
//!
//! Built on `rtrb` rather than hand-rolled atomics: `rtrb::RingBuffer`
//! already gives the acquire/release-disciplined SPSC slots this needs. The
//! only thing it doesn't track natively is a dropped-sample counter on
//! overrun, which this wrapper adds.

use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed-capacity SPSC ring buffer of `f32` samples. Capacity is set once at
/// construction and never grows.
pub struct RingProducer {
    inner: Producer<f32>,
    dropped_count: Arc<AtomicU64>,
}

pub struct RingConsumer {
    inner: Consumer<f32>,
}

/// Build a producer/consumer pair with the given fixed capacity (in samples).
pub fn ring_channel(capacity: usize) -> (RingProducer, RingConsumer) {
    let (producer, consumer) = RingBuffer::<f32>::new(capacity);
    let dropped_count = Arc::new(AtomicU64::new(0));
    (
        RingProducer {
            inner: producer,
            dropped_count: dropped_count.clone(),
        },
        RingConsumer { inner: consumer },
    )
}

impl RingProducer {
    /// Push one sample. Returns `false` and increments the dropped-sample
    /// counter if the ring is full; never blocks, never allocates.
    pub fn write(&mut self, sample: f32) -> bool {
        match self.inner.push(sample) {
            Ok(()) => true,
            Err(_) => {
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Push a whole interleaved block, returning the number of samples
    /// actually written (may be less than `samples.len()` on overrun).
    pub fn write_block(&mut self, samples: &[f32]) -> usize {
        let mut written = 0;
        for &s in samples {
            if self.write(s) {
                written += 1;
            }
        }
        written
    }

    pub fn available_write(&self) -> usize {
        self.inner.slots()
    }

    /// Total samples dropped across the lifetime of this ring, due to the
    /// consumer falling behind.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

impl RingConsumer {
    /// Drain up to `dst.len()` samples into `dst`, returning how many were
    /// read. Never blocks: returns `0` immediately if the ring is empty.
    pub fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let mut read = 0;
        while read < dst.len() {
            match self.inner.pop() {
                Ok(sample) => {
                    dst[read] = sample;
                    read += 1;
                }
                Err(_) => break,
            }
        }
        read
    }

    pub fn available_read(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering_is_preserved() {
        let (mut producer, mut consumer) = ring_channel(8);
        for i in 0..5 {
            assert!(producer.write(i as f32));
        }
        let mut out = [0.0f32; 5];
        assert_eq!(consumer.read_into(&mut out), 5);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn overrun_increments_dropped_count_and_caps_capacity() {
        let (mut producer, _consumer) = ring_channel(4);
        for i in 0..4 {
            assert!(producer.write(i as f32));
        }
        assert!(!producer.write(99.0));
        assert_eq!(producer.dropped_count(), 1);
        assert!(!producer.write(100.0));
        assert_eq!(producer.dropped_count(), 2);
    }

    #[test]
    fn read_into_does_not_block_when_empty() {
        let (_producer, mut consumer) = ring_channel(4);
        let mut out = [0.0f32; 4];
        assert_eq!(consumer.read_into(&mut out), 0);
    }

    #[test]
    fn capacity_never_grows_beyond_construction_value() {
        let (mut producer, mut consumer) = ring_channel(2);
        assert!(producer.write(1.0));
        assert!(producer.write(2.0));
        assert!(!producer.write(3.0));
        let mut out = [0.0f32; 1];
        assert_eq!(consumer.read_into(&mut out), 1);
        assert!(producer.write(3.0));
        assert!(!producer.write(4.0));
    }
}

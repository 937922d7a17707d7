//! Lock-free single-producer/single-consumer sample ring buffer.
//!
//! Used between every adjacent pair of threads in the pipeline: decoder
//! thread → source ring buffer → mixer; mixer → sink ring buffer → platform
//! audio callback. Operates on raw interleaved `f32` samples rather than a
//! fixed stereo frame type, so it works unchanged for 1-8 channel sources.

use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// ~46ms of audio at 44.1kHz stereo (matches the reference engine's default
/// sizing rationale).
pub const DEFAULT_CAPACITY_SAMPLES: usize = 2048;

/// A sample ring buffer, not yet split into producer/consumer halves.
pub struct SampleRingBuffer {
    buffer: HeapRb<f32>,
    underruns: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
}

impl SampleRingBuffer {
    /// `capacity` is in samples (not frames) — a stereo buffer holding N
    /// frames needs a capacity of `N * 2`.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity),
            underruns: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Split into producer and consumer halves. Each half may be moved to a
    /// different thread; all further access is through these handles.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let (prod, cons) = self.buffer.split();
        let producer = RingProducer {
            producer: prod,
            overruns: Arc::clone(&self.overruns),
        };
        let consumer = RingConsumer {
            consumer: cons,
            underruns: Arc::clone(&self.underruns),
        };
        (producer, consumer)
    }
}

/// Producer half (decoder thread, or mixer when feeding the sink buffer).
pub struct RingProducer {
    producer: ringbuf::HeapProd<f32>,
    overruns: Arc<AtomicU64>,
}

impl RingProducer {
    /// Write as many samples from `src` as fit. Returns the number written;
    /// never blocks.
    pub fn write(&mut self, src: &[f32]) -> usize {
        let written = self.producer.push_slice(src);
        if written < src.len() {
            let count = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 1000 == 0 {
                warn!("ring buffer overrun (total: {})", count);
            }
        }
        written
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn free_len(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }
}

/// Consumer half (mixer reading a source, or the platform callback reading
/// the sink buffer).
pub struct RingConsumer {
    consumer: ringbuf::HeapCons<f32>,
    underruns: Arc<AtomicU64>,
}

impl RingConsumer {
    /// Read up to `dst.len()` samples into `dst`. Returns the number
    /// actually read; the remaining tail of `dst` is left untouched — it is
    /// the caller's responsibility to have zeroed it beforehand if silence
    /// on underrun is desired. Never blocks.
    pub fn read(&mut self, dst: &mut [f32]) -> usize {
        let read = self.consumer.pop_slice(dst);
        if read < dst.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            trace!(
                requested = dst.len(),
                available = read,
                "ring buffer underrun"
            );
        }
        read
    }

    /// Read without advancing the read position. Used for level metering.
    pub fn peek(&self, dst: &mut [f32]) -> usize {
        let mut n = 0;
        for (slot, sample) in dst.iter_mut().zip(self.consumer.iter()) {
            *slot = *sample;
            n += 1;
        }
        n
    }

    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn free_len(&self) -> usize {
        self.consumer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity().into()
    }

    /// Discard all buffered samples. Only safe to call when the producer
    /// side is quiesced (e.g. during a seek, with the decoder thread
    /// paused).
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RingBufferStats {
    pub underruns: u64,
    pub overruns: u64,
    pub capacity: usize,
    pub occupied: usize,
}

impl RingBufferStats {
    pub fn fill_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupied as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let rb = SampleRingBuffer::new(16);
        let (mut prod, mut cons) = rb.split();

        assert_eq!(prod.write(&[0.1, 0.2, 0.3, 0.4]), 4);

        let mut out = [0.0f32; 4];
        assert_eq!(cons.read(&mut out), 4);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn write_partial_on_overrun() {
        let rb = SampleRingBuffer::new(4);
        let (mut prod, _cons) = rb.split();

        let written = prod.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(written, 4);
    }

    #[test]
    fn read_partial_on_underrun() {
        let rb = SampleRingBuffer::new(16);
        let (mut prod, mut cons) = rb.split();

        prod.write(&[1.0, 2.0]);

        let mut out = [0.0f32; 4];
        let read = cons.read(&mut out);
        assert_eq!(read, 2);
        assert_eq!(cons.underrun_count(), 1);
    }

    #[test]
    fn clear_empties_buffer() {
        let rb = SampleRingBuffer::new(16);
        let (mut prod, mut cons) = rb.split();

        prod.write(&[1.0, 2.0, 3.0]);
        cons.clear();

        let mut out = [0.0f32; 3];
        assert_eq!(cons.read(&mut out), 0);
    }

    #[test]
    fn occupied_and_free_track_capacity() {
        let rb = SampleRingBuffer::new(8);
        let (mut prod, cons) = rb.split();

        prod.write(&[1.0, 2.0, 3.0]);
        assert_eq!(prod.occupied_len(), 3);
        assert_eq!(cons.capacity(), 8);
        assert_eq!(cons.free_len(), 5);
    }
}

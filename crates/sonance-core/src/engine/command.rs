//! One-way message queue from the control context to the render context
//!
//! The control context pushes [`RenderMessage`]s into an `rtrb` ring; the
//! render context drains it at the start of every block. Pushing and
//! popping are wait-free and never allocate. There is no reply path.
//!
//! Messages carrying buffers wrap them in `basedrop::Shared`/`Owned` so that
//! when the render context replaces or drops one, the memory is reclaimed
//! by the engine's collector thread instead of being freed mid-callback.

use crate::accel::DspKernels;
use crate::cache::Samples;
use basedrop::{Handle, Owned, Shared};

/// Capacity of the render message queue
pub const MESSAGE_QUEUE_CAPACITY: usize = 1024;

/// Chunk table of a sample streamed through the sample cache
///
/// The table is sized on the control side; the render context only swaps
/// entries. Reads from a chunk that is not resident return silence.
pub struct StreamedData {
    chunks: Owned<Vec<Option<Shared<Samples>>>>,
    chunk_size: usize,
    length: usize,
}

impl StreamedData {
    pub fn new(handle: &Handle, length: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let count = length.div_ceil(chunk_size);
        Self {
            chunks: Owned::new(handle, (0..count).map(|_| None).collect()),
            chunk_size,
            length,
        }
    }

    /// Total length in samples
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_resident(&self, index: usize) -> bool {
        matches!(self.chunks.get(index), Some(Some(_)))
    }

    /// Install (`Some`) or release (`None`) one chunk; out-of-range indexes
    /// are ignored
    pub fn set_chunk(&mut self, index: usize, data: Option<Shared<Samples>>) {
        if let Some(slot) = self.chunks.get_mut(index) {
            *slot = data;
        }
    }

    /// Sample at `index`; silence outside the sample or in a missing chunk
    #[inline]
    pub fn sample(&self, index: i64) -> f32 {
        if index < 0 || index as usize >= self.length {
            return 0.0;
        }
        let index = index as usize;
        match self.chunks.get(index / self.chunk_size) {
            Some(Some(chunk)) => chunk.get(index % self.chunk_size).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// Audio behind a sample zone
pub enum ZoneData {
    /// The whole sample in one immutable buffer
    Resident(Shared<Samples>),
    /// Chunks supplied from the sample cache as they arrive
    Streamed(StreamedData),
}

impl ZoneData {
    pub fn len(&self) -> usize {
        match self {
            Self::Resident(data) => data.len(),
            Self::Streamed(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sample mapped onto a key range
pub struct SampleZone {
    /// Mono sample data
    pub data: ZoneData,
    /// Note at which the sample plays at its original pitch
    pub root_note: u8,
    /// Lowest note (inclusive) this zone answers to
    pub key_low: u8,
    /// Highest note (inclusive) this zone answers to
    pub key_high: u8,
    /// Sample rate the data was recorded at
    pub sample_rate: u32,
    /// Loop the whole sample instead of playing it once
    pub looped: bool,
}

impl SampleZone {
    #[inline]
    pub fn contains(&self, note: u8) -> bool {
        (self.key_low..=self.key_high).contains(&note)
    }
}

/// Payload of a render message
pub enum MessageKind {
    /// Reset voices and mark the render context initialized
    Init,
    NoteOn {
        note: u8,
        /// Normalized 0.0..=1.0
        velocity: f32,
        channel: u8,
    },
    NoteOff {
        note: u8,
        channel: u8,
    },
    /// Set a parameter slot (names are resolved on the control side)
    Parameter {
        slot: usize,
        value: f32,
    },
    /// Apply many parameter slots at once
    Preset(Owned<Vec<(usize, f32)>>),
    /// Replace the kernel implementation
    Module(Owned<Box<dyn DspKernels>>),
    /// Add a sample zone
    Sample(SampleZone),
    /// Install or release one chunk of a streamed zone
    ZoneChunk {
        zone: usize,
        index: usize,
        data: Option<Shared<Samples>>,
    },
    /// Replace the fallback wavetable
    Wavetable(Shared<Vec<f32>>),
    /// Toggle callback timing collection
    Metrics {
        enabled: bool,
    },
}

impl MessageKind {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::NoteOn { .. } => "note_on",
            Self::NoteOff { .. } => "note_off",
            Self::Parameter { .. } => "parameter",
            Self::Preset(_) => "preset",
            Self::Module(_) => "module",
            Self::Sample(_) => "sample",
            Self::ZoneChunk { .. } => "zone_chunk",
            Self::Wavetable(_) => "wavetable",
            Self::Metrics { .. } => "metrics",
        }
    }
}

/// A timestamped message for the render context
///
/// `timestamp` is an absolute frame position on the render clock. Messages
/// due inside the current block are applied at their exact frame offset;
/// late messages apply at the start of the block.
pub struct RenderMessage {
    pub kind: MessageKind,
    pub timestamp: u64,
}

impl RenderMessage {
    pub fn new(kind: MessageKind, timestamp: u64) -> Self {
        Self { kind, timestamp }
    }

    /// Whether the message is only meaningful at a frame position
    ///
    /// Everything else is applied as soon as it is drained.
    pub fn is_timed(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::NoteOn { .. } | MessageKind::NoteOff { .. } | MessageKind::Parameter { .. }
        )
    }
}

/// Create the message queue pair
pub fn message_channel() -> (rtrb::Producer<RenderMessage>, rtrb::Consumer<RenderMessage>) {
    rtrb::RingBuffer::new(MESSAGE_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_channel_fifo() {
        let (mut tx, mut rx) = message_channel();
        tx.push(RenderMessage::new(MessageKind::NoteOn { note: 60, velocity: 1.0, channel: 0 }, 10))
            .ok()
            .unwrap();
        tx.push(RenderMessage::new(MessageKind::NoteOff { note: 60, channel: 0 }, 20))
            .ok()
            .unwrap();

        let first = rx.pop().unwrap();
        assert_eq!(first.kind.name(), "note_on");
        assert_eq!(first.timestamp, 10);
        assert!(first.is_timed());
        assert_eq!(rx.pop().unwrap().kind.name(), "note_off");
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_streamed_data_reads_silence_until_chunk_arrives() {
        let collector = basedrop::Collector::new();
        let handle = collector.handle();
        let mut data = StreamedData::new(&handle, 10, 4);
        assert_eq!(data.chunk_count(), 3);
        assert_eq!(data.sample(5), 0.0);

        data.set_chunk(1, Some(Shared::new(&handle, Samples::from(vec![4.0, 5.0, 6.0, 7.0]))));
        assert!(data.is_resident(1));
        assert_eq!(data.sample(5), 5.0);
        assert_eq!(data.sample(3), 0.0);
        assert_eq!(data.sample(10), 0.0);
        assert_eq!(data.sample(-1), 0.0);

        data.set_chunk(7, Some(Shared::new(&handle, Samples::from(vec![1.0]))));
        data.set_chunk(1, None);
        assert_eq!(data.sample(5), 0.0);
    }

    #[test]
    fn test_queue_capacity() {
        let (mut tx, _rx) = message_channel();
        for _ in 0..MESSAGE_QUEUE_CAPACITY {
            assert!(tx.push(RenderMessage::new(MessageKind::Init, 0)).is_ok());
        }
        assert!(tx.push(RenderMessage::new(MessageKind::Init, 0)).is_err());
    }
}

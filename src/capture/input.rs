//! Audio input abstraction and the bounded block queue between the input
//! stream and the capture thread

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::CaptureError;

/// Interleaved 16-bit PCM samples, `block_frames * channels` long
pub type SampleBlock = Vec<i16>;

/// Stream parameters requested from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_frames: usize,
}

impl AudioFormat {
    pub fn block_len(&self) -> usize {
        self.block_frames * self.channels as usize
    }
}

/// Counters shared by the input callback, the capture thread and the owner
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_written: AtomicU64,
    pub blocks_written: AtomicU64,
    pub dropped_blocks: AtomicU64,
    /// First fatal error reported by the input stream
    failure: Mutex<Option<String>>,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_failure(&self, message: String) {
        if let Ok(mut slot) = self.failure.lock() {
            slot.get_or_insert(message);
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Producer side of the block queue. Never blocks: when the queue is full
/// the oldest queued block is discarded to make room.
#[derive(Clone)]
pub struct BlockSink {
    tx: Sender<SampleBlock>,
    /// Used only to evict the oldest block on overflow
    rx: Receiver<SampleBlock>,
    stats: Arc<CaptureStats>,
}

impl BlockSink {
    pub fn new(tx: Sender<SampleBlock>, rx: Receiver<SampleBlock>, stats: Arc<CaptureStats>) -> Self {
        Self { tx, rx, stats }
    }

    pub fn push(&self, block: SampleBlock) {
        let block = match self.tx.try_send(block) {
            Ok(()) => return,
            Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(block)) => block,
        };

        if self.rx.try_recv().is_ok() {
            self.note_dropped();
        }
        if self.tx.try_send(block).is_err() {
            self.note_dropped();
        }
    }

    /// Report a fatal stream error; the capture thread stops on its next wakeup
    pub fn fail(&self, message: String) {
        self.stats.record_failure(message);
    }

    fn note_dropped(&self) {
        let dropped = self.stats.dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % 100 == 0 {
            warn!("Capture queue full, dropped {} blocks so far", dropped);
        }
    }
}

/// A source of sample blocks (sound card, test signal)
pub trait AudioInput: Send {
    /// Open the stream and start delivering blocks to `sink`
    fn start(&mut self, format: &AudioFormat, sink: BlockSink) -> Result<(), CaptureError>;

    /// Stop delivering; no block is pushed after this returns
    fn stop(&mut self);

    fn name(&self) -> String;
}

/// Stands in when no sound card backend is compiled in; every start fails
pub struct UnavailableInput {
    reason: String,
}

impl UnavailableInput {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioInput for UnavailableInput {
    fn start(&mut self, _format: &AudioFormat, _sink: BlockSink) -> Result<(), CaptureError> {
        Err(CaptureError::CaptureDeviceFailure(self.reason.clone()))
    }

    fn stop(&mut self) {}

    fn name(&self) -> String {
        "unavailable".to_string()
    }
}

#[cfg(test)]
pub mod scripted {
    //! Deterministic input for tests

    use super::*;

    #[derive(Default)]
    pub struct ScriptedState {
        pub sink: Option<BlockSink>,
        pub format: Option<AudioFormat>,
        pub fail_start: bool,
        pub starts: usize,
        pub stops: usize,
    }

    /// Pushes `blocks_on_start` ramp blocks synchronously from `start`;
    /// tests can push more or inject failures through `state`
    pub struct ScriptedInput {
        pub state: Arc<Mutex<ScriptedState>>,
        pub blocks_on_start: usize,
    }

    impl ScriptedInput {
        pub fn new(blocks_on_start: usize) -> Self {
            Self {
                state: Arc::new(Mutex::new(ScriptedState::default())),
                blocks_on_start,
            }
        }

        pub fn ramp_block(format: &AudioFormat, seed: usize) -> SampleBlock {
            (0..format.block_len())
                .map(|i| ((seed * 31 + i) % 2000) as i16 - 1000)
                .collect()
        }
    }

    impl AudioInput for ScriptedInput {
        fn start(&mut self, format: &AudioFormat, sink: BlockSink) -> Result<(), CaptureError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_start {
                return Err(CaptureError::CaptureDeviceFailure(
                    "scripted start failure".to_string(),
                ));
            }
            state.starts += 1;
            for seed in 0..self.blocks_on_start {
                sink.push(Self::ramp_block(format, seed));
            }
            state.format = Some(*format);
            state.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            let mut state = self.state.lock().unwrap();
            state.stops += 1;
            state.sink = None;
        }

        fn name(&self) -> String {
            "scripted".to_string()
        }
    }
}

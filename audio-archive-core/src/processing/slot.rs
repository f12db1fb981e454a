use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::encoders::EncodedStream;
use crate::models::timestamp::Timestamp;
use crate::processing::ring_buffer::FrameRing;

/// One of the two alternating capture slots (A/B).
///
/// The active slot receives audio from the real-time producer; the other is
/// draining or idle. Timing fields and flags are atomics under a strict
/// single-writer discipline: the producer writes them, the drain loop reads
/// (and clears the flags). The encoder stream handle is the one field the
/// producer never touches — it belongs to the drain loop alone and a slot's
/// handle is only manipulated while no boundary race is possible.
///
/// Both slots are allocated once at startup and never reallocated; only
/// their timing state is rewritten when a slot flips from draining back to
/// active.
pub struct CaptureSlot {
    label: char,
    rings: Vec<FrameRing>,

    // Timing state, rewritten by the producer at each activation.
    period_start: AtomicI64,
    file_start_sec: AtomicI64,
    file_start_usec: AtomicU32,
    frame_offset: AtomicU64,
    start_offset: AtomicU64,

    // Producer-set, consumer-cleared flags.
    overflow: AtomicBool,
    xrun_usecs: AtomicU64,
    close_file: AtomicBool,

    // Drain-loop-only: the open encoder stream, if any.
    stream: Mutex<Option<Box<dyn EncodedStream>>>,
}

impl CaptureSlot {
    pub fn new(label: char, channels: u16, capacity_frames: usize) -> Self {
        let rings = (0..channels)
            .map(|_| FrameRing::new(capacity_frames))
            .collect();
        Self {
            label,
            rings,
            period_start: AtomicI64::new(0),
            file_start_sec: AtomicI64::new(0),
            file_start_usec: AtomicU32::new(0),
            frame_offset: AtomicU64::new(0),
            start_offset: AtomicU64::new(0),
            overflow: AtomicBool::new(false),
            xrun_usecs: AtomicU64::new(0),
            close_file: AtomicBool::new(false),
            stream: Mutex::new(None),
        }
    }

    pub fn label(&self) -> char {
        self.label
    }

    pub fn channels(&self) -> usize {
        self.rings.len()
    }

    // --- Producer side ---

    /// Rewrite the slot's timing state as it becomes active.
    ///
    /// `start_offset` is the number of frames the slot is already into its
    /// period — nonzero only for the very first slot when capture begins
    /// mid-period.
    pub fn activate(&self, file_start: Timestamp, period_start: i64, start_offset: u64) {
        self.file_start_sec.store(file_start.sec, Ordering::Relaxed);
        self.file_start_usec.store(file_start.usec, Ordering::Relaxed);
        self.period_start.store(period_start, Ordering::Relaxed);
        self.start_offset.store(start_offset, Ordering::Relaxed);
        self.frame_offset.store(0, Ordering::Release);
    }

    /// Frames this slot is into its period: `frame_offset + start_offset`.
    pub fn frames_into_period(&self) -> u64 {
        self.frame_offset.load(Ordering::Relaxed) + self.start_offset.load(Ordering::Relaxed)
    }

    /// Write the same frame range of every channel into the slot's rings.
    ///
    /// All-or-nothing across channels: if any ring lacks space the whole
    /// write is dropped, the overflow flag is set and `false` is returned.
    /// Partial per-channel writes would desynchronize the channels. On
    /// success `frame_offset` is advanced by the frame count.
    pub fn write_frames(&self, channels: &[&[f32]], start: usize, nframes: usize) -> bool {
        if nframes == 0 {
            return true;
        }

        for ring in &self.rings {
            if ring.available_to_write() < nframes {
                self.overflow.store(true, Ordering::Release);
                return false;
            }
        }

        for (ring, channel) in self.rings.iter().zip(channels) {
            ring.write(&channel[start..start + nframes]);
        }

        self.frame_offset.fetch_add(nframes as u64, Ordering::Relaxed);
        true
    }

    /// Mark the slot's period as elapsed; the drain loop closes the file.
    pub fn request_close(&self) {
        self.close_file.store(true, Ordering::Release);
    }

    pub fn note_xrun(&self, usecs: u64) {
        self.xrun_usecs.fetch_add(usecs, Ordering::Relaxed);
    }

    // --- Drain side ---

    pub fn file_start(&self) -> Timestamp {
        Timestamp::new(
            self.file_start_sec.load(Ordering::Relaxed),
            self.file_start_usec.load(Ordering::Relaxed),
        )
    }

    pub fn period_start(&self) -> i64 {
        self.period_start.load(Ordering::Relaxed)
    }

    pub fn close_requested(&self) -> bool {
        self.close_file.load(Ordering::Acquire)
    }

    pub fn clear_close_request(&self) {
        self.close_file.store(false, Ordering::Release);
    }

    /// Clears and returns the overflow flag.
    pub fn take_overflow(&self) -> bool {
        self.overflow.swap(false, Ordering::AcqRel)
    }

    /// Clears and returns the accumulated xrun duration in microseconds.
    pub fn take_xrun_usecs(&self) -> u64 {
        self.xrun_usecs.swap(0, Ordering::AcqRel)
    }

    /// Frames readable from every channel of this slot.
    pub fn available_frames(&self) -> usize {
        self.rings
            .iter()
            .map(FrameRing::available_to_read)
            .min()
            .unwrap_or(0)
    }

    pub fn ring(&self, channel: usize) -> &FrameRing {
        &self.rings[channel]
    }

    pub fn stream(&self) -> &Mutex<Option<Box<dyn EncodedStream>>> {
        &self.stream
    }
}

impl std::fmt::Debug for CaptureSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSlot")
            .field("label", &self.label)
            .field("channels", &self.rings.len())
            .field("frames_into_period", &self.frames_into_period())
            .field("close_requested", &self.close_requested())
            .finish()
    }
}

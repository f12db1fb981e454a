use std::sync::Arc;

use crate::models::state::SharedRunState;
use crate::models::timestamp::Timestamp;
use crate::processing::slot::CaptureSlot;
use crate::traits::audio_input::InputHandler;

/// The real-time side of the capture pipeline.
///
/// Invoked by the audio backend once per hardware period; copies frames
/// into the active capture slot and performs the boundary split and slot
/// switch when an archive period elapses. Bounded time, no locks, no
/// allocation, no I/O.
///
/// Period boundaries are pure frame arithmetic: a slot closes after exactly
/// `sample_rate * period_secs` frames (counting the start offset), and each
/// subsequent slot's file start is derived by adding whole period seconds —
/// so boundaries stay sample-accurate and never accumulate drift, no matter
/// how many rotations occur.
pub struct CaptureProducer {
    slots: [Arc<CaptureSlot>; 2],
    run_state: Arc<SharedRunState>,
    sample_rate: u32,
    period_secs: u32,
    period_frames: u64,
    channels: usize,
    active: usize,
    started: bool,
}

impl CaptureProducer {
    pub fn new(
        slots: [Arc<CaptureSlot>; 2],
        run_state: Arc<SharedRunState>,
        sample_rate: u32,
        period_secs: u32,
        channels: u16,
    ) -> Self {
        Self {
            slots,
            run_state,
            sample_rate,
            period_secs,
            period_frames: u64::from(sample_rate) * u64::from(period_secs),
            channels: usize::from(channels),
            active: 0,
            started: false,
        }
    }

    /// Index of the slot currently receiving audio.
    pub fn active_slot(&self) -> usize {
        self.active
    }

    /// First callback: anchor the first slot to the period containing `now`.
    ///
    /// Capture usually begins mid-period, so the slot starts with a nonzero
    /// `start_offset` and its first file covers only the remainder of the
    /// period.
    fn begin(&mut self, now: Timestamp) {
        let period_start = now.period_start(self.period_secs);
        let start_offset = now.frames_into_period(period_start, self.sample_rate);
        self.active = 0;
        self.slots[0].activate(now, period_start, start_offset);
        self.started = true;
    }

    /// Retire the active slot and activate the other one.
    ///
    /// The new slot's timing is derived from the old slot's period, not from
    /// the wall clock, which keeps consecutive files seamless.
    fn switch_slots(&mut self) {
        let finished = &self.slots[self.active];
        finished.request_close();

        let next_period = finished.period_start() + i64::from(self.period_secs);
        self.active ^= 1;
        self.slots[self.active].activate(Timestamp::new(next_period, 0), next_period, 0);
    }
}

impl InputHandler for CaptureProducer {
    fn process(&mut self, now: Timestamp, channels: &[&[f32]]) {
        if channels.len() != self.channels
            || channels.windows(2).any(|w| w[0].len() != w[1].len())
        {
            // Backend broke the delivery contract; nothing sane to archive.
            self.run_state.fail();
            return;
        }

        if !self.started {
            self.begin(now);
        }

        let nframes = channels[0].len();
        let mut pos = 0;
        while pos < nframes {
            let slot = &self.slots[self.active];
            let until_switch = self.period_frames - slot.frames_into_period();
            let remaining = (nframes - pos) as u64;

            if remaining < until_switch {
                // A full write is attempted even when a ring is short on
                // space: write_frames drops it whole and flags overflow.
                slot.write_frames(channels, pos, remaining as usize);
                break;
            }

            // The callback reaches (or crosses) the period boundary: write
            // the head that belongs to the finishing slot, then switch.
            // Looping handles callbacks that span multiple whole periods.
            let split = until_switch as usize;
            slot.write_frames(channels, pos, split);
            self.switch_slots();
            pos += split;
        }
    }

    fn xrun(&mut self, usecs: u64) {
        self.slots[self.active].note_xrun(usecs);
    }

    fn shutdown(&mut self) {
        self.run_state.request_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::RunState;

    /// Producer over two fresh stereo-or-mono slots.
    fn producer(
        sample_rate: u32,
        period_secs: u32,
        channels: u16,
        capacity: usize,
    ) -> (CaptureProducer, [Arc<CaptureSlot>; 2]) {
        let slots = [
            Arc::new(CaptureSlot::new('A', channels, capacity)),
            Arc::new(CaptureSlot::new('B', channels, capacity)),
        ];
        let producer = CaptureProducer::new(
            [Arc::clone(&slots[0]), Arc::clone(&slots[1])],
            Arc::new(SharedRunState::new()),
            sample_rate,
            period_secs,
            channels,
        );
        (producer, slots)
    }

    fn feed(producer: &mut CaptureProducer, now: Timestamp, nframes: usize) {
        let samples = vec![0.25f32; nframes];
        producer.process(now, &[&samples]);
    }

    #[test]
    fn splits_exactly_at_period_boundary() {
        // 1 s period at 1 kHz: the boundary is frame 1000.
        let (mut producer, slots) = producer(1000, 1, 1, 4096);
        let start = Timestamp::new(0, 0);

        // Arbitrary chunking summing to exactly one period.
        for chunk in [333, 333, 334] {
            feed(&mut producer, start, chunk);
        }

        assert!(slots[0].close_requested());
        assert_eq!(slots[0].available_frames(), 1000);
        assert_eq!(slots[1].available_frames(), 0);
        assert_eq!(producer.active_slot(), 1);

        // The very next frame lands in slot B.
        feed(&mut producer, start, 1);
        assert_eq!(slots[1].available_frames(), 1);
    }

    #[test]
    fn no_frames_lost_across_a_boundary() {
        let (mut producer, slots) = producer(1000, 1, 1, 4096);
        let start = Timestamp::new(0, 0);

        let mut supplied = 0;
        for chunk in [170, 512, 300, 250] {
            feed(&mut producer, start, chunk);
            supplied += chunk;
        }

        let total = slots[0].available_frames() + slots[1].available_frames();
        assert_eq!(total, supplied);
        assert_eq!(slots[0].available_frames(), 1000);
        assert_eq!(slots[1].available_frames(), supplied - 1000);
    }

    #[test]
    fn mid_period_start_uses_start_offset() {
        // Capture starts 10.5 s into a 60 s period at 1 kHz.
        let (mut producer, slots) = producer(1000, 60, 1, 65536);
        feed(&mut producer, Timestamp::new(10, 500_000), 100);

        assert_eq!(slots[0].file_start(), Timestamp::new(10, 500_000));
        assert_eq!(slots[0].period_start(), 0);
        // 10.5 s * 1 kHz of start offset plus the 100 written frames.
        assert_eq!(slots[0].frames_into_period(), 10_500 + 100);

        // 49 400 more frames reach the boundary exactly.
        feed(&mut producer, Timestamp::new(10, 500_000), 49_400);
        assert!(slots[0].close_requested());
        assert_eq!(producer.active_slot(), 1);
        assert_eq!(slots[1].file_start(), Timestamp::new(60, 0));
        assert_eq!(slots[1].period_start(), 60);
    }

    #[test]
    fn callback_spanning_a_boundary_is_split() {
        let (mut producer, slots) = producer(10, 1, 1, 64);
        feed(&mut producer, Timestamp::new(0, 0), 15);

        assert!(slots[0].close_requested());
        assert_eq!(slots[0].available_frames(), 10);
        assert_eq!(slots[1].available_frames(), 5);
    }

    #[test]
    fn file_start_never_drifts_over_many_switches() {
        let (mut producer, slots) = producer(100, 1, 1, 128);
        feed(&mut producer, Timestamp::new(500, 0), 50);

        let switches = 10_000;
        for _ in 0..switches {
            feed(&mut producer, Timestamp::new(0, 0), 100);
            // Drain whatever made it in so some writes succeed too.
            let mut scratch = [0.0f32; 128];
            for slot in &slots {
                while slot.ring(0).read(&mut scratch) > 0 {}
                slot.clear_close_request();
            }
        }

        let active = &slots[producer.active_slot()];
        assert_eq!(active.file_start(), Timestamp::new(500 + switches, 0));
        assert_eq!(active.period_start(), 500 + switches);
    }

    #[test]
    fn overflow_does_not_delay_the_switch() {
        // Capacity below one period: the boundary write is dropped but the
        // slot still closes and the switch still happens.
        let (mut producer, slots) = producer(1000, 1, 1, 256);
        feed(&mut producer, Timestamp::new(0, 0), 1000);

        assert!(slots[0].take_overflow());
        assert!(slots[0].close_requested());
        assert_eq!(producer.active_slot(), 1);
        assert_eq!(slots[1].file_start(), Timestamp::new(1, 0));
    }

    #[test]
    fn hour_long_period_scenario() {
        // period = 3600 s, rate = 48 kHz, mono, capture starts exactly at
        // the period start; after exactly 3600 * 48000 frames slot A must
        // be closing with nothing yet written to slot B.
        let rate = 48_000u32;
        let (mut producer, slots) = producer(rate, 3600, 1, 1 << 16);

        let total = 3600u64 * u64::from(rate);
        let mut written = 0u64;
        let mut scratch = vec![0.0f32; 1 << 16];
        let chunks = [4096usize, 1024, 48000, 333, 8192];
        let mut i = 0;
        while written < total {
            let chunk = chunks[i % chunks.len()].min((total - written) as usize);
            feed(&mut producer, Timestamp::new(0, 0), chunk);
            written += chunk as u64;
            i += 1;
            // Keep the rings from overflowing; count stays in the offsets.
            for slot in &slots {
                while slot.ring(0).read(&mut scratch) > 0 {}
            }
        }

        assert!(slots[0].close_requested());
        assert_eq!(slots[0].frames_into_period(), total);
        assert_eq!(producer.active_slot(), 1);
        assert_eq!(slots[1].frames_into_period(), 0);
        assert_eq!(slots[1].file_start(), Timestamp::new(3600, 0));
    }

    #[test]
    fn xruns_accumulate_on_the_active_slot() {
        let (mut producer, slots) = producer(1000, 1, 1, 64);
        producer.xrun(250);
        producer.xrun(750);
        assert_eq!(slots[0].take_xrun_usecs(), 1000);
    }

    #[test]
    fn shutdown_only_signals_run_state() {
        let (mut producer, slots) = producer(1000, 1, 1, 64);
        feed(&mut producer, Timestamp::new(0, 0), 10);
        producer.shutdown();

        assert_eq!(producer.run_state.get(), RunState::Quitting);
        // No cleanup happened: the buffered audio is still there.
        assert_eq!(slots[0].available_frames(), 10);
    }

    #[test]
    fn channel_mismatch_is_fatal() {
        let (mut producer, slots) = producer(1000, 1, 2, 64);
        let mono = [0.0f32; 4];
        producer.process(Timestamp::new(0, 0), &[&mono]);

        assert_eq!(producer.run_state.get(), RunState::Error);
        assert_eq!(slots[0].available_frames(), 0);
    }
}

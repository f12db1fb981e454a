use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::encoders::{Encoder, OutputFormat};
use crate::models::config::ArchiveConfig;
use crate::models::error::ArchiveError;
use crate::models::state::{RunState, SharedRunState};
use crate::processing::producer::CaptureProducer;
use crate::processing::slot::CaptureSlot;
use crate::storage::retention::RetentionSweeper;
use crate::traits::audio_input::AudioInput;

/// The archive session: owns both capture slots and runs the drain/encode
/// loop on the caller's thread.
///
/// Data flow:
/// ```text
/// [AudioInput] → CaptureProducer → CaptureSlot rings → drain loop → Encoder → disk
/// ```
///
/// The producer half runs on the backend's real-time thread; everything
/// here runs on the main thread and is free to block, allocate and do I/O.
/// The two halves share only the slots (lock-free rings plus
/// single-writer/single-reader flags) and the run-state word.
pub struct ArchiveSession<I: AudioInput> {
    input: I,
    config: ArchiveConfig,
    encoder: Box<dyn Encoder>,
    file_suffix: &'static str,
    samples_per_frame: usize,
    sample_rate: u32,
    slots: [Arc<CaptureSlot>; 2],
    run_state: Arc<SharedRunState>,
    // One pre-sized scratch buffer per channel for draining rings.
    drain_buffers: Vec<Vec<f32>>,
    retention: RetentionSweeper,
    started: bool,
    fatal: Option<ArchiveError>,
}

impl<I: AudioInput> ArchiveSession<I> {
    /// Create a session using the encoder registry to resolve
    /// `config.format`.
    pub fn new(input: I, config: ArchiveConfig) -> Result<Self, ArchiveError> {
        let format = OutputFormat::lookup(&config.format)?;
        let encoder = format.init(config.channels, input.sample_rate(), config.bitrate)?;
        Self::with_encoder(input, config, encoder)
    }

    /// Create a session with an explicit encoder backend (for codecs not in
    /// the registry).
    pub fn with_encoder(
        input: I,
        config: ArchiveConfig,
        encoder: Box<dyn Encoder>,
    ) -> Result<Self, ArchiveError> {
        config
            .validate()
            .map_err(ArchiveError::ConfigurationFailed)?;
        if input.channels() != config.channels {
            return Err(ArchiveError::ConfigurationFailed(format!(
                "input delivers {} channels but {} are configured",
                input.channels(),
                config.channels
            )));
        }
        if !config.root_directory.is_dir() {
            return Err(ArchiveError::ConfigurationFailed(format!(
                "root directory does not exist: {}",
                config.root_directory.display()
            )));
        }

        let sample_rate = input.sample_rate();
        let samples_per_frame = encoder.samples_per_frame();
        let file_suffix = encoder.file_suffix();

        // Ring capacity from the configured duration; never below one
        // encoder batch or the drain loop could starve forever.
        let capacity =
            ((f64::from(sample_rate) * f64::from(config.ring_buffer_secs)) as usize)
                .max(samples_per_frame);
        log::debug!(
            "ring buffers hold {:.2} s of audio ({} frames per channel)",
            config.ring_buffer_secs,
            capacity
        );

        let slots = [
            Arc::new(CaptureSlot::new('A', config.channels, capacity)),
            Arc::new(CaptureSlot::new('B', config.channels, capacity)),
        ];
        let drain_buffers = (0..config.channels)
            .map(|_| vec![0.0f32; samples_per_frame])
            .collect();

        Ok(Self {
            input,
            config,
            encoder,
            file_suffix,
            samples_per_frame,
            sample_rate,
            slots,
            run_state: Arc::new(SharedRunState::new()),
            drain_buffers,
            retention: RetentionSweeper::new(),
            started: false,
            fatal: None,
        })
    }

    /// Shared run-state handle, for wiring up signal handlers.
    pub fn run_state(&self) -> Arc<SharedRunState> {
        Arc::clone(&self.run_state)
    }

    /// Register the capture producer with the audio backend and begin
    /// receiving audio.
    pub fn start(&mut self) -> Result<(), ArchiveError> {
        if self.started {
            return Ok(());
        }
        let producer = CaptureProducer::new(
            [Arc::clone(&self.slots[0]), Arc::clone(&self.slots[1])],
            Arc::clone(&self.run_state),
            self.sample_rate,
            self.config.period_secs,
            self.config.channels,
        );
        self.input.start(Box::new(producer))?;
        self.started = true;
        log::info!(
            "archiving {} channel(s) at {} Hz, {} s periods, format {}",
            self.config.channels,
            self.sample_rate,
            self.config.period_secs,
            self.config.format
        );
        Ok(())
    }

    /// Run the drain/encode loop until a shutdown is requested or a fatal
    /// error occurs. Returns `Ok` on a clean (signal-triggered) shutdown.
    pub fn run(&mut self) -> Result<(), ArchiveError> {
        self.start()?;

        // Sleeping twice the batch duration bounds idle CPU without adding
        // more than one batch of extra latency.
        let idle = Duration::from_secs_f64(
            2.0 * self.samples_per_frame as f64 / f64::from(self.sample_rate),
        );
        log::debug!("idle sleep period is {} ms", idle.as_millis());

        let sync_interval = Duration::from_secs(self.config.sync_secs);
        let mut last_sync = Instant::now();

        while self.run_state.is_running() {
            let frames = self.service_slots();
            self.retention.poll();

            if self.config.sync_secs > 0 && last_sync.elapsed() >= sync_interval {
                self.sync_streams();
                last_sync = Instant::now();
            }

            if frames == 0 {
                thread::sleep(idle);
            }
        }

        self.shutdown();
        match self.run_state.get() {
            RunState::Error => Err(self
                .fatal
                .take()
                .unwrap_or_else(|| ArchiveError::Input("audio backend failed".into()))),
            _ => Ok(()),
        }
    }

    /// One pass over both slots: report flags, drain a batch, open/write/
    /// close files. Returns the number of frames encoded.
    ///
    /// Public so hosts can interleave their own work with the drain loop;
    /// `run` is this in a loop.
    pub fn service_slots(&mut self) -> usize {
        let mut total = 0;

        for idx in 0..2 {
            let slot = Arc::clone(&self.slots[idx]);

            if slot.take_overflow() {
                log::error!("ring buffer {} overflowed while writing audio", slot.label());
            }
            let xrun = slot.take_xrun_usecs();
            if xrun > 0 {
                log::warn!("audio server xrun of {} µs on slot {}", xrun, slot.label());
            }

            let frames = match self.read_batch(&slot) {
                Ok(frames) => frames,
                Err(e) => {
                    self.fail(e);
                    return total;
                }
            };

            if frames > 0 {
                total += frames;
                if let Err(e) = self.encode_frames(&slot, frames) {
                    if e.is_recoverable() {
                        // The slot keeps buffering; the open is retried on
                        // the next pass. This batch is lost.
                        log::error!("skipping slot {}: {e}", slot.label());
                    } else {
                        self.fail(e);
                        return total;
                    }
                }
            } else if slot.close_requested() && slot.available_frames() == 0 {
                self.close_slot(&slot);
            }
        }

        total
    }

    /// Read one encoder batch from a slot's rings into the drain buffers.
    ///
    /// Reads are all-or-nothing at batch granularity to keep codec framing
    /// simple; a partial tail is read only once the slot is closing.
    fn read_batch(&mut self, slot: &CaptureSlot) -> Result<usize, ArchiveError> {
        let available = slot.available_frames();
        let want = if available >= self.samples_per_frame {
            self.samples_per_frame
        } else if slot.close_requested() && available > 0 {
            available
        } else {
            return Ok(0);
        };

        for (channel, buffer) in self.drain_buffers.iter_mut().enumerate() {
            let got = slot.ring(channel).read(&mut buffer[..want]);
            if got != want {
                return Err(ArchiveError::BufferProtocol(format!(
                    "short read from slot {} channel {channel}: {got} of {want} frames",
                    slot.label()
                )));
            }
        }
        Ok(want)
    }

    /// Write a drained batch through the encoder, opening the slot's file
    /// first if necessary.
    fn encode_frames(&mut self, slot: &CaptureSlot, frames: usize) -> Result<(), ArchiveError> {
        let mut stream = slot.stream().lock();

        if stream.is_none() {
            let path = self
                .config
                .file_layout
                .build_path(
                    &self.config.root_directory,
                    self.config.archive_name.as_deref(),
                    self.file_suffix,
                    slot.file_start(),
                    self.config.utc,
                )
                .map_err(|e| ArchiveError::FileOpen(e.to_string()))?;
            log::info!(
                "opening new archive file for slot {}: {}",
                slot.label(),
                path.display()
            );
            *stream = Some(self.encoder.open(&path)?);
        }

        if let Some(stream) = stream.as_mut() {
            let channels: Vec<&[f32]> = self
                .drain_buffers
                .iter()
                .map(|buffer| &buffer[..frames])
                .collect();
            stream.write(frames, &channels)?;
        }
        Ok(())
    }

    /// Close a slot's file if one is open and kick the retention sweep.
    /// A close request on a slot with no open file is a successful no-op.
    fn close_slot(&mut self, slot: &CaptureSlot) {
        if let Some(stream) = slot.stream().lock().take() {
            log::info!("closing file for slot {}", slot.label());
            if let Err(e) = stream.close(slot.file_start()) {
                log::error!("failed to finalize file for slot {}: {e}", slot.label());
            }
            self.retention
                .request(&self.config.root_directory, self.config.delete_hours);
        }
        slot.clear_close_request();
    }

    /// Flush every open stream to storage, bounding crash data loss to the
    /// sync interval.
    fn sync_streams(&mut self) {
        for slot in &self.slots {
            if let Some(stream) = slot.stream().lock().as_mut() {
                if let Err(e) = stream.sync() {
                    log::warn!("storage sync failed for slot {}: {e}", slot.label());
                }
            }
        }
    }

    fn fail(&mut self, error: ArchiveError) {
        log::error!("fatal: {error}");
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        self.run_state.fail();
    }

    /// Stop capture and release everything. No further audio is drained;
    /// open files are closed cleanly.
    fn shutdown(&mut self) {
        if self.started {
            log::debug!("stopping audio input");
            if let Err(e) = self.input.stop() {
                log::error!("failed to stop audio input: {e}");
            }
            self.started = false;
        }

        for idx in 0..2 {
            let slot = Arc::clone(&self.slots[idx]);
            self.close_slot(&slot);
        }

        self.encoder.shutdown();
        self.retention.join();
    }
}

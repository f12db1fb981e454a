//! cpal capture device wrapper.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use parking_lot::Mutex;

use audio_archive_core::{ArchiveError, AudioInput, InputHandler, Timestamp};

/// Upper bound on the frames handed to the capture producer per call.
/// Callbacks larger than this are delivered in slices.
const MAX_CHUNK_FRAMES: usize = 4096;

/// An input connection to the default cpal host.
///
/// Interleaved device samples are de-interleaved into pre-allocated planar
/// buffers inside the data callback, so the hot path never allocates. When
/// the device carries more channels than requested, the leading channels
/// are used and the rest ignored.
pub struct CpalInput {
    device: cpal::Device,
    sample_rate: u32,
    channels: u16,
    stream: Option<StreamHandle>,
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. This is safe
/// because the stream stays on the thread that created it: `CpalInput`
/// only stores the handle to keep the stream alive, and drops it from
/// `stop` on the owning thread.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

impl CpalInput {
    /// Open an input device: the default one, or the `device_index`-th of
    /// the host's input devices. `channels` is how many channels to
    /// deliver; the device must provide at least that many.
    pub fn new(device_index: Option<usize>, channels: u16) -> Result<Self, ArchiveError> {
        let device = find_device(device_index)?;
        let config = device.default_input_config().map_err(input_err)?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());

        if config.channels() < channels {
            return Err(ArchiveError::Input(format!(
                "device '{name}' provides {} channel(s), {channels} requested",
                config.channels()
            )));
        }

        log::info!(
            "input device '{}': {} Hz, {} channel(s), {:?} samples",
            name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self {
            sample_rate: config.sample_rate().0,
            device,
            channels,
            stream: None,
        })
    }

    /// Names of the host's input devices, in index order.
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => devices
                .map(|device| device.name().unwrap_or_else(|_| "unknown".into()))
                .collect(),
            Err(e) => {
                log::warn!("failed to enumerate input devices: {e}");
                Vec::new()
            }
        }
    }

    fn build_stream<T>(
        &self,
        config: &cpal::StreamConfig,
        handler: Arc<Mutex<Box<dyn InputHandler>>>,
    ) -> Result<cpal::Stream, ArchiveError>
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        let device_channels = usize::from(config.channels);
        let want = usize::from(self.channels);
        // Two planes regardless of channel count; only `want` are delivered.
        let mut planar = vec![vec![0.0f32; MAX_CHUNK_FRAMES]; 2];
        let data_handler = Arc::clone(&handler);

        self.device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let now = Timestamp::now();
                    let mut handler = data_handler.lock();
                    let frames = data.len() / device_channels;
                    let mut done = 0;
                    while done < frames {
                        let chunk = (frames - done).min(MAX_CHUNK_FRAMES);
                        fill_planar(&mut planar, data, device_channels, done, chunk, want);
                        let refs = [&planar[0][..chunk], &planar[1][..chunk]];
                        handler.process(now, &refs[..want]);
                        done += chunk;
                    }
                },
                move |err| match err {
                    cpal::StreamError::DeviceNotAvailable => {
                        log::error!("input device disappeared, stopping capture");
                        handler.lock().shutdown();
                    }
                    cpal::StreamError::BackendSpecific { err } => {
                        log::warn!("audio backend error: {err}");
                    }
                },
                None,
            )
            .map_err(input_err)
    }
}

impl AudioInput for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn start(&mut self, handler: Box<dyn InputHandler>) -> Result<(), ArchiveError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let config = self.device.default_input_config().map_err(input_err)?;
        let stream_config: cpal::StreamConfig = config.clone().into();
        let handler = Arc::new(Mutex::new(handler));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(&stream_config, handler)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(&stream_config, handler)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(&stream_config, handler)?,
            format => {
                return Err(ArchiveError::Input(format!(
                    "unsupported sample format: {format:?}"
                )))
            }
        };

        stream.play().map_err(input_err)?;
        self.stream = Some(StreamHandle(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ArchiveError> {
        if let Some(StreamHandle(stream)) = self.stream.take() {
            stream.pause().map_err(input_err)?;
        }
        Ok(())
    }
}

fn find_device(index: Option<usize>) -> Result<cpal::Device, ArchiveError> {
    let host = cpal::default_host();

    if let Some(idx) = index {
        let devices: Vec<_> = host.input_devices().map_err(input_err)?.collect();
        let count = devices.len();
        devices.into_iter().nth(idx).ok_or_else(|| {
            ArchiveError::Input(format!(
                "input device index {idx} out of range (available: {count})"
            ))
        })
    } else {
        host.default_input_device()
            .ok_or_else(|| ArchiveError::Input("no input device available".into()))
    }
}

fn input_err<E: std::fmt::Display>(e: E) -> ArchiveError {
    ArchiveError::Input(e.to_string())
}

/// Copy `frames` frames starting at `offset` from interleaved `data` into
/// the first `channels` planes of `planar`, converting to f32.
fn fill_planar<T>(
    planar: &mut [Vec<f32>],
    data: &[T],
    stride: usize,
    offset: usize,
    frames: usize,
    channels: usize,
) where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    for (c, plane) in planar.iter_mut().take(channels).enumerate() {
        for i in 0..frames {
            plane[i] = f32::from_sample(data[(offset + i) * stride + c]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_and_converts_i16() {
        let mut planar = vec![vec![0.0f32; 4]; 2];
        // 4 stereo frames.
        let data: Vec<i16> = vec![i16::MAX, 0, 0, i16::MIN, 16384, -16384, 100, -100];
        fill_planar(&mut planar, &data, 2, 0, 4, 2);

        assert!((planar[0][0] - 1.0).abs() < 1e-3);
        assert_eq!(planar[1][0], 0.0);
        assert_eq!(planar[0][1], 0.0);
        assert_eq!(planar[1][1], -1.0);
        assert!((planar[0][2] - 0.5).abs() < 1e-6);
        assert!((planar[1][2] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn mono_pick_ignores_extra_channels() {
        let mut planar = vec![vec![0.0f32; 2]; 2];
        let data: Vec<f32> = vec![0.1, 0.9, 0.2, 0.8];
        fill_planar(&mut planar, &data, 2, 0, 2, 1);

        assert_eq!(&planar[0][..2], &[0.1, 0.2]);
        // The second plane is untouched.
        assert_eq!(&planar[1][..2], &[0.0, 0.0]);
    }

    #[test]
    fn offset_slices_a_large_callback() {
        let mut planar = vec![vec![0.0f32; 2]; 2];
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        fill_planar(&mut planar, &data, 1, 4, 2, 1);

        assert_eq!(&planar[0][..2], &[5.0, 6.0]);
    }

    #[test]
    fn device_listing_does_not_panic() {
        // No hardware is assumed; an empty host is fine.
        let devices = CpalInput::list_devices();
        for (idx, name) in devices.iter().enumerate() {
            println!("{idx}: {name}");
        }
    }
}

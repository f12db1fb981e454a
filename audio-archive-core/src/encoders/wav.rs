//! WAV (RIFF) encoder backend.
//!
//! Writes a 44-byte header at open with zeroed size fields, streams samples,
//! and patches the sizes at close. Closing also appends a `LIST`/`INFO`
//! chunk carrying the recording's start time — the trailing tag record for
//! this container.
//!
//! Files are opened read-write so that a restart within the same archive
//! period resumes the existing file: the previous trailing metadata is
//! dropped and new audio is appended to the data chunk.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{TimeZone, Utc};

use crate::models::error::ArchiveError;
use crate::models::timestamp::Timestamp;

use super::{f32_to_i16, EncodedStream, Encoder, OutputFormat, SampleEncoding};

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

pub(crate) fn init_wav(
    format: &OutputFormat,
    channels: u16,
    sample_rate: u32,
    bitrate: u32,
) -> Result<Box<dyn Encoder>, ArchiveError> {
    if ![1, 2].contains(&channels) {
        return Err(ArchiveError::ConfigurationFailed(format!(
            "wav encoder supports 1 or 2 channels, got {channels}"
        )));
    }
    log::debug!(
        "wav encoder: {} Hz, {} channels, {} (bitrate {} ignored)",
        sample_rate,
        channels,
        format.description,
        bitrate
    );

    Ok(Box::new(WavEncoder {
        encoding: format.encoding(),
        channels,
        sample_rate,
        samples_per_frame: format.samples_per_frame,
    }))
}

pub struct WavEncoder {
    encoding: SampleEncoding,
    channels: u16,
    sample_rate: u32,
    samples_per_frame: usize,
}

impl Encoder for WavEncoder {
    fn file_suffix(&self) -> &'static str {
        "wav"
    }

    fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn open(&mut self, path: &Path) -> Result<Box<dyn EncodedStream>, ArchiveError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| ArchiveError::FileOpen(format!("{}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| ArchiveError::FileOpen(e.to_string()))?
            .len();

        let data_bytes = if len == 0 {
            let header = generate_header(self.sample_rate, self.encoding, self.channels, 0);
            file.write_all(&header)
                .map_err(|e| ArchiveError::FileOpen(format!("writing header: {e}")))?;
            0
        } else {
            resume_existing(&mut file, len, path)?
        };

        let max_samples = self.samples_per_frame * self.channels as usize;
        Ok(Box::new(WavStream {
            file,
            encoding: self.encoding,
            channels: self.channels as usize,
            data_bytes,
            interleaved: vec![0.0; max_samples],
            scratch: vec![0; max_samples * self.encoding.bytes_per_sample()],
        }))
    }
}

/// Validate an existing file and position it for appending.
///
/// The data-chunk size from the header tells us where audio ends; anything
/// after that (a LIST chunk from an earlier clean close) is truncated away.
fn resume_existing(file: &mut File, len: u64, path: &Path) -> Result<u64, ArchiveError> {
    let mut header = [0u8; WAV_HEADER_SIZE];
    file.read_exact(&mut header)
        .map_err(|e| ArchiveError::FileOpen(format!("{}: reading header: {e}", path.display())))?;

    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" || &header[36..40] != b"data" {
        return Err(ArchiveError::FileOpen(format!(
            "{}: existing file is not a WAV archive",
            path.display()
        )));
    }

    let existing = u64::from(u32::from_le_bytes([
        header[40], header[41], header[42], header[43],
    ]));
    let data_end = (WAV_HEADER_SIZE as u64 + existing).min(len);

    file.set_len(data_end)
        .map_err(|e| ArchiveError::FileOpen(e.to_string()))?;
    file.seek(SeekFrom::Start(data_end))
        .map_err(|e| ArchiveError::FileOpen(e.to_string()))?;

    log::debug!(
        "resuming existing archive file {} with {} data bytes",
        path.display(),
        existing
    );
    Ok(existing)
}

struct WavStream {
    file: File,
    encoding: SampleEncoding,
    channels: usize,
    data_bytes: u64,
    // Pre-sized at open; the write path never allocates.
    interleaved: Vec<f32>,
    scratch: Vec<u8>,
}

impl EncodedStream for WavStream {
    fn write(&mut self, nframes: usize, channels: &[&[f32]]) -> Result<(), ArchiveError> {
        let samples = nframes * self.channels;
        if channels.len() != self.channels || samples > self.interleaved.len() {
            return Err(ArchiveError::BufferProtocol(format!(
                "wav write of {nframes} frames x {} channels exceeds the encoder batch",
                channels.len()
            )));
        }

        for (c, channel) in channels.iter().enumerate() {
            for (i, &sample) in channel[..nframes].iter().enumerate() {
                self.interleaved[i * self.channels + c] = sample;
            }
        }

        let bytes = samples * self.encoding.bytes_per_sample();
        match self.encoding {
            SampleEncoding::Pcm16 => {
                for (i, &sample) in self.interleaved[..samples].iter().enumerate() {
                    let le = f32_to_i16(sample).to_le_bytes();
                    self.scratch[i * 2..i * 2 + 2].copy_from_slice(&le);
                }
            }
            SampleEncoding::Float32 => {
                for (i, &sample) in self.interleaved[..samples].iter().enumerate() {
                    self.scratch[i * 4..i * 4 + 4].copy_from_slice(&sample.to_le_bytes());
                }
            }
        }

        self.file
            .write_all(&self.scratch[..bytes])
            .map_err(|e| ArchiveError::Encoding(format!("wav write failed: {e}")))?;
        self.data_bytes += bytes as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), ArchiveError> {
        self.file
            .sync_data()
            .map_err(|e| ArchiveError::Storage(format!("wav sync failed: {e}")))
    }

    fn close(mut self: Box<Self>, file_start: Timestamp) -> Result<(), ArchiveError> {
        let storage = |e: std::io::Error| ArchiveError::Storage(format!("wav close failed: {e}"));

        // Trailing metadata, then size patches covering it.
        self.file.seek(SeekFrom::End(0)).map_err(storage)?;
        self.file.write_all(&info_chunk(file_start)).map_err(storage)?;
        let total = self.file.stream_position().map_err(storage)?;

        self.file.seek(SeekFrom::Start(4)).map_err(storage)?;
        self.file
            .write_all(&((total - 8) as u32).to_le_bytes())
            .map_err(storage)?;

        self.file.seek(SeekFrom::Start(40)).map_err(storage)?;
        self.file
            .write_all(&(self.data_bytes as u32).to_le_bytes())
            .map_err(storage)?;

        self.file.sync_all().map_err(storage)?;
        Ok(())
    }
}

/// Generate a 44-byte WAV RIFF header.
fn generate_header(
    sample_rate: u32,
    encoding: SampleEncoding,
    channels: u16,
    data_size: u32,
) -> [u8; WAV_HEADER_SIZE] {
    let bit_depth = encoding.bit_depth();
    let format_code = match encoding {
        SampleEncoding::Pcm16 => FORMAT_PCM,
        SampleEncoding::Float32 => FORMAT_IEEE_FLOAT,
    };
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bit_depth) / 8;
    let block_align = channels * bit_depth / 8;

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format_code.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Build the trailing `LIST`/`INFO` chunk for a recording started at
/// `file_start`. Timestamps are embedded in UTC.
fn info_chunk(file_start: Timestamp) -> Vec<u8> {
    let started = Utc
        .timestamp_opt(file_start.sec, file_start.usec * 1000)
        .single()
        .unwrap_or_default();

    let mut body = Vec::new();
    body.extend_from_slice(b"INFO");
    push_info_field(&mut body, b"ICRD", &started.format("%Y-%m-%d").to_string());
    push_info_field(
        &mut body,
        b"ISFT",
        &format!("audio-archive {}", crate::VERSION),
    );
    push_info_field(
        &mut body,
        b"ICMT",
        &started.format("Recorded %Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    let mut chunk = Vec::with_capacity(body.len() + 8);
    chunk.extend_from_slice(b"LIST");
    chunk.extend_from_slice(&(body.len() as u32).to_le_bytes());
    chunk.extend_from_slice(&body);
    chunk
}

fn push_info_field(out: &mut Vec<u8>, id: &[u8; 4], value: &str) {
    let data_len = value.len() + 1; // NUL terminator
    out.extend_from_slice(id);
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    if data_len % 2 == 1 {
        out.push(0); // word alignment pad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("audio_archive_wav_{name}"));
        let _ = fs::remove_file(&path);
        path
    }

    fn open_stream(path: &Path, format_name: &str) -> Box<dyn EncodedStream> {
        let format = OutputFormat::lookup(format_name).unwrap();
        let mut encoder = format.init(2, 48000, 160).unwrap();
        encoder.open(path).unwrap()
    }

    #[test]
    fn fresh_file_has_patched_sizes_and_info_chunk() {
        let path = temp_path("fresh.wav");
        let mut stream = open_stream(&path, "wav");

        let left = [0.5f32; 512];
        let right = [-0.5f32; 512];
        stream.write(512, &[&left, &right]).unwrap();
        stream.close(Timestamp::new(1_700_000_000, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[36..40], b"data");

        let data_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        assert_eq!(data_size, 512 * 2 * 2); // frames * channels * 2 bytes

        let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(riff_size as usize, bytes.len() - 8);

        let tail = &bytes[WAV_HEADER_SIZE + data_size as usize..];
        assert_eq!(&tail[0..4], b"LIST");
        assert_eq!(&tail[8..12], b"INFO");
        // ICRD carries the recording date (2023-11-14 for this epoch value).
        let tail_str = String::from_utf8_lossy(tail);
        assert!(tail_str.contains("2023-11-14"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn float_variant_uses_ieee_format_code() {
        let path = temp_path("float.wav");
        let mut stream = open_stream(&path, "wav32");

        let mono = [0.25f32; 512];
        stream.write(512, &[&mono, &mono]).unwrap();
        stream.close(Timestamp::new(0, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        let format_code = u16::from_le_bytes([bytes[20], bytes[21]]);
        assert_eq!(format_code, FORMAT_IEEE_FLOAT);
        let bit_depth = u16::from_le_bytes([bytes[34], bytes[35]]);
        assert_eq!(bit_depth, 32);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn pcm_samples_round_trip_through_conversion() {
        let path = temp_path("pcm.wav");
        let mut stream = open_stream(&path, "wav");

        let left = [1.0f32, -1.0, 0.0, 0.5];
        let right = [0.0f32; 4];
        stream.write(4, &[&left, &right]).unwrap();
        stream.close(Timestamp::new(0, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        let first = i16::from_le_bytes([bytes[44], bytes[45]]);
        assert_eq!(first, i16::MAX); // +1.0 clamps
        let second_left = i16::from_le_bytes([bytes[48], bytes[49]]);
        assert_eq!(second_left, i16::MIN); // -1.0 maps to the negative rail

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reopen_resumes_data_and_drops_old_trailer() {
        let path = temp_path("resume.wav");

        let mut stream = open_stream(&path, "wav");
        let silence = [0.0f32; 512];
        stream.write(512, &[&silence, &silence]).unwrap();
        stream.close(Timestamp::new(1_700_000_000, 0)).unwrap();
        let closed_len = fs::metadata(&path).unwrap().len();

        // Reopen and append another batch.
        let mut stream = open_stream(&path, "wav");
        stream.write(512, &[&silence, &silence]).unwrap();
        stream.close(Timestamp::new(1_700_000_000, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        let data_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        assert_eq!(data_size, 2 * 512 * 2 * 2);
        // One trailer only: the resumed file is bigger by exactly one batch.
        assert_eq!(bytes.len() as u64, closed_len + 512 * 2 * 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_non_wav_existing_file() {
        let path = temp_path("garbage.wav");
        fs::write(&path, b"definitely not a RIFF file, but long enough to read a header").unwrap();

        let format = OutputFormat::lookup("wav").unwrap();
        let mut encoder = format.init(2, 48000, 160).unwrap();
        let result = encoder.open(&path);
        assert!(matches!(result, Err(ArchiveError::FileOpen(_))));

        fs::remove_file(&path).unwrap();
    }
}

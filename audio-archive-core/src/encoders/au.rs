//! Sun AU (.snd) encoder backend.
//!
//! Big-endian header and samples; the data size field is patched at close.
//! AU has no tag record, so close only finalizes the sizes. Like the WAV
//! backend, existing files are resumed by appending after their data.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::models::error::ArchiveError;
use crate::models::timestamp::Timestamp;

use super::{f32_to_i16, EncodedStream, Encoder, OutputFormat, SampleEncoding};

const AU_HEADER_SIZE: usize = 24;
const AU_MAGIC: &[u8; 4] = b".snd";
const AU_ENCODING_PCM16: u32 = 3;
const AU_ENCODING_FLOAT32: u32 = 6;

pub(crate) fn init_au(
    format: &OutputFormat,
    channels: u16,
    sample_rate: u32,
    bitrate: u32,
) -> Result<Box<dyn Encoder>, ArchiveError> {
    if ![1, 2].contains(&channels) {
        return Err(ArchiveError::ConfigurationFailed(format!(
            "au encoder supports 1 or 2 channels, got {channels}"
        )));
    }
    log::debug!(
        "au encoder: {} Hz, {} channels, {} (bitrate {} ignored)",
        sample_rate,
        channels,
        format.description,
        bitrate
    );

    Ok(Box::new(AuEncoder {
        encoding: format.encoding(),
        channels,
        sample_rate,
        samples_per_frame: format.samples_per_frame,
    }))
}

pub struct AuEncoder {
    encoding: SampleEncoding,
    channels: u16,
    sample_rate: u32,
    samples_per_frame: usize,
}

impl Encoder for AuEncoder {
    fn file_suffix(&self) -> &'static str {
        "au"
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
            let header = generate_header(self.sample_rate, self.encoding, self.channels);
            file.write_all(&header)
                .map_err(|e| ArchiveError::FileOpen(format!("writing header: {e}")))?;
            0
        } else {
            let mut magic = [0u8; 4];
            file.read_exact(&mut magic)
                .map_err(|e| ArchiveError::FileOpen(e.to_string()))?;
            if &magic != AU_MAGIC {
                return Err(ArchiveError::FileOpen(format!(
                    "{}: existing file is not an AU archive",
                    path.display()
                )));
            }
            file.seek(SeekFrom::End(0))
                .map_err(|e| ArchiveError::FileOpen(e.to_string()))?;
            len - AU_HEADER_SIZE as u64
        };

        let max_samples = self.samples_per_frame * self.channels as usize;
        Ok(Box::new(AuStream {
            file,
            encoding: self.encoding,
            channels: self.channels as usize,
            data_bytes,
            scratch: vec![0; max_samples * self.encoding.bytes_per_sample()],
        }))
    }
}

struct AuStream {
    file: std::fs::File,
    encoding: SampleEncoding,
    channels: usize,
    data_bytes: u64,
    scratch: Vec<u8>,
}

impl EncodedStream for AuStream {
    fn write(&mut self, nframes: usize, channels: &[&[f32]]) -> Result<(), ArchiveError> {
        let samples = nframes * self.channels;
        let bytes = samples * self.encoding.bytes_per_sample();
        if channels.len() != self.channels || bytes > self.scratch.len() {
            return Err(ArchiveError::BufferProtocol(format!(
                "au write of {nframes} frames x {} channels exceeds the encoder batch",
                channels.len()
            )));
        }

        // Interleave and convert in one pass; AU is big-endian.
        for (c, channel) in channels.iter().enumerate() {
            for (i, &sample) in channel[..nframes].iter().enumerate() {
                let s = i * self.channels + c;
                match self.encoding {
                    SampleEncoding::Pcm16 => {
                        let be = f32_to_i16(sample).to_be_bytes();
                        self.scratch[s * 2..s * 2 + 2].copy_from_slice(&be);
                    }
                    SampleEncoding::Float32 => {
                        self.scratch[s * 4..s * 4 + 4].copy_from_slice(&sample.to_be_bytes());
                    }
                }
            }
        }

        self.file
            .write_all(&self.scratch[..bytes])
            .map_err(|e| ArchiveError::Encoding(format!("au write failed: {e}")))?;
        self.data_bytes += bytes as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), ArchiveError> {
        self.file
            .sync_data()
            .map_err(|e| ArchiveError::Storage(format!("au sync failed: {e}")))
    }

    fn close(mut self: Box<Self>, _file_start: Timestamp) -> Result<(), ArchiveError> {
        let storage = |e: std::io::Error| ArchiveError::Storage(format!("au close failed: {e}"));

        self.file.seek(SeekFrom::Start(8)).map_err(storage)?;
        self.file
            .write_all(&(self.data_bytes as u32).to_be_bytes())
            .map_err(storage)?;
        self.file.sync_all().map_err(storage)?;
        Ok(())
    }
}

fn generate_header(
    sample_rate: u32,
    encoding: SampleEncoding,
    channels: u16,
) -> [u8; AU_HEADER_SIZE] {
    let encoding_code = match encoding {
        SampleEncoding::Pcm16 => AU_ENCODING_PCM16,
        SampleEncoding::Float32 => AU_ENCODING_FLOAT32,
    };

    let mut header = [0u8; AU_HEADER_SIZE];
    header[0..4].copy_from_slice(AU_MAGIC);
    header[4..8].copy_from_slice(&(AU_HEADER_SIZE as u32).to_be_bytes());
    // Data size is unknown while recording; patched at close.
    header[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
    header[12..16].copy_from_slice(&encoding_code.to_be_bytes());
    header[16..20].copy_from_slice(&sample_rate.to_be_bytes());
    header[20..24].copy_from_slice(&u32::from(channels).to_be_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("audio_archive_au_{name}"));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn header_and_patched_size() {
        let path = temp_path("basic.au");
        let format = OutputFormat::lookup("au").unwrap();
        let mut encoder = format.init(1, 44100, 160).unwrap();
        let mut stream = encoder.open(&path).unwrap();

        let mono = [0.5f32; 100];
        stream.write(100, &[&mono]).unwrap();
        stream.close(Timestamp::new(0, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b".snd");
        let data_size = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(data_size, 200); // 100 frames * 1 channel * 2 bytes
        let rate = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        assert_eq!(rate, 44100);

        // Big-endian PCM: +0.5 is 0x4000.
        assert_eq!(&bytes[24..26], &[0x40, 0x00]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn float_variant_encoding_code() {
        let path = temp_path("float.au");
        let format = OutputFormat::lookup("au32").unwrap();
        let mut encoder = format.init(2, 48000, 160).unwrap();
        let stream = encoder.open(&path).unwrap();
        drop(stream);

        let bytes = fs::read(&path).unwrap();
        let code = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        assert_eq!(code, AU_ENCODING_FLOAT32);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reopen_appends() {
        let path = temp_path("resume.au");
        let format = OutputFormat::lookup("au").unwrap();
        let mut encoder = format.init(1, 48000, 160).unwrap();

        let mono = [0.0f32; 50];
        let mut stream = encoder.open(&path).unwrap();
        stream.write(50, &[&mono]).unwrap();
        stream.close(Timestamp::new(0, 0)).unwrap();

        let mut stream = encoder.open(&path).unwrap();
        stream.write(50, &[&mono]).unwrap();
        stream.close(Timestamp::new(0, 0)).unwrap();

        let bytes = fs::read(&path).unwrap();
        let data_size = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(data_size, 200);
        assert_eq!(bytes.len(), AU_HEADER_SIZE + 200);

        fs::remove_file(&path).unwrap();
    }
}

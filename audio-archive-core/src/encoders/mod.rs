//! Encoder backends and the format registry.
//!
//! The drain loop depends only on the [`Encoder`] / [`EncodedStream`]
//! contract; concrete backends are selected once at startup by format name
//! through [`OutputFormat::lookup`].

pub mod au;
pub mod wav;

use std::path::Path;

use crate::models::error::ArchiveError;
use crate::models::timestamp::Timestamp;

/// Batch size, in frames, for the PCM container backends.
pub const PCM_SAMPLES_PER_FRAME: usize = 512;

/// Sample representation written to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Pcm16,
    Float32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Float32 => 4,
        }
    }

    pub fn bit_depth(self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Float32 => 32,
        }
    }
}

/// A codec backend. One encoder is created per session and opens one stream
/// per archive file.
pub trait Encoder: Send {
    /// Filename suffix for archive files ("wav", "au", ...).
    fn file_suffix(&self) -> &'static str;

    /// The batch size, in frames, the drain loop should feed `write` with.
    fn samples_per_frame(&self) -> usize;

    /// Open a new archive file.
    fn open(&mut self, path: &Path) -> Result<Box<dyn EncodedStream>, ArchiveError>;

    /// Release any global encoder resources at session end.
    fn shutdown(&mut self) {}
}

/// One open archive file.
pub trait EncodedStream: Send {
    /// Encode and write `nframes` frames of planar audio.
    fn write(&mut self, nframes: usize, channels: &[&[f32]]) -> Result<(), ArchiveError>;

    /// Flush buffered data to the underlying storage.
    fn sync(&mut self) -> Result<(), ArchiveError>;

    /// Finalize the file, including any trailing metadata derived from the
    /// recording's start time.
    fn close(self: Box<Self>, file_start: Timestamp) -> Result<(), ArchiveError>;
}

/// An entry in the output format registry.
pub struct OutputFormat {
    pub name: &'static str,
    pub description: &'static str,
    pub samples_per_frame: usize,
    init: fn(&OutputFormat, u16, u32, u32) -> Result<Box<dyn Encoder>, ArchiveError>,
    encoding: SampleEncoding,
}

static FORMATS: &[OutputFormat] = &[
    OutputFormat {
        name: "wav",
        description: "WAV (Microsoft 16 bit PCM)",
        samples_per_frame: PCM_SAMPLES_PER_FRAME,
        init: wav::init_wav,
        encoding: SampleEncoding::Pcm16,
    },
    OutputFormat {
        name: "wav32",
        description: "WAV (Microsoft 32 bit float)",
        samples_per_frame: PCM_SAMPLES_PER_FRAME,
        init: wav::init_wav,
        encoding: SampleEncoding::Float32,
    },
    OutputFormat {
        name: "au",
        description: "AU (Sun/Next 16 bit PCM)",
        samples_per_frame: PCM_SAMPLES_PER_FRAME,
        init: au::init_au,
        encoding: SampleEncoding::Pcm16,
    },
    OutputFormat {
        name: "au32",
        description: "AU (Sun/Next 32 bit float)",
        samples_per_frame: PCM_SAMPLES_PER_FRAME,
        init: au::init_au,
        encoding: SampleEncoding::Float32,
    },
];

impl OutputFormat {
    /// All supported output formats. The first entry is the default.
    pub fn all() -> &'static [OutputFormat] {
        FORMATS
    }

    /// Find a format by its registry name (case-insensitive).
    pub fn lookup(name: &str) -> Result<&'static OutputFormat, ArchiveError> {
        FORMATS
            .iter()
            .find(|format| format.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ArchiveError::UnknownFormat(name.to_string()))
    }

    /// Create the encoder backend for this format.
    pub fn init(
        &self,
        channels: u16,
        sample_rate: u32,
        bitrate: u32,
    ) -> Result<Box<dyn Encoder>, ArchiveError> {
        (self.init)(self, channels, sample_rate, bitrate)
    }

    pub(crate) fn encoding(&self) -> SampleEncoding {
        self.encoding
    }
}

impl std::fmt::Debug for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFormat")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Convert one float sample to 16-bit PCM with clamping.
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32768.0).round();
    if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(OutputFormat::lookup("WAV").unwrap().name, "wav");
        assert_eq!(OutputFormat::lookup("au32").unwrap().name, "au32");
    }

    #[test]
    fn lookup_unknown_format_fails() {
        assert!(matches!(
            OutputFormat::lookup("mp5"),
            Err(ArchiveError::UnknownFormat(name)) if name == "mp5"
        ));
    }

    #[test]
    fn default_format_is_first_entry() {
        assert_eq!(OutputFormat::all()[0].name, "wav");
    }

    #[test]
    fn pcm_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.5), i16::MAX);
        assert_eq!(f32_to_i16(-1.5), i16::MIN);
        assert_eq!(f32_to_i16(0.5), 16384);
    }
}

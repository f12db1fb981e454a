use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::layout::FileLayout;

/// Configuration for an archive session.
///
/// Defaults follow the classic transmission-logger setup: stereo input,
/// two seconds of ring buffer, one file per hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Number of input channels (1 or 2).
    pub channels: u16,

    /// Duration of each per-channel ring buffer, in seconds.
    pub ring_buffer_secs: f32,

    /// Length of each archive period (one file's span), in seconds.
    pub period_secs: u32,

    /// Output format name, resolved against the encoder registry.
    pub format: String,

    /// Bitrate in kbit/s, used by bitstream formats only.
    pub bitrate: u32,

    /// How archive paths are laid out under the root directory.
    pub file_layout: FileLayout,

    /// Stem for archive file names, where the layout uses one.
    pub archive_name: Option<String>,

    /// Root directory of the archive tree.
    pub root_directory: PathBuf,

    /// Delete archive files older than this many hours (0 = never).
    pub delete_hours: u32,

    /// Interval between storage syncs of open files, in seconds (0 = never).
    pub sync_secs: u64,

    /// Use UTC rather than local time in file names.
    pub utc: bool,
}

impl ArchiveConfig {
    pub fn validate(&self) -> Result<(), String> {
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.period_secs == 0 {
            return Err("archive period must be at least one second".into());
        }
        if !(self.ring_buffer_secs > 0.0) {
            return Err("ring buffer duration must be positive".into());
        }
        if let FileLayout::Custom(template) = &self.file_layout {
            if template.is_empty() {
                return Err("custom file layout template is empty".into());
            }
        }
        Ok(())
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            ring_buffer_secs: 2.0,
            period_secs: 3600,
            format: "wav".into(),
            bitrate: 160,
            file_layout: FileLayout::Hierarchy,
            archive_name: None,
            root_directory: PathBuf::from("."),
            delete_hours: 0,
            sync_secs: 60,
            utc: false,
        }
    }
}

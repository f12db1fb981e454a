//! cpal input backend for `audio-archive-core`.
//!
//! Connects an [`audio_archive_core::ArchiveSession`] to the platform's
//! default audio host via cpal, delivering planar f32 audio to the capture
//! producer from the device's real-time callback.

pub mod input;

pub use input::CpalInput;

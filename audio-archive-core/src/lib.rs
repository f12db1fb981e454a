//! Continuous audio archiving: capture from a real-time audio backend,
//! split the stream into fixed wall-clock periods and encode each period to
//! its own timestamped file.
//!
//! # Architecture
//!
//! ```text
//! audio backend (real-time thread)
//!   └─ CaptureProducer ── lock-free rings ──┐
//!                                           │
//! main thread                               ▼
//!   └─ ArchiveSession::run ── CaptureSlot A/B ── Encoder ── archive files
//! ```
//!
//! Audio arrives on the backend's real-time thread and is copied into the
//! active capture slot by [`CaptureProducer`], which also splits callbacks
//! at period boundaries and flips between the two slots. The drain loop in
//! [`ArchiveSession`] empties the slots in encoder-sized batches, opens and
//! closes archive files, and runs retention sweeps. The two threads share
//! nothing but the slots and a run-state word.
//!
//! Backends implement [`AudioInput`] (see the companion cpal crate); codecs
//! implement [`Encoder`] and are registered in [`OutputFormat`].

pub mod encoders;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

pub use encoders::{EncodedStream, Encoder, OutputFormat, SampleEncoding};
pub use models::config::ArchiveConfig;
pub use models::error::ArchiveError;
pub use models::state::{RunState, SharedRunState};
pub use models::timestamp::Timestamp;
pub use processing::producer::CaptureProducer;
pub use processing::ring_buffer::FrameRing;
pub use processing::slot::CaptureSlot;
pub use session::archive::ArchiveSession;
pub use storage::layout::FileLayout;
pub use storage::retention::RetentionSweeper;
pub use traits::audio_input::{AudioInput, InputHandler};

/// Version string recorded in file metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

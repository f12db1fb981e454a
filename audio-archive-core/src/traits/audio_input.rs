use crate::models::error::ArchiveError;
use crate::models::timestamp::Timestamp;

/// Receiver for real-time audio delivered by an [`AudioInput`] backend.
///
/// Implemented by the capture producer. All three methods are called from
/// the backend's real-time thread and must not block, allocate, or perform
/// I/O.
pub trait InputHandler: Send {
    /// One hardware period of planar audio, one slice per channel, all the
    /// same length. `now` is the wall-clock time of delivery.
    fn process(&mut self, now: Timestamp, channels: &[&[f32]]);

    /// The audio server reported a scheduling overrun of `usecs`.
    fn xrun(&mut self, usecs: u64);

    /// The audio server is shutting down. Signals the drain loop to stop;
    /// performs no cleanup itself.
    fn shutdown(&mut self);
}

/// A connection to a real-time audio server.
///
/// Implemented by platform backends (e.g. the cpal member crate). The
/// handler passed to `start` fires on a dedicated audio thread at fixed,
/// short intervals; keep processing minimal.
pub trait AudioInput: Send {
    /// Sample rate of the delivered audio, fixed for the connection.
    fn sample_rate(&self) -> u32;

    /// Number of channels this input delivers (1 or 2).
    fn channels(&self) -> u16;

    /// Begin delivering audio to `handler`.
    fn start(&mut self, handler: Box<dyn InputHandler>) -> Result<(), ArchiveError>;

    /// Stop delivering audio and release the connection.
    fn stop(&mut self) -> Result<(), ArchiveError>;
}

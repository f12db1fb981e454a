pub mod producer;
pub mod ring_buffer;
pub mod slot;

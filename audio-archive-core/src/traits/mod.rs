pub mod audio_input;

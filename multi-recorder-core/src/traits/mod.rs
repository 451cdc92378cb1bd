pub mod audio_engine;
pub mod audio_hardware;
pub mod session_delegate;

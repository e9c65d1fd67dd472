use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No microphone found. Please check your system audio settings.")]
    NoMicrophoneFound,

    #[error("No audio output device found.")]
    NoOutputDevice,

    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    #[error("Failed to start audio stream: {0}")]
    StreamStartFailed(String),

    #[error("Audio device thread stopped unexpectedly")]
    DeviceThreadLost,

    #[error("Failed to resample audio: {0}")]
    ResampleFailed(String),

    #[error("Chunk is {actual} Hz but playback runs at {expected} Hz")]
    RateMismatch { expected: u32, actual: u32 },
}

pub mod capture;
pub mod codec;
pub mod error;
pub mod frame;
pub mod playback;
pub mod resampler;
pub mod spectrum;

pub use error::AudioError;
pub use frame::AudioFrame;

pub mod device;
pub mod framer;
pub mod queue;

use crate::audio::AudioError;

pub use device::CpalMicrophone;
pub use framer::{FrameAssembler, FrameConsumer, FrameGate};
pub use queue::FrameQueue;

/// Exclusive microphone handle owned by one live session.
pub trait Microphone: Send {
    /// Open the device. Frames are discarded until someone subscribes.
    fn acquire(&mut self) -> Result<(), AudioError>;

    /// Install the per-frame consumer. Frames arrive in capture order.
    fn subscribe(&mut self, consumer: FrameConsumer);

    /// Stop delivery and release the device. Safe to call repeatedly.
    fn release(&mut self);
}

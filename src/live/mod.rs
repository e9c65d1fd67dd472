pub mod driver;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod transcript;
pub mod transport;

pub use driver::{CallCommand, CallIo, drive};
pub use protocol::{OutboundMessage, ServerEvent, SessionSetup};
pub use session::{LiveSession, SessionConfig, SessionState, SessionUpdate};
pub use transcript::{TranscriptBuffer, TranscriptSync, TranslationOutcome, Translator};
pub use transport::{GeminiConnector, LiveChannel, LiveConnector};

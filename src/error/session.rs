use thiserror::Error;

use crate::live::session::SessionState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    Permission(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("audio output failed: {0}")]
    Output(String),
    #[error("cannot {op} while session is {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
}

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("pcm payload has odd byte length {0}")]
    OddLength(usize),
    #[error("invalid base64 payload: {0}")]
    Base64(String),
}

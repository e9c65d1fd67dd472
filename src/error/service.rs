use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid base url: {0}")]
    Url(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no api key found, set {0} in the environment or .env")]
    MissingApiKey(String),
    #[error("input text is empty")]
    EmptyInput,
    #[error("response contained no {0}")]
    EmptyResponse(&'static str),
}

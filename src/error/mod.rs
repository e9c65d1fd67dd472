pub mod format;
pub mod service;
pub mod session;

// Optional prelude for convenient imports
pub mod prelude {
    pub use super::format::FormatError;
    pub use super::service::ServiceError;
    pub use super::session::SessionError;
}

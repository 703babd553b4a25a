//! Error types.
//!
//! Two kinds of failure, kept apart:
//!
//! - [`Error`] — infrastructure: binding a port, accepting a connection.
//!   Returned from [`Server`](crate::Server) methods.
//! - [`HttpError`] — a handler deciding a request cannot be served. It *is*
//!   a response: return `Result<impl IntoResponse, HttpError>` from a handler
//!   and use `?` freely.

use std::fmt;

use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// The error type returned by kairo's fallible server operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// A request-level failure carrying the status to answer with.
///
/// Renders as a `text/plain` body containing `message`.
#[derive(Debug)]
pub struct HttpError {
    status: Status,
    message: String,
}

impl HttpError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, message)
    }

    pub fn not_found() -> Self {
        Self::new(Status::NotFound, "not found")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, message)
    }

    pub fn status(&self) -> Status { self.status }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.code(), self.message)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        Response::builder().status(self.status).text(self.message)
    }
}

impl From<std::io::Error> for HttpError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(),
            _ => Self::internal(e.to_string()),
        }
    }
}

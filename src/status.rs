//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted: `Response::status()`,
//! `Response::builder().status()`, [`HttpError::new`](crate::HttpError::new),
//! or as a bare handler return value.
//!
//! ```rust
//! use kairo::{Response, Status};
//!
//! Response::status(Status::NoContent);
//!
//! Response::builder()
//!     .status(Status::Created)
//!     .header("location", "/users/42")
//!     .json(br#"{"id":42}"#.to_vec());
//!
//! async fn delete_user(_req: kairo::Request) -> Status {
//!     Status::NoContent
//! }
//! ```
//!
//! Only the codes a small API service actually answers with are listed.
//! Anything more exotic goes through [`Status::Other`].

use http::StatusCode;

/// Equality is by numeric code, so `Status::Other(404) == Status::NotFound`.
#[derive(Clone, Copy, Debug)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201
    Accepted,            // 202
    NoContent,           // 204

    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MovedPermanently,    // 301
    Found,               // 302
    SeeOther,            // 303
    NotModified,         // 304

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    MethodNotAllowed,    // 405
    RequestTimeout,      // 408
    Conflict,            // 409
    PayloadTooLarge,     // 413
    UnsupportedMediaType, // 415
    UnprocessableContent, // 422
    TooManyRequests,     // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    NotImplemented,      // 501
    BadGateway,          // 502
    ServiceUnavailable,  // 503
    GatewayTimeout,      // 504

    /// Any other code. Values outside `100..=999` become `500` on the wire.
    Other(u16),
}

impl Status {
    pub fn code(self) -> u16 {
        self.into()
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::Accepted             => 202,
            Status::NoContent            => 204,
            Status::MovedPermanently     => 301,
            Status::Found                => 302,
            Status::SeeOther             => 303,
            Status::NotModified          => 304,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::Forbidden            => 403,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::RequestTimeout       => 408,
            Status::Conflict             => 409,
            Status::PayloadTooLarge      => 413,
            Status::UnsupportedMediaType => 415,
            Status::UnprocessableContent => 422,
            Status::TooManyRequests      => 429,
            Status::InternalServerError  => 500,
            Status::NotImplemented       => 501,
            Status::BadGateway           => 502,
            Status::ServiceUnavailable   => 503,
            Status::GatewayTimeout       => 504,
            Status::Other(code)          => code,
        }
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for Status {}

impl From<Status> for StatusCode {
    fn from(s: Status) -> StatusCode {
        StatusCode::from_u16(s.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

//! # kairo
//!
//! A small HTTP framework for Rust services behind a reverse proxy, with
//! first-class support for background work that dies with its request.
//!
//! ## What's in the box
//!
//! - Radix-tree routing — O(path-length) lookup via [`matchit`]
//! - Async I/O — tokio + hyper, HTTP/1.1 and HTTP/2
//! - Middleware at root, group and route level: [`middleware::trace`],
//!   [`middleware::recover`], [`middleware::basic_auth`],
//!   [`middleware::extend`]
//! - Explicit binding and validation: [`QueryBinder`], [`Rules`],
//!   [`Request::json`]
//! - Urlencoded and multipart forms, cookies, static files, error pages
//! - Request body limits and per-request deadlines
//! - [`CancellableTask`] — race background work against the request's
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kairo::{CancellableTask, Outcome, Request, Response, Router, Server, Status};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .get("/slow", slow);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn slow(req: Request) -> Response {
//!     let outcome = CancellableTask::new(|n: u64, _cancel: CancellationToken| async move {
//!         Ok::<_, std::io::Error>(n * 2)
//!     })
//!     .run(21, req.cancellation())
//!     .await;
//!
//!     match outcome {
//!         Outcome::Completed(Ok(v)) => Response::text(v.to_string()),
//!         Outcome::Completed(Err(_)) => Response::status(Status::InternalServerError),
//!         Outcome::Cancelled => Response::status(Status::ServiceUnavailable),
//!     }
//! }
//! ```

mod bind;
mod cancel;
mod cookie;
mod error;
mod form;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;
mod validate;

pub mod fs;
pub mod middleware;

pub use bind::{BindError, FieldError, FromParam, QueryBinder, Timestamp};
pub use cancel::{BlockingTask, CancellableTask, Failure, Outcome};
pub use cookie::{Cookie, SameSite};
pub use error::{Error, HttpError};
pub use form::{Form, FormFile};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use middleware::{Middleware, Next};
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Group, Router, Service};
pub use server::{Config, DEFAULT_MAX_BODY_SIZE, Server};
pub use status::Status;
pub use validate::{Rules, ValidationErrors, Violation};

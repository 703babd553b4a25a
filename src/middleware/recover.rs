use tokio::task::JoinHandle;
use tracing::{Instrument, error};

use super::Next;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Turns a panic anywhere further down the chain into `500`.
///
/// The rest of the chain runs as its own task; a panic surfaces as a
/// `JoinError` instead of tearing down the connection. If the client goes
/// away the task is aborted along with the request. The task stays inside
/// the caller's span, so events from handlers keep the request context
/// that [`trace`](super::trace) opened.
pub async fn recover(req: Request, next: Next) -> Response {
    let path = req.path().to_owned();
    let mut task = AbortOnDrop(tokio::spawn(next.run(req).in_current_span()));

    match (&mut task.0).await {
        Ok(res) => res,
        Err(e) if e.is_panic() => {
            error!(path = %path, "handler panicked: {}", panic_message(e.into_panic()));
            Response::status(Status::InternalServerError)
        }
        Err(e) => {
            error!(path = %path, "handler task failed: {e}");
            Response::status(Status::InternalServerError)
        }
    }
}

struct AbortOnDrop(JoinHandle<Response>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic>".to_owned()
    }
}

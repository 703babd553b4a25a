use std::time::Instant;

use tracing::{Instrument, info, info_span};

use super::Next;
use crate::request::Request;
use crate::response::Response;

/// Per-request span with method and path; logs status and latency on the
/// way out.
///
/// Register it first with [`Router::layer`](crate::Router::layer) so the
/// span covers everything after it, unmatched routes included.
pub async fn trace(req: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        method = %req.method(),
        path = %req.path(),
        peer = req.remote_addr().map(tracing::field::display),
    );

    async move {
        let started = Instant::now();
        let res = next.run(req).await;
        info!(
            status = res.status_code().code(),
            latency_us = started.elapsed().as_micros() as u64,
            "request completed",
        );
        res
    }
    .instrument(span)
    .await
}

//! Route handlers and the object-safe form the router stores them in.
//!
//! Application code only ever sees [`Handler`]: any
//! `async fn(Request) -> impl IntoResponse` is one, and so is a struct that
//! implements the trait by hand when a handler needs its own state.
//!
//! Inside the crate every handler, middleware layer and the route table
//! itself is an [`Endpoint`]: something that turns a [`Request`] into a
//! boxed future of [`Response`]. Middleware composes endpoints, the router
//! dispatches to them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Something that answers a request.
///
/// ```rust
/// use kairo::{Handler, Request, Router};
///
/// struct Motd(&'static str);
///
/// impl Handler for Motd {
///     type Output = &'static str;
///     type Future = std::future::Ready<&'static str>;
///
///     fn call(&self, _req: Request) -> Self::Future {
///         std::future::ready(self.0)
///     }
/// }
///
/// let app = Router::new().get("/motd", Motd("be kind"));
/// ```
pub trait Handler: Send + Sync + 'static {
    type Output: IntoResponse;
    type Future: Future<Output = Self::Output> + Send + 'static;

    fn call(&self, req: Request) -> Self::Future;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    type Output = Fut::Output;
    type Future = Fut;

    fn call(&self, req: Request) -> Fut {
        self(req)
    }
}

/// Uniform, object-safe request-to-response step.
pub(crate) trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

pub(crate) type BoxedHandler = Arc<dyn Endpoint>;

struct Erased<H>(H);

impl<H: Handler> Endpoint for Erased<H> {
    fn call(&self, req: Request) -> BoxFuture {
        let fut = Handler::call(&self.0, req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Erases a handler's concrete type so it can sit in a route tree.
pub(crate) fn boxed(handler: impl Handler) -> BoxedHandler {
    Arc::new(Erased(handler))
}

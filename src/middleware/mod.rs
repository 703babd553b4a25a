//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the
//! response on its way back. It is the right place for cross-cutting
//! concerns: tracing, panic recovery, authentication, and attaching
//! request-scoped capabilities.
//!
//! Any function with this shape is middleware:
//!
//! ```text
//! async fn name(req: Request, next: Next) -> impl IntoResponse
//! ```
//!
//! Three places to attach it:
//!
//! | Scope | How | Runs for |
//! |---|---|---|
//! | root | [`Router::layer`](crate::Router::layer) | every request, unmatched ones included |
//! | group | `layer` inside [`Router::group`](crate::Router::group) | routes under the group prefix |
//! | route | [`Router::route_with`](crate::Router::route_with) | one route |
//!
//! Within a scope, the first layer registered is the outermost.
//!
//! Built-ins: [`trace`], [`recover`], [`basic_auth`], [`extend`].

mod auth;
mod recover;
mod trace;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Endpoint};
use crate::request::Request;
use crate::response::IntoResponse;

pub use auth::basic_auth;
pub use recover::recover;
pub use trace::trace;

/// Implemented for every middleware function; see the module docs.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of the chain. Call [`Next::run`] to pass the request on, or
/// drop it to answer without reaching the handler.
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    pub fn run(self, req: Request) -> BoxFuture {
        self.inner.call(req)
    }
}

/// Inserts a clone of `value` into every request's extensions.
///
/// This is how a handler gets extra capabilities without the request type
/// changing: middleware attaches them, the handler asks for them by type.
///
/// ```rust,no_run
/// use kairo::{Request, Router, middleware};
///
/// #[derive(Clone)]
/// struct Greeter;
/// impl Greeter { fn hello(&self) -> &'static str { "hello" } }
///
/// async fn greet(req: Request) -> &'static str {
///     req.extension::<Greeter>().map_or("no greeter", Greeter::hello)
/// }
///
/// let app = Router::new()
///     .layer(middleware::extend(Greeter))
///     .get("/greet", greet);
/// ```
pub fn extend<T>(value: T) -> impl Middleware
where
    T: Clone + Send + Sync + 'static,
{
    move |mut req: Request, next: Next| {
        req.extensions_mut().insert(value.clone());
        next.run(req)
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// One middleware in front of the rest of the chain.
struct Layered {
    middleware: BoxedMiddleware,
    inner: BoxedHandler,
}

impl Endpoint for Layered {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Next { inner: Arc::clone(&self.inner) };
        self.middleware.handle(req, next)
    }
}

/// Wraps `handler` so that `layers[0]` runs first.
pub(crate) fn wrap(handler: BoxedHandler, layers: &[BoxedMiddleware]) -> BoxedHandler {
    layers.iter().rev().fold(handler, |inner, middleware| {
        Arc::new(Layered { middleware: Arc::clone(middleware), inner })
    })
}

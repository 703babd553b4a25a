//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`]. Routes
//! are inserted as they are registered, so a bad pattern panics at startup,
//! not on the first request.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::fs;
use crate::handler::{self, BoxFuture, BoxedHandler, Endpoint, Handler};
use crate::method::Method;
use crate::middleware::{self, BoxedMiddleware, Middleware};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
///
/// ```rust,no_run
/// use kairo::{Request, Router, middleware};
///
/// # async fn get_user(_: Request) -> &'static str { "" }
/// # async fn create_user(_: Request) -> &'static str { "" }
/// # async fn dashboard(_: Request) -> &'static str { "" }
/// let app = Router::new()
///     .layer(middleware::trace)
///     .layer(middleware::recover)
///     .get("/users/{id}", get_user)
///     .post("/users", create_user)
///     .group("/admin", |g| {
///         g.layer(middleware::basic_auth(|u, p| u == "joe" && p == "secret"))
///             .get("/", dashboard)
///     })
///     .static_dir("/static", "assets");
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Vec<BoxedMiddleware>,
    on_error: Option<ErrorHook>,
}

type ErrorHook = Arc<dyn Fn(Response) -> BoxFuture + Send + Sync>;

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), layers: Vec::new(), on_error: None }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax, a trailing `{*rest}` captures
    /// the remainder. `req.param("name")` retrieves them.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler::boxed(handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Register a handler with middleware that runs for this route only.
    pub fn route_with(
        self,
        method: Method,
        path: &str,
        handler: impl Handler,
        middleware: impl Middleware,
    ) -> Self {
        let layers: [BoxedMiddleware; 1] = [Arc::new(middleware)];
        self.add(method, path, middleware::wrap(handler::boxed(handler), &layers))
    }

    /// Root-level middleware. Wraps every request, including those that end
    /// in `404` or `405`, regardless of when routes were registered.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Registers routes under a shared prefix with their own middleware.
    ///
    /// Group layers wrap every route of the group, whether the route was
    /// added before or after the layer.
    pub fn group(mut self, prefix: &str, build: impl FnOnce(Group) -> Group) -> Self {
        let group = build(Group { prefix: prefix.trim_end_matches('/').to_owned(), ..Group::default() });
        for (method, path, handler) in group.routes {
            let handler = middleware::wrap(handler, &group.layers);
            self = self.add(method, &path, handler);
        }
        self
    }

    /// Serves files below `dir` at `prefix/*`. The bare prefix, with or
    /// without a trailing slash, serves `dir/index.html`.
    pub fn static_dir(mut self, prefix: &str, dir: impl Into<PathBuf>) -> Self {
        let root: Arc<PathBuf> = Arc::new(dir.into());
        let base = prefix.trim_end_matches('/');
        let serve = move |req: Request| {
            let root = Arc::clone(&root);
            let relative = req.param("path").unwrap_or_default().to_owned();
            async move { fs::dir_response(&root, &relative).await }
        };

        if !base.is_empty() {
            self = self.get(base, serve.clone());
        }
        self.get(&format!("{base}/"), serve.clone())
            .get(&format!("{base}/{{*path}}"), serve)
    }

    /// Serves one file at `path`.
    pub fn file(self, path: &str, file: impl Into<PathBuf>) -> Self {
        let file: Arc<PathBuf> = Arc::new(file.into());
        self.get(path, move |_req: Request| {
            let file = Arc::clone(&file);
            async move { fs::file_response(&file).await }
        })
    }

    /// Hands every response with a `4xx` or `5xx` status to `hook` before
    /// it is written, whichever layer produced it. The hook sees the whole
    /// response and returns the one to send; [`fs::error_pages`] renders
    /// `{code}.html` pages this way.
    ///
    /// ```rust,no_run
    /// use kairo::{Router, fs};
    ///
    /// let app = Router::new().on_error(fs::error_pages("public"));
    /// ```
    pub fn on_error<F, Fut, R>(mut self, hook: F) -> Self
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.on_error = Some(Arc::new(move |res: Response| -> BoxFuture {
            let fut = hook(res);
            Box::pin(async move { fut.await.into_response() })
        }));
        self
    }

    /// Freezes the router into the callable form the server dispatches to.
    pub fn into_service(self) -> Service {
        let table: BoxedHandler = Arc::new(RouteTable { routes: self.routes });
        Service { root: middleware::wrap(table, &self.layers), on_error: self.on_error }
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Routes sharing a prefix and middleware; built inside [`Router::group`].
#[derive(Default)]
pub struct Group {
    prefix: String,
    routes: Vec<(Method, String, BoxedHandler)>,
    layers: Vec<BoxedMiddleware>,
}

impl Group {
    /// `path` is relative to the group prefix; `"/"` or `""` is the prefix itself.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let full = match path.trim_start_matches('/') {
            "" if self.prefix.is_empty() => "/".to_owned(),
            "" => self.prefix.clone(),
            rest => format!("{}/{rest}", self.prefix),
        };
        self.routes.push((method, full, handler::boxed(handler)));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// A frozen [`Router`] with its root middleware applied. Cheap to clone.
#[derive(Clone)]
pub struct Service {
    root: BoxedHandler,
    on_error: Option<ErrorHook>,
}

impl Service {
    /// Runs one request through middleware, routing and the error hook.
    pub async fn call(&self, req: Request) -> Response {
        let res = self.root.call(req).await;
        match &self.on_error {
            Some(hook) if res.status_code().code() >= 400 => hook(res).await,
            _ => res,
        }
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

struct RouteTable {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    NotAllowed(String),
    NotFound,
}

impl RouteTable {
    fn lookup(&self, method: Method, path: &str) -> Lookup {
        if let Some(found) = self.find(method, path) {
            return found;
        }
        // HEAD falls back to GET; hyper drops the body on the way out.
        if method == Method::Head {
            if let Some(found) = self.find(Method::Get, path) {
                return found;
            }
        }

        let routed = |m: &Method| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok());
        let allowed: Vec<&str> = Method::ALL
            .into_iter()
            .filter(|m| routed(m) || (*m == Method::Head && routed(&Method::Get)))
            .map(Method::as_str)
            .collect();
        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::NotAllowed(allowed.join(", "))
        }
    }

    fn find(&self, method: Method, path: &str) -> Option<Lookup> {
        let matched = self.routes.get(&method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Lookup::Found(Arc::clone(matched.value), params))
    }
}

impl Endpoint for RouteTable {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Lookup::Found(handler, params) => {
                req.params = params;
                handler.call(req)
            }
            Lookup::NotAllowed(allow) => Box::pin(async move {
                Response::builder()
                    .status(Status::MethodNotAllowed)
                    .header("allow", &allow)
                    .no_body()
            }),
            Lookup::NotFound => Box::pin(async { Response::status(Status::NotFound) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(req: Request) -> String {
        req.param("id").unwrap_or("none").to_owned()
    }

    async fn hello(_req: Request) -> &'static str {
        "Hello, World"
    }

    async fn call(service: &Service, method: Method, uri: &str) -> Response {
        service.call(Request::builder(method, uri).build()).await
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let app = Router::new().get("/hello", hello).get("/users/{id}", user).into_service();

        assert_eq!(call(&app, Method::Get, "/hello").await.body(), b"Hello, World");
        assert_eq!(call(&app, Method::Get, "/users/42").await.body(), b"42");
        assert_eq!(call(&app, Method::Get, "/nope").await.status_code(), Status::NotFound);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let app = Router::new().get("/hello", hello).put("/hello", hello).into_service();

        let res = call(&app, Method::Post, "/hello").await;
        assert_eq!(res.status_code(), Status::MethodNotAllowed);
        assert_eq!(res.header("allow"), Some("GET, HEAD, PUT"));
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let app = Router::new().get("/hello", hello).into_service();
        assert_eq!(call(&app, Method::Head, "/hello").await.status_code(), Status::Ok);
    }

    #[tokio::test]
    async fn group_prefix_and_layers() {
        let deny = |_req: Request, _next: middleware::Next| async { Status::Forbidden };
        let app = Router::new()
            .get("/open", hello)
            .group("/admin/", |g| g.get("/", hello).get("/users/{id}", user).layer(deny))
            .into_service();

        assert_eq!(call(&app, Method::Get, "/open").await.status_code(), Status::Ok);
        assert_eq!(call(&app, Method::Get, "/admin").await.status_code(), Status::Forbidden);
        assert_eq!(call(&app, Method::Get, "/admin/users/1").await.status_code(), Status::Forbidden);
    }

    #[tokio::test]
    async fn root_layers_see_unmatched_requests() {
        let tag = |req: Request, next: middleware::Next| async move {
            let mut res = next.run(req).await;
            res.headers.push(("x-seen".to_owned(), "1".to_owned()));
            res
        };
        let app = Router::new().layer(tag).into_service();

        let res = call(&app, Method::Get, "/missing").await;
        assert_eq!(res.status_code(), Status::NotFound);
        assert_eq!(res.header("x-seen"), Some("1"));
    }

    #[tokio::test]
    async fn route_level_middleware_only_wraps_its_route() {
        let tag = |req: Request, next: middleware::Next| async move {
            let mut res = next.run(req).await;
            res.headers.push(("x-tracked".to_owned(), "1".to_owned()));
            res
        };
        let app = Router::new()
            .route_with(Method::Get, "/users", hello, tag)
            .get("/hello", hello)
            .into_service();

        assert_eq!(call(&app, Method::Get, "/users").await.header("x-tracked"), Some("1"));
        assert_eq!(call(&app, Method::Get, "/hello").await.header("x-tracked"), None);
    }

    #[tokio::test]
    async fn head_is_listed_in_allow_when_get_is_routed() {
        let app = Router::new().get("/hello", hello).into_service();
        let res = call(&app, Method::Delete, "/hello").await;
        assert_eq!(res.header("allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn static_dir_serves_its_index_at_the_bare_prefix() {
        let dir = std::env::temp_dir().join(format!("kairo-static-{}", std::process::id()));
        tokio::fs::create_dir_all(dir.join("css")).await.unwrap();
        tokio::fs::write(dir.join("index.html"), "<h1>home</h1>").await.unwrap();
        tokio::fs::write(dir.join("css/site.css"), "body{}").await.unwrap();

        let app = Router::new().static_dir("/static", &dir).into_service();
        for uri in ["/static", "/static/", "/static/index.html"] {
            let res = call(&app, Method::Get, uri).await;
            assert_eq!(res.status_code(), Status::Ok, "{uri}");
            assert_eq!(res.body(), b"<h1>home</h1>", "{uri}");
        }
        let res = call(&app, Method::Get, "/static/css/site.css").await;
        assert_eq!(res.header("content-type"), Some("text/css"));
        let res = call(&app, Method::Get, "/static/../Cargo.toml").await;
        assert_eq!(res.status_code(), Status::NotFound);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn error_hook_sees_failures_from_every_layer() {
        let deny = |_req: Request, _next: middleware::Next| async { Status::Forbidden };
        let app = Router::new()
            .get("/hello", hello)
            .group("/admin", |g| g.layer(deny).get("/", hello))
            .on_error(|res: Response| async move {
                Response::builder()
                    .status(res.status_code())
                    .text(format!("error page for {}", res.status_code().code()))
            })
            .into_service();

        assert_eq!(call(&app, Method::Get, "/hello").await.body(), b"Hello, World");
        assert_eq!(call(&app, Method::Get, "/missing").await.body(), b"error page for 404");
        let res = call(&app, Method::Get, "/admin").await;
        assert_eq!(res.status_code(), Status::Forbidden);
        assert_eq!(res.body(), b"error page for 403");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic_at_registration() {
        let _ = Router::new().get("/users/{id}", user).get("/users/{id}", user);
    }
}

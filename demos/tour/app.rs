//! Routes of the tour, kept apart from `main` so they can be exercised
//! without a listener.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use kairo::{
    CancellableTask, Cookie, HttpError, IntoResponse, Json, Method, Next, Outcome, QueryBinder,
    Request, Response, Router, Rules, Status, Timestamp, fs, middleware,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Filesystem locations the routes read from and write to.
pub struct Settings {
    pub assets: PathBuf,
    pub index: PathBuf,
    pub uploads: PathBuf,
    pub error_pages: PathBuf,
}

pub fn app(settings: &Settings) -> Router {
    let uploads = Arc::new(settings.uploads.clone());

    Router::new()
        // Root level: trace first so its span covers everything below.
        .layer(middleware::trace)
        .layer(middleware::recover)
        .layer(middleware::extend(Greeter))
        .get("/hello", hello)
        .get("/users/{id}", get_user)
        .route_with(Method::Get, "/users", list_users, track)
        .post("/users", save_user)
        .post("/validate-users", validate_user)
        .get("/show", show)
        .get("/query-param", query_param)
        .post("/save", move |req: Request| save(req, Arc::clone(&uploads)))
        .post("/form", form_value)
        .get("/api/search", search)
        .get("/context", context)
        .get("/parallel_context", parallel_context)
        .get("/write_cookie", write_cookie)
        .get("/read_cookie", read_cookie)
        .get("/read_all_cookie", read_all_cookies)
        .get("/timestamp", timestamp)
        .get("/logger", logger)
        .group("/admin", |g| {
            g.layer(middleware::basic_auth(|user, pass| user == "joe" && pass == "secret"))
                .get("/", admin)
        })
        .static_dir("/static", settings.assets.clone())
        .file("/", settings.index.clone())
        .on_error(fs::error_pages(settings.error_pages.clone()))
}

// ── Plain routes ──────────────────────────────────────────────────────────────

async fn hello(_req: Request) -> &'static str {
    "Hello, World"
}

async fn get_user(req: Request) -> String {
    req.param("id").unwrap_or_default().to_owned()
}

async fn list_users(_req: Request) -> &'static str {
    "/users"
}

async fn show(req: Request) -> String {
    let team = req.query("team").unwrap_or_default();
    let member = req.query("member").unwrap_or_default();
    format!("team:{team}, member:{member}")
}

async fn query_param(req: Request) -> String {
    req.query("name").unwrap_or_default().to_owned()
}

async fn form_value(req: Request) -> String {
    req.form_value("name").await.unwrap_or_default()
}

/// Stores the uploaded `avatar` under its own file name in the uploads
/// directory. Only the last path component of that name is used.
async fn save(req: Request, uploads: Arc<PathBuf>) -> Result<Response, HttpError> {
    let name = req.form_value("name").await.unwrap_or_default();
    let avatar = req.form_file("avatar").await?;

    let file_name = Path::new(avatar.file_name())
        .file_name()
        .ok_or_else(|| HttpError::bad_request("avatar has no usable file name"))?;
    let dest = uploads.join(file_name);
    tokio::fs::write(&dest, avatar.data()).await?;
    info!(path = %dest.display(), bytes = avatar.data().len(), "avatar saved");

    Ok(Response::html(format!("<b>Thank you! {}</b>", escape_html(&name))))
}

async fn logger(_req: Request) -> &'static str {
    info!("logger func is called");
    "logger!"
}

async fn admin(_req: Request) -> &'static str {
    "admin area"
}

// Route-level middleware for GET /users.
async fn track(req: Request, next: Next) -> Response {
    info!("request to /users");
    next.run(req).await
}

// ── JSON binding and validation ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

/// What leaves the service. Fields the client must not set are filled here,
/// never bound from the request.
#[derive(Debug, Serialize)]
struct UserDto {
    name: String,
    email: String,
    is_admin: bool,
}

static USER_RULES: LazyLock<Rules<User>> = LazyLock::new(|| {
    Rules::<User>::new()
        .required("name", |u| u.name.as_str())
        .required("email", |u| u.email.as_str())
        .email("email", |u| u.email.as_str())
});

async fn save_user(req: Request) -> Result<Json<UserDto>, HttpError> {
    let u: User = req.json().map_err(|_| HttpError::bad_request("bad request"))?;
    Ok(Json(UserDto { name: u.name, email: u.email, is_admin: false }))
}

async fn validate_user(req: Request) -> Result<Json<UserDto>, HttpError> {
    let u: User = req.json()?;
    USER_RULES.validate(&u)?;
    Ok(Json(UserDto { name: u.name, email: u.email, is_admin: false }))
}

// ── Query binding ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SearchOpts {
    ids: Vec<i64>,
    active: bool,
    length: i64,
}

async fn search(req: Request) -> Result<Json<SearchOpts>, HttpError> {
    let mut opts = SearchOpts { ids: Vec::new(), active: false, length: 50 };
    QueryBinder::new(&req)
        .int64("length", &mut opts.length)
        .int64s("ids", &mut opts.ids)
        .bool("active", &mut opts.active)
        .finish()?;
    Ok(Json(opts))
}

#[derive(Debug, Serialize)]
struct Stamped {
    timestamp: Timestamp,
}

async fn timestamp(req: Request) -> Result<Json<Stamped>, HttpError> {
    let mut ts = Timestamp(Utc::now().fixed_offset());
    QueryBinder::new(&req).required("timestamp", &mut ts).finish()?;
    Ok(Json(Stamped { timestamp: ts }))
}

// ── Request extensions ────────────────────────────────────────────────────────

/// Attached to every request by root middleware.
#[derive(Clone)]
struct Greeter;

impl Greeter {
    fn greet(&self, path: &str) {
        info!(path, "greeter says hello");
    }

    fn wave(&self, path: &str) {
        info!(path, "greeter waves");
    }
}

async fn context(req: Request) -> Result<&'static str, HttpError> {
    let greeter = req
        .extension::<Greeter>()
        .ok_or_else(|| HttpError::internal("greeter missing"))?;
    greeter.greet(req.path());
    greeter.wave(req.path());
    Ok("OK")
}

// ── Background work ───────────────────────────────────────────────────────────

/// Runs a small piece of work off the request task. `delay_ms` makes it
/// slow enough to watch the request deadline win the race.
async fn parallel_context(req: Request) -> Result<Response, HttpError> {
    let mut delay_ms = 0_u64;
    QueryBinder::new(&req).param("delay_ms", &mut delay_ms).finish()?;

    let outcome = CancellableTask::new(|method: Method, cancel: CancellationToken| async move {
        info!(%method, "background work running");
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
        Ok::<_, Infallible>("Hay!")
    })
    .label("parallel_context")
    .run(req.method(), req.cancellation())
    .await;

    Ok(match outcome {
        Outcome::Completed(Ok(result)) => Response::text(format!("Result: {result}")),
        Outcome::Completed(Err(e)) => HttpError::internal(e.to_string()).into_response(),
        Outcome::Cancelled => Response::builder()
            .status(Status::ServiceUnavailable)
            .text("request cancelled"),
    })
}

// ── Cookies ───────────────────────────────────────────────────────────────────

async fn write_cookie(_req: Request) -> Response {
    let cookie = Cookie::new("username", "jon").expires(Utc::now() + chrono::Duration::hours(24));
    Response::builder().cookie(cookie).text("write a cookie")
}

async fn read_cookie(req: Request) -> Result<&'static str, HttpError> {
    let cookie = req
        .cookie("username")
        .ok_or_else(|| HttpError::bad_request("cookie `username` not set"))?;
    info!(name = cookie.name(), value = cookie.value(), "read cookie");
    Ok("read a cookie")
}

async fn read_all_cookies(req: Request) -> &'static str {
    for cookie in req.cookies() {
        info!(name = cookie.name(), value = cookie.value(), "cookie");
    }
    "read all the cookies"
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

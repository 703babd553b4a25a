use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// HTTP Basic authentication.
///
/// `validator` receives the decoded username and password. A missing or
/// malformed `Authorization` header, or a `false` from the validator, is
/// answered with `401` and a `www-authenticate` challenge.
///
/// ```rust,no_run
/// use kairo::{Router, middleware};
///
/// # async fn dashboard(_: kairo::Request) -> &'static str { "" }
/// let app = Router::new().group("/admin", |g| {
///     g.layer(middleware::basic_auth(|user, pass| user == "joe" && pass == "secret"))
///         .get("/", dashboard)
/// });
/// ```
pub fn basic_auth<V>(validator: V) -> impl Middleware
where
    V: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    move |req: Request, next: Next| -> BoxFuture {
        let authorised = credentials(&req).is_some_and(|(user, pass)| validator(&user, &pass));
        if authorised {
            next.run(req)
        } else {
            debug!(path = %req.path(), "basic auth rejected");
            Box::pin(async { challenge() })
        }
    }
}

fn credentials(req: &Request) -> Option<(String, String)> {
    let value = req.header("authorization")?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}

fn challenge() -> Response {
    Response::builder()
        .status(Status::Unauthorized)
        .header("www-authenticate", r#"basic realm="Restricted""#)
        .no_body()
}

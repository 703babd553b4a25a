//! Static file responses and file-backed error pages.
//!
//! Good enough for a handful of assets next to an API. Anything serious
//! belongs to the reverse proxy in front of kairo.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::error::HttpError;
use crate::handler::BoxFuture;
use crate::response::{ContentType, Response};

/// Reads `path` and answers with its bytes and a content type guessed from
/// the extension. A missing file is `404`.
pub async fn file_response(path: &Path) -> Result<Response, HttpError> {
    let body = tokio::fs::read(path).await.map_err(|e| {
        debug!(path = %path.display(), error = %e, "static file unavailable");
        HttpError::from(e)
    })?;
    let content_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(ContentType::OctetStream, ContentType::from_extension);
    Ok(Response::builder().bytes(content_type, body))
}

/// Serves `relative` from inside `root`.
///
/// Only plain path components are accepted: `..`, absolute paths and
/// drive prefixes are answered with `404` without touching the disk. An
/// empty path or a directory serves its `index.html`.
pub async fn dir_response(root: &Path, relative: &str) -> Result<Response, HttpError> {
    let mut path = resolve(root, relative).ok_or_else(HttpError::not_found)?;
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        path.push("index.html");
    }
    file_response(&path).await
}

/// Error hook for [`Router::on_error`](crate::Router::on_error).
///
/// Logs every failed request, then answers with `dir/{code}.html` when that
/// page exists. Status and headers such as `allow` or `www-authenticate`
/// are kept; only the body and its content type change. Without a page the
/// response goes out untouched.
pub fn error_pages(dir: impl Into<PathBuf>) -> impl Fn(Response) -> BoxFuture + Send + Sync + 'static {
    let dir = Arc::new(dir.into());
    move |mut res: Response| -> BoxFuture {
        let dir = Arc::clone(&dir);
        Box::pin(async move {
            let code = res.status_code().code();
            let detail = String::from_utf8_lossy(res.body()).into_owned();
            if code >= 500 {
                error!(status = code, detail = %detail, "request failed");
            } else {
                warn!(status = code, detail = %detail, "request rejected");
            }

            let page = dir.join(format!("{code}.html"));
            match tokio::fs::read(&page).await {
                Ok(html) => res.replace_body(ContentType::Html, Bytes::from(html)),
                Err(e) => debug!(page = %page.display(), error = %e, "no error page"),
            }
            res
        })
    }
}

fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    #[test]
    fn rejects_escaping_paths() {
        let root = Path::new("/srv/assets");
        assert_eq!(resolve(root, "css/site.css"), Some(PathBuf::from("/srv/assets/css/site.css")));
        assert_eq!(resolve(root, "/logo.png"), Some(PathBuf::from("/srv/assets/logo.png")));
        assert_eq!(resolve(root, "../etc/passwd"), None);
        assert_eq!(resolve(root, "a/../../b"), None);
    }

    #[tokio::test]
    async fn serves_files_with_guessed_type() {
        let dir = std::env::temp_dir().join(format!("kairo-fs-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("index.html"), "<h1>hi</h1>").await.unwrap();

        let res = dir_response(&dir, "").await.unwrap();
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(res.body(), b"<h1>hi</h1>");

        let err = dir_response(&dir, "missing.txt").await.unwrap_err();
        assert_eq!(err.status(), Status::NotFound);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn error_pages_swap_the_body_and_keep_headers() {
        let dir = std::env::temp_dir().join(format!("kairo-pages-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("401.html"), "<h1>who are you?</h1>").await.unwrap();
        let render = error_pages(&dir);

        let denied = Response::builder()
            .status(Status::Unauthorized)
            .header("www-authenticate", "basic realm=\"Restricted\"")
            .text("unauthorized");
        let res = render(denied).await;
        assert_eq!(res.status_code(), Status::Unauthorized);
        assert_eq!(res.body(), b"<h1>who are you?</h1>");
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(res.header("www-authenticate"), Some("basic realm=\"Restricted\""));

        // No 500.html on disk: the original response passes through.
        let res = render(Response::builder().status(Status::InternalServerError).text("boom")).await;
        assert_eq!(res.body(), b"boom");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}

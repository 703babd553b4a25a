//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Uri};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::cookie::{self, Cookie};
use crate::error::HttpError;
use crate::form::{self, Form, FormFile};
use crate::method::Method;
use crate::status::Status;

/// An incoming HTTP request with its body fully buffered.
///
/// Besides the usual accessors, every request carries:
///
/// - a [`CancellationToken`] that fires when the client goes away, the
///   response has been produced, or the configured request timeout expires;
/// - typed **extensions**, the place middleware hangs request-scoped
///   capabilities for handlers to pick up with [`Request::extension`].
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) extensions: Extensions,
    pub(crate) cancel: CancellationToken,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        cancel: CancellationToken,
    ) -> Self {
        let query = uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method,
            uri,
            headers,
            body,
            params: HashMap::new(),
            query,
            extensions: Extensions::new(),
            cancel,
            remote_addr: None,
        }
    }

    /// Starts building a request by hand, e.g. to unit-test a handler.
    ///
    /// ```rust
    /// use kairo::{Method, Request};
    ///
    /// let req = Request::builder(Method::Get, "/show?team=x-men&member=wolverine")
    ///     .header("cookie", "username=jon")
    ///     .build();
    /// assert_eq!(req.query("member"), Some("wolverine"));
    /// ```
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First value of a query-string parameter, percent-decoded.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query-string parameter, in order.
    pub fn query_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Decodes the body as a form, urlencoded or multipart.
    ///
    /// `415` for any other content type, `400` for a malformed multipart body.
    pub async fn form(&self) -> Result<Form, HttpError> {
        if self.has_content_type("application/x-www-form-urlencoded") {
            return Ok(form::parse_urlencoded(&self.body));
        }
        match self.header("content-type") {
            Some(ct) if self.has_content_type("multipart/form-data") => {
                form::parse_multipart(ct, self.body.clone()).await
            }
            _ => Err(HttpError::new(Status::UnsupportedMediaType, "expected a form body")),
        }
    }

    /// A text field from the form body, falling back to the query string
    /// when the body is not a form or has no such field.
    pub async fn form_value(&self, key: &str) -> Option<String> {
        if let Ok(form) = self.form().await {
            if let Some(value) = form.value(key) {
                return Some(value.to_owned());
            }
        }
        self.query(key).map(str::to_owned)
    }

    /// The file uploaded under `key` in a multipart body. `400` if absent.
    pub async fn form_file(&self, key: &str) -> Result<FormFile, HttpError> {
        self.form()
            .await?
            .into_file(key)
            .ok_or_else(|| HttpError::bad_request(format!("missing file `{key}`")))
    }

    /// The named cookie, if the client sent it.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|c| c.name() == name)
    }

    /// Every cookie across all `Cookie:` headers.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(cookie::parse_header)
            .collect()
    }

    /// Deserialises a JSON body.
    ///
    /// `415` if the content type is not JSON, `400` if the body does not
    /// parse into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        if !self.has_content_type("application/json") {
            return Err(HttpError::new(
                Status::UnsupportedMediaType,
                "expected content-type application/json",
            ));
        }
        serde_json::from_slice(&self.body).map_err(|e| HttpError::bad_request(e.to_string()))
    }

    /// Cancellation signal tied to this request's lifetime.
    ///
    /// Hand it to [`CancellableTask::run`](crate::CancellableTask::run) so
    /// background work is abandoned when the client disconnects.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A typed request-scoped value inserted by middleware.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    fn has_content_type(&self, expected: &str) -> bool {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(expected))
    }
}

/// Hand-built [`Request`]; obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    cancel: CancellationToken,
}

impl RequestBuilder {
    /// Adds a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a path parameter as the router would have.
    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Finishes the request. An unparsable URI becomes `/`.
    pub fn build(self) -> Request {
        let uri = self.uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        let mut req = Request::new(self.method, uri, self.headers, self.body, self.cancel);
        req.params = self.params;
        req
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct User {
        name: String,
    }

    #[test]
    fn query_values_are_decoded_and_repeatable() {
        let req = Request::builder(Method::Get, "/api/search?ids=1&ids=2&name=a%20b").build();
        assert_eq!(req.query("name"), Some("a b"));
        assert_eq!(req.query_all("ids").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(req.query("missing"), None);
    }

    #[tokio::test]
    async fn form_value_prefers_body_then_query() {
        let req = Request::builder(Method::Post, "/form?name=from-query&extra=q")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=Joe+Smith")
            .build();
        assert_eq!(req.form_value("name").await.as_deref(), Some("Joe Smith"));
        assert_eq!(req.form_value("extra").await.as_deref(), Some("q"));
    }

    #[tokio::test]
    async fn multipart_fields_and_files() {
        let req = Request::builder(Method::Post, "/save")
            .header("content-type", "multipart/form-data; boundary=b0undary")
            .body(
                "--b0undary\r\n\
                 Content-Disposition: form-data; name=\"name\"\r\n\r\n\
                 Joe\r\n\
                 --b0undary\r\n\
                 Content-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\n\r\n\
                 hi\r\n\
                 --b0undary--\r\n",
            )
            .build();

        assert_eq!(req.form_value("name").await.as_deref(), Some("Joe"));
        let avatar = req.form_file("avatar").await.unwrap();
        assert_eq!(avatar.file_name(), "a.txt");
        assert_eq!(avatar.data().as_ref(), b"hi");
        assert_eq!(req.form_file("resume").await.unwrap_err().status(), Status::BadRequest);
    }

    #[tokio::test]
    async fn form_rejects_other_content_types() {
        let req = Request::builder(Method::Post, "/form").body("{}").build();
        assert_eq!(req.form().await.unwrap_err().status(), Status::UnsupportedMediaType);
    }

    #[test]
    fn cookies_from_multiple_headers() {
        let req = Request::builder(Method::Get, "/")
            .header("cookie", "a=1; b=2")
            .header("cookie", "c=3")
            .build();
        assert_eq!(req.cookies().len(), 3);
        assert_eq!(req.cookie("c").map(|c| c.value().to_owned()).as_deref(), Some("3"));
        assert!(req.cookie("username").is_none());
    }

    #[test]
    fn json_requires_content_type() {
        let req = Request::builder(Method::Post, "/users").body(r#"{"name":"jon"}"#).build();
        let err = req.json::<User>().unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedMediaType);

        let req = Request::builder(Method::Post, "/users")
            .header("content-type", "application/json; charset=utf-8")
            .body(r#"{"name":"jon"}"#)
            .build();
        assert_eq!(req.json::<User>().unwrap().name, "jon");
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let req = Request::builder(Method::Post, "/users")
            .header("content-type", "application/json")
            .body("{nope")
            .build();
        assert_eq!(req.json::<User>().unwrap_err().status(), Status::BadRequest);
    }

    #[test]
    fn extensions_are_typed() {
        #[derive(Clone)]
        struct Tenant(&'static str);

        let mut req = Request::builder(Method::Get, "/").build();
        assert!(req.extension::<Tenant>().is_none());
        req.extensions_mut().insert(Tenant("acme"));
        assert_eq!(req.extension::<Tenant>().map(|t| t.0), Some("acme"));
    }
}

//! Typed binding of query-string values.
//!
//! Binding is spelled out per field instead of derived from attributes:
//!
//! ```rust
//! use kairo::{Method, QueryBinder, Request};
//!
//! let req = Request::builder(Method::Get, "/api/search?ids=1,2&ids=3&active=true").build();
//!
//! let mut length = 50_i64; // kept when the parameter is absent
//! let mut ids = Vec::new();
//! let mut active = false;
//!
//! QueryBinder::new(&req)
//!     .int64("length", &mut length)
//!     .int64s("ids", &mut ids)
//!     .bool("active", &mut active)
//!     .finish()
//!     .unwrap();
//!
//! assert_eq!((length, ids, active), (50, vec![1, 2, 3], true));
//! ```
//!
//! Every field is attempted; [`QueryBinder::finish`] reports all failures at
//! once.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

use crate::error::HttpError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

// ── FromParam ─────────────────────────────────────────────────────────────────

/// Parses one textual parameter value.
pub trait FromParam: Sized {
    fn from_param(value: &str) -> Result<Self, String>;
}

macro_rules! from_param_via_from_str {
    ($($ty:ty),* $(,)?) => {$(
        impl FromParam for $ty {
            fn from_param(value: &str) -> Result<Self, String> {
                value.trim().parse().map_err(|e| format!("{e}"))
            }
        }
    )*};
}

from_param_via_from_str!(i32, i64, u32, u64, usize, f64);

impl FromParam for String {
    fn from_param(value: &str) -> Result<Self, String> {
        Ok(value.to_owned())
    }
}

/// Accepts `1 t T true TRUE True` and `0 f F false FALSE False`.
impl FromParam for bool {
    fn from_param(value: &str) -> Result<Self, String> {
        match value.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            other => Err(format!("`{other}` is not a boolean")),
        }
    }
}

/// An RFC 3339 timestamp, serialised back in the same format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl FromParam for Timestamp {
    fn from_param(value: &str) -> Result<Self, String> {
        DateTime::parse_from_rfc3339(value.trim())
            .map(Timestamp)
            .map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.to_rfc3339())
    }
}

// ── QueryBinder ───────────────────────────────────────────────────────────────

/// Fluent binder over a request's query string.
///
/// A destination is only written when its parameter is present and valid,
/// so defaults set beforehand survive.
pub struct QueryBinder<'r> {
    req: &'r Request,
    errors: Vec<FieldError>,
}

impl<'r> QueryBinder<'r> {
    pub fn new(req: &'r Request) -> Self {
        Self { req, errors: Vec::new() }
    }

    /// Binds the first value of `name`.
    pub fn param<T: FromParam>(mut self, name: &str, dest: &mut T) -> Self {
        let req = self.req;
        if let Some(raw) = req.query(name) {
            match T::from_param(raw) {
                Ok(v) => *dest = v,
                Err(message) => self.errors.push(FieldError::new(name, raw, message)),
            }
        }
        self
    }

    /// Binds every value of `name`. Repeated parameters and comma-separated
    /// lists are both accepted, and may be mixed.
    pub fn values<T: FromParam>(mut self, name: &str, dest: &mut Vec<T>) -> Self {
        let mut bound = Vec::new();
        let mut seen = false;
        let req = self.req;
        for raw in req.query_all(name) {
            seen = true;
            for item in raw.split(',').filter(|s| !s.trim().is_empty()) {
                match T::from_param(item) {
                    Ok(v) => bound.push(v),
                    Err(message) => self.errors.push(FieldError::new(name, item, message)),
                }
            }
        }
        if seen {
            *dest = bound;
        }
        self
    }

    pub fn int64(self, name: &str, dest: &mut i64) -> Self {
        self.param(name, dest)
    }

    pub fn int64s(self, name: &str, dest: &mut Vec<i64>) -> Self {
        self.values(name, dest)
    }

    pub fn bool(self, name: &str, dest: &mut bool) -> Self {
        self.param(name, dest)
    }

    pub fn string(self, name: &str, dest: &mut String) -> Self {
        self.param(name, dest)
    }

    /// Fails if `name` is absent, then binds it like [`param`](Self::param).
    pub fn required<T: FromParam>(mut self, name: &str, dest: &mut T) -> Self {
        if self.req.query(name).is_none() {
            self.errors.push(FieldError::new(name, "", "required".to_owned()));
            return self;
        }
        self.param(name, dest)
    }

    pub fn finish(self) -> Result<(), BindError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BindError { fields: self.errors })
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// One parameter that failed to bind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, value: &str, message: String) -> Self {
        Self { field: field.to_owned(), value: value.to_owned(), message }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}: {}", self.field, self.value, self.message)
    }
}

/// Every failure from one [`QueryBinder`] run. Renders as `400`.
#[derive(Debug, thiserror::Error)]
#[error("binding failed: {}", join(.fields))]
pub struct BindError {
    pub fields: Vec<FieldError>,
}

fn join(fields: &[FieldError]) -> String {
    fields.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        HttpError::from(self).into_response()
    }
}

impl From<BindError> for HttpError {
    fn from(e: BindError) -> Self {
        HttpError::new(Status::BadRequest, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn req(uri: &str) -> Request {
        Request::builder(Method::Get, uri).build()
    }

    #[test]
    fn defaults_survive_absent_params() {
        let r = req("/api/search");
        let mut length = 50_i64;
        let mut ids = vec![9];
        QueryBinder::new(&r).int64("length", &mut length).int64s("ids", &mut ids).finish().unwrap();
        assert_eq!(length, 50);
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn collects_every_failure() {
        let r = req("/api/search?length=ten&ids=1,x,3&active=maybe");
        let mut length = 0_i64;
        let mut ids = Vec::new();
        let mut active = false;

        let err = QueryBinder::new(&r)
            .int64("length", &mut length)
            .int64s("ids", &mut ids)
            .bool("active", &mut active)
            .finish()
            .unwrap_err();

        let fields: Vec<_> = err.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["length", "ids", "active"]);
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(HttpError::from(err).status(), Status::BadRequest);
    }

    #[test]
    fn param_binds_any_from_param_type() {
        let r = req("/parallel_context?delay_ms=250&ratio=0.5&verbose=1");
        let (mut delay_ms, mut ratio, mut verbose) = (0_u64, 0.0_f64, false);
        QueryBinder::new(&r)
            .param("delay_ms", &mut delay_ms)
            .param("ratio", &mut ratio)
            .param("verbose", &mut verbose)
            .finish()
            .unwrap();
        assert_eq!((delay_ms, ratio, verbose), (250, 0.5, true));
    }

    #[test]
    fn required_reports_absence() {
        let r = req("/timestamp");
        let mut ts = String::new();
        let err = QueryBinder::new(&r).required("timestamp", &mut ts).finish().unwrap_err();
        assert_eq!(err.fields[0].message, "required");
    }

    #[test]
    fn timestamp_round_trips_rfc3339() {
        let ts = Timestamp::from_param("2026-10-18T09:15:00+09:00").unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), r#""2026-10-18T09:15:00+09:00""#);
        assert!(Timestamp::from_param("18/10/2026").is_err());
    }
}

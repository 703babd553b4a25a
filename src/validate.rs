//! Declarative validation rules.
//!
//! A [`Rules`] value lists `(field, rule, check)` triples for one type. Build
//! it once, keep it in a `static`, and run it against every bound value:
//!
//! ```rust
//! use std::sync::LazyLock;
//! use kairo::Rules;
//!
//! struct User { name: String, email: String }
//!
//! static USER_RULES: LazyLock<Rules<User>> = LazyLock::new(|| {
//!     Rules::<User>::new()
//!         .required("name", |u| u.name.as_str())
//!         .required("email", |u| u.email.as_str())
//!         .email("email", |u| u.email.as_str())
//! });
//!
//! let bad = User { name: "".into(), email: "jon@".into() };
//! let err = USER_RULES.validate(&bad).unwrap_err();
//! assert_eq!(err.violations().len(), 2);
//! ```

use std::fmt;

use crate::error::HttpError;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

type Check<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Validation rules for values of type `T`.
pub struct Rules<T> {
    checks: Vec<(&'static str, &'static str, Check<T>)>,
}

impl<T: 'static> Rules<T> {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// The field must contain something other than whitespace.
    pub fn required(self, field: &'static str, get: fn(&T) -> &str) -> Self {
        self.custom(field, "required", move |v| !get(v).trim().is_empty())
    }

    /// The field, when non-empty, must look like an e-mail address.
    /// Pair with [`required`](Self::required) to forbid empty values.
    pub fn email(self, field: &'static str, get: fn(&T) -> &str) -> Self {
        self.custom(field, "email", move |v| {
            let s = get(v);
            s.is_empty() || looks_like_email(s)
        })
    }

    /// Any predicate; `rule` names it in error messages.
    pub fn custom(
        mut self,
        field: &'static str,
        rule: &'static str,
        check: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.checks.push((field, rule, Box::new(check)));
        self
    }

    /// Runs every rule, in registration order, and reports every failure.
    pub fn validate(&self, value: &T) -> Result<(), ValidationErrors> {
        let violations: Vec<Violation> = self
            .checks
            .iter()
            .filter(|(_, _, check)| !check(value))
            .map(|&(field, rule, _)| Violation { field, rule })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(violations))
        }
    }
}

impl<T: 'static> Default for Rules<T> {
    fn default() -> Self { Self::new() }
}

fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// One failed rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Violation {
    pub field: &'static str,
    pub rule: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field `{}` failed rule `{}`", self.field, self.rule)
    }
}

/// All failures of one [`Rules::validate`] run. Renders as `400`.
#[derive(Debug, thiserror::Error)]
#[error("{}", join(.0))]
pub struct ValidationErrors(Vec<Violation>);

fn join(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }
}

impl From<ValidationErrors> for HttpError {
    fn from(e: ValidationErrors) -> Self {
        HttpError::new(Status::BadRequest, e.to_string())
    }
}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        HttpError::from(self).into_response()
    }
}

//! Error types for binding and dispatch.
//!
//! Two families live here:
//!
//! - [`BindError`] is what the engine itself produces: bad handler signatures,
//!   missing or unparseable values, malformed bodies, binder failures.
//! - [`ResponseError`] is the exportable error handlers and middlewares return
//!   when they want to control the status code and JSON shape of the response.
//!
//! Both implement [`ExportableError`], which is what the response writer looks
//! for when turning an error into a response body. Other exportable types reach
//! the writer wrapped in [`Exported`] or after [`register_exportable`].

use std::any::TypeId;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use http::StatusCode;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

/// Reason attached to required values that could not be read.
pub const REASON_VALUE_FAILED: &str = "value_failed";
/// Reason attached to values that were present but failed to parse.
pub const REASON_COERCION_FAILED: &str = "coercion_failed";
/// Reason attached to struct binding failures.
pub const REASON_BIND_FAILED: &str = "bind_failed";

/// Errors raised by the binding engine.
#[derive(Debug, Clone, Error)]
pub enum BindError {
    /// The registered callback is not something the engine can call.
    #[error("invalid handler type; expected callable got [ {kind} ]")]
    NotCallable { kind: &'static str },

    /// Callback parameters or return shape do not line up with the declared resolvers.
    #[error("invalid handler function; expected [ {expected} ] got [ {actual} ]")]
    SignatureMismatch { expected: String, actual: String },

    /// A route pattern could not be compiled.
    #[error("invalid route pattern [{pattern}]: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A required value is absent from its source.
    #[error("resolve value failed [{field}]")]
    Missing { field: String },

    /// A required key is absent from the request context store.
    #[error("unable to find context data: {key}")]
    ContextMissing { key: String },

    /// A value was present but could not be converted to the declared type.
    #[error("value coercion failed [{field}]: expected {kind}, got {value:?}")]
    Coercion {
        field: String,
        kind: &'static str,
        value: String,
    },

    /// The request body could not be decoded.
    #[error("failed to decode body: {0}")]
    BodyDecode(String),

    /// The request body exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The intermediate form could not be mapped onto the target type.
    #[error("{0}")]
    Bind(Arc<serde_json::Error>),
}

impl BindError {
    /// True for errors caused by how a route was registered rather than by the request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BindError::NotCallable { .. }
                | BindError::SignatureMismatch { .. }
                | BindError::InvalidPattern { .. }
        )
    }

    /// Field name carried by resolution and coercion errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            BindError::Missing { field } | BindError::Coercion { field, .. } => Some(field),
            BindError::ContextMissing { key } => Some(key),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BindError {
    fn from(err: serde_json::Error) -> Self {
        BindError::Bind(Arc::new(err))
    }
}

/// Errors that know which status code and JSON body they should produce.
pub trait ExportableError {
    /// Status code to write, `None` leaves the transport default in place.
    fn response_status(&self) -> Option<StatusCode>;

    /// JSON body to write. Always contains an `error` key.
    fn response_json(&self) -> Map<String, Value>;

    /// Emit a log record for this error. Called as a side effect of writing it.
    fn log(&self) {}
}

type DowncastFn = for<'a> fn(&'a anyhow::Error) -> Option<&'a dyn ExportableError>;

static EXPORTABLE_TYPES: Lazy<RwLock<Vec<(TypeId, DowncastFn)>>> =
    Lazy::new(|| RwLock::new(Vec::new()));

fn downcast_exportable<E>(err: &anyhow::Error) -> Option<&dyn ExportableError>
where
    E: ExportableError + fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    err.downcast_ref::<E>().map(|e| e as &dyn ExportableError)
}

/// Render `E` through its [`ExportableError`] impl wherever it reaches the
/// response writer as an `anyhow::Error`, e.g. as a callback's `Err` value.
///
/// Registering the same type twice is a no-op.
pub fn register_exportable<E>()
where
    E: ExportableError + fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    let mut types = EXPORTABLE_TYPES.write();
    if types.iter().all(|(id, _)| *id != TypeId::of::<E>()) {
        types.push((TypeId::of::<E>(), downcast_exportable::<E>));
    }
}

/// Exportable view of `err`: crate errors, [`Exported`] values, then registered types.
pub(crate) fn as_exportable(err: &anyhow::Error) -> Option<&dyn ExportableError> {
    if let Some(e) = err.downcast_ref::<ResponseError>() {
        return Some(e as &dyn ExportableError);
    }
    if let Some(e) = err.downcast_ref::<BindError>() {
        return Some(e as &dyn ExportableError);
    }
    if let Some(e) = err.downcast_ref::<Exported>() {
        return Some(e as &dyn ExportableError);
    }
    EXPORTABLE_TYPES.read().iter().find_map(|(_, downcast)| downcast(err))
}

trait ExportableStdError: ExportableError + std::error::Error + Send + Sync {}

impl<E: ExportableError + std::error::Error + Send + Sync> ExportableStdError for E {}

/// Any exportable error boxed so it survives conversion into `anyhow::Error`.
///
/// ```
/// use brrtbind::{Exported, ResponseError};
/// use http::StatusCode;
///
/// let err: anyhow::Error = Exported::new(ResponseError::new("gone").status(StatusCode::GONE)).into();
/// assert_eq!(err.to_string(), "gone");
/// ```
pub struct Exported(Box<dyn ExportableStdError>);

impl Exported {
    pub fn new<E>(err: E) -> Self
    where
        E: ExportableError + std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}

impl fmt::Debug for Exported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Exported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Exported {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl ExportableError for Exported {
    fn response_status(&self) -> Option<StatusCode> {
        self.0.response_status()
    }

    fn response_json(&self) -> Map<String, Value> {
        self.0.response_json()
    }

    fn log(&self) {
        self.0.log()
    }
}

/// Exportable error with status, machine-readable code and reason.
///
/// ```
/// use brrtbind::ResponseError;
/// use http::StatusCode;
///
/// let err = ResponseError::new("auth token missing").status(StatusCode::FORBIDDEN);
/// assert_eq!(err.to_string(), "auth token missing");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseError {
    message: String,
    path: Option<String>,
    reason: Option<String>,
    status: Option<StatusCode>,
    code: Option<String>,
    server: bool,
    client_message: Option<String>,
    extras: Map<String, Value>,
}

impl ResponseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Machine-readable error code, exported as `code`.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Short reason, exported as `reason` and appended to the display message.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Request path or source location the error relates to. Logged, never exported.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Extra keys merged into the exported body.
    pub fn extras(mut self, extras: Map<String, Value>) -> Self {
        self.extras = extras;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Mark as a server error: status 500 and the real message is hidden from clients.
    pub fn server(mut self) -> Self {
        self.server = true;
        self.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
        self
    }

    pub fn client(mut self) -> Self {
        self.server = false;
        self
    }

    /// Message exported instead of the real one for server errors.
    pub fn client_message(mut self, message: impl Into<String>) -> Self {
        self.client_message = Some(message.into());
        self
    }

    /// Record the caller's source location as the error path.
    #[track_caller]
    pub fn caller(self) -> Self {
        let location = Location::caller();
        self.path(format!("{}:{}", location.file(), location.line()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    /// Body as it would be exported for a client error.
    pub fn as_json(&self) -> Map<String, Value> {
        let mut res = Map::new();
        res.insert("error".to_string(), Value::String(self.message.clone()));
        if let Some(code) = &self.code {
            res.insert("code".to_string(), Value::String(code.clone()));
        }
        if let Some(reason) = &self.reason {
            res.insert("reason".to_string(), Value::String(reason.clone()));
        }
        for (k, v) in &self.extras {
            res.insert(k.clone(), v.clone());
        }
        res
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.message, reason),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ResponseError {}

impl ExportableError for ResponseError {
    fn response_status(&self) -> Option<StatusCode> {
        self.status
    }

    fn response_json(&self) -> Map<String, Value> {
        let mut res = self.as_json();
        if self.server {
            let message = match (&self.client_message, self.status) {
                (Some(m), _) => m.clone(),
                (None, Some(status)) => status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
                (None, None) => "Unknown error".to_string(),
            };
            res.insert("error".to_string(), Value::String(message));
        }
        res
    }

    fn log(&self) {
        if self.server {
            error!(
                path = self.path.as_deref().unwrap_or(""),
                reason = self.reason.as_deref().unwrap_or(""),
                code = self.code.as_deref().unwrap_or(""),
                status = self.status.map(|s| s.as_u16()).unwrap_or(0),
                "{}",
                self.message
            );
        } else {
            debug!(
                status = self.status.map(|s| s.as_u16()).unwrap_or(0),
                "{}", self
            );
        }
    }
}

impl From<&BindError> for ResponseError {
    fn from(err: &BindError) -> Self {
        let base = ResponseError::new(err.to_string());
        match err {
            BindError::NotCallable { .. }
            | BindError::SignatureMismatch { .. }
            | BindError::InvalidPattern { .. } => base.code("invalid_handler").server(),
            BindError::Missing { .. } => base
                .reason(REASON_VALUE_FAILED)
                .status(StatusCode::BAD_REQUEST),
            BindError::ContextMissing { .. } => base.reason(REASON_VALUE_FAILED).server(),
            BindError::Coercion { field, .. } => base
                .reason(REASON_COERCION_FAILED)
                .extra("field", field.as_str())
                .status(StatusCode::BAD_REQUEST),
            BindError::BodyDecode(_) => base.status(StatusCode::UNPROCESSABLE_ENTITY),
            BindError::BodyTooLarge { .. } => base.status(StatusCode::PAYLOAD_TOO_LARGE),
            BindError::Bind(_) => base
                .reason(REASON_BIND_FAILED)
                .status(StatusCode::BAD_REQUEST),
        }
    }
}

impl ExportableError for BindError {
    fn response_status(&self) -> Option<StatusCode> {
        ResponseError::from(self).response_status()
    }

    fn response_json(&self) -> Map<String, Value> {
        ResponseError::from(self).response_json()
    }

    fn log(&self) {
        ResponseError::from(self).log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_exports_message_code_reason_and_extras() {
        let err = ResponseError::new("bad thing")
            .code("E42")
            .reason("because")
            .extra("hint", "retry")
            .status(StatusCode::BAD_REQUEST);
        let json = err.response_json();
        assert_eq!(json["error"], "bad thing");
        assert_eq!(json["code"], "E42");
        assert_eq!(json["reason"], "because");
        assert_eq!(json["hint"], "retry");
        assert_eq!(err.response_status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "bad thing (because)");
    }

    #[test]
    fn test_server_error_hides_message() {
        let err = ResponseError::new("db password wrong").server();
        assert_eq!(err.response_json()["error"], "Internal Server Error");

        let err = ResponseError::new("db password wrong")
            .server()
            .client_message("try later");
        assert_eq!(err.response_json()["error"], "try later");
    }

    #[test]
    fn test_server_status_can_be_overridden() {
        let err = ResponseError::new("bad body")
            .server()
            .status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.response_status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(err.response_json()["error"], "Unprocessable Entity");
    }

    #[test]
    fn test_caller_records_location() {
        let err = ResponseError::new("x").caller();
        assert!(err.path.as_deref().unwrap_or("").contains("error.rs"));
    }

    #[test]
    fn test_coercion_error_exports_field() {
        let err = BindError::Coercion {
            field: "age".into(),
            kind: "integer",
            value: "abc".into(),
        };
        assert_eq!(err.field(), Some("age"));
        let json = err.response_json();
        assert_eq!(json["field"], "age");
        assert_eq!(json["reason"], REASON_COERCION_FAILED);
        assert_eq!(err.response_status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_configuration_errors_are_server_errors() {
        let err = BindError::NotCallable { kind: "u32" };
        assert!(err.is_configuration());
        assert_eq!(
            err.response_status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(err.response_json()["error"], "Internal Server Error");
    }

    #[test]
    fn test_body_decode_is_a_client_error() {
        let err = BindError::BodyDecode("expected value at line 1 column 2".into());
        assert!(!ResponseError::from(&err).is_server());
        assert_eq!(
            err.response_status(),
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(
            err.response_json()["error"],
            "failed to decode body: expected value at line 1 column 2"
        );
    }

    #[derive(Debug, Error)]
    #[error("out of stock")]
    struct OutOfStock;

    impl ExportableError for OutOfStock {
        fn response_status(&self) -> Option<StatusCode> {
            Some(StatusCode::CONFLICT)
        }

        fn response_json(&self) -> Map<String, Value> {
            let mut body = Map::new();
            body.insert("error".into(), Value::String("out of stock".into()));
            body.insert("code".into(), Value::String("E_STOCK".into()));
            body
        }
    }

    #[test]
    fn test_registered_type_is_exportable_through_anyhow() {
        let err = anyhow::Error::new(OutOfStock);
        register_exportable::<OutOfStock>();
        register_exportable::<OutOfStock>();
        let exported = as_exportable(&err).unwrap();
        assert_eq!(exported.response_status(), Some(StatusCode::CONFLICT));
        assert_eq!(exported.response_json()["code"], "E_STOCK");
        assert_eq!(
            EXPORTABLE_TYPES
                .read()
                .iter()
                .filter(|(id, _)| *id == TypeId::of::<OutOfStock>())
                .count(),
            1
        );
    }

    #[test]
    fn test_exported_wrapper_keeps_inner_shape() {
        let err: anyhow::Error = Exported::new(OutOfStock).into();
        let exported = as_exportable(&err).unwrap();
        assert_eq!(exported.response_status(), Some(StatusCode::CONFLICT));
        assert_eq!(err.to_string(), "out of stock");
    }

    #[test]
    fn test_plain_error_is_not_exportable() {
        assert!(as_exportable(&anyhow::anyhow!("plain")).is_none());
    }
}

use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::body::CONTENT_TYPE_JSON;
use crate::error::{as_exportable, BindError, ExportableError};
use crate::request::HeaderVec;

#[derive(Debug, Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderVec,
    body: Vec<u8>,
    written: bool,
}

/// Handle to the response being produced for one request.
///
/// Clones share the same underlying response, so a side-effecting handler that
/// received a writer through [`response_writer`](crate::value::response_writer) writes
/// into the response the transport will send.
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    inner: Arc<Mutex<ResponseState>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status code. Only the first call before any body write takes effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.inner.lock();
        if state.status.is_some() || state.written {
            debug!(status = status.as_u16(), "superfluous write_header ignored");
            return;
        }
        state.status = Some(status);
    }

    /// Add or replace a header
    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        let mut state = self.inner.lock();
        state.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        state
            .headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
    }

    /// Append a header value without removing existing ones.
    pub fn add_header(&self, name: &str, value: impl Into<String>) {
        self.inner
            .lock()
            .headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
    }

    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.inner.lock();
        state.body.extend_from_slice(bytes);
        state.written = true;
    }

    /// Status that will be sent; 200 when nothing set one explicitly.
    pub fn status(&self) -> StatusCode {
        self.inner.lock().status.unwrap_or(StatusCode::OK)
    }

    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.inner.lock().status
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn is_written(&self) -> bool {
        self.inner.lock().written
    }

    /// Snapshot of what has been written so far.
    pub fn finish(&self) -> Response {
        let state = self.inner.lock();
        Response {
            status: state.status.unwrap_or(StatusCode::OK),
            headers: state.headers.clone(),
            body: state.body.clone(),
        }
    }
}

/// Completed response handed back to the transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Response {
    /// Get a header by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serialize `data` as JSON into the writer with a JSON content type.
pub fn write_data<T: Serialize + ?Sized>(w: &ResponseWriter, data: &T) -> Result<(), BindError> {
    let bytes = serde_json::to_vec(data)?;
    w.set_header("content-type", CONTENT_TYPE_JSON);
    w.write(&bytes);
    Ok(())
}

/// Write `{"message": msg}`.
pub fn write_message(w: &ResponseWriter, msg: &str) -> Result<(), BindError> {
    write_data(w, &json!({ "message": msg }))
}

/// Write `{"error": err}` without touching the status.
pub fn write_error_message(w: &ResponseWriter, err: &str) -> Result<(), BindError> {
    write_data(w, &json!({ "error": err }))
}

/// Write an error that knows its status and shape, logging it first.
pub fn write_exportable(w: &ResponseWriter, err: &dyn ExportableError) -> Result<(), BindError> {
    err.log();
    if let Some(status) = err.response_status() {
        w.write_header(status);
    }
    write_data(w, &err.response_json())
}

/// Write any error as a response.
///
/// [`ResponseError`](crate::ResponseError), [`BindError`], [`Exported`](crate::Exported) and types
/// registered with [`register_exportable`](crate::register_exportable) render
/// their own status and body; anything else becomes `{"error": message}` with
/// the status left to the transport.
pub fn write_error(w: &ResponseWriter, err: &anyhow::Error) -> Result<(), BindError> {
    if let Some(e) = as_exportable(err) {
        return write_exportable(w, e);
    }
    warn!(error = %err, "[ERR] {err}");
    write_error_message(w, &err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseError;

    #[test]
    fn test_first_status_wins() {
        let w = ResponseWriter::new();
        w.write_header(StatusCode::FORBIDDEN);
        w.write_header(StatusCode::OK);
        assert_eq!(w.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_after_body_is_ignored() {
        let w = ResponseWriter::new();
        w.write(b"hi");
        w.write_header(StatusCode::NOT_FOUND);
        assert_eq!(w.status(), StatusCode::OK);
        assert_eq!(w.explicit_status(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let w = ResponseWriter::new();
        let clone = w.clone();
        write_message(&clone, "pong").unwrap();
        let res = w.finish();
        assert_eq!(res.header("Content-Type"), Some(CONTENT_TYPE_JSON));
        assert_eq!(res.json().unwrap(), json!({"message": "pong"}));
    }

    #[test]
    fn test_plain_error_keeps_default_status() {
        let w = ResponseWriter::new();
        write_error(&w, &anyhow::anyhow!("boom")).unwrap();
        let res = w.finish();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json().unwrap(), json!({"error": "boom"}));
    }

    #[test]
    fn test_response_error_sets_status() {
        let w = ResponseWriter::new();
        let err = anyhow::Error::new(
            ResponseError::new("auth token missing").status(StatusCode::FORBIDDEN),
        );
        write_error(&w, &err).unwrap();
        let res = w.finish();
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.json().unwrap(), json!({"error": "auth token missing"}));
    }

    #[test]
    fn test_bind_error_is_exported() {
        let w = ResponseWriter::new();
        let err = anyhow::Error::new(BindError::Missing {
            field: "name".into(),
        });
        write_error(&w, &err).unwrap();
        let res = w.finish();
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        let body = res.json().unwrap();
        assert_eq!(body["reason"], "value_failed");
    }
}

//! Request body preparation and access.
//!
//! Body preparation runs once per request (normally through the
//! [`PrepareBody`](crate::middleware::PrepareBody) middleware) and leaves the
//! payload in a form the resolvers can read without touching raw bytes again:
//!
//! - `multipart/form-data`: text fields become form values, file parts are skipped
//! - `application/x-www-form-urlencoded`: fields become form values
//! - `application/json` or no content type: the body is decoded once into a
//!   JSON object stored in the request's context store

use std::sync::Arc;

use http::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::BindError;
use crate::request::{find_param_folded, parse_urlencoded, ParamVec, Request};
use crate::value::Shape;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_URL_ENCODED: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// Methods whose requests carry a body.
pub fn has_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Parse the body of `req` according to its content type.
///
/// Requests without a body-carrying method are returned unchanged, as are
/// requests whose JSON body was already decoded. An empty JSON body attaches
/// nothing; a body that is not a JSON object is a [`BindError::BodyDecode`].
pub fn prepare_body(req: &Request, max_bytes: usize) -> Result<Request, BindError> {
    if !has_body(&req.method) {
        return Ok(req.clone());
    }
    let raw = req.raw_body().unwrap_or_default();
    if raw.len() > max_bytes {
        return Err(BindError::BodyTooLarge { limit: max_bytes });
    }

    let content_type = req.content_type().unwrap_or_default();
    match content_type.as_str() {
        CONTENT_TYPE_MULTIPART => {
            let boundary = req
                .get_header("content-type")
                .and_then(multipart_boundary)
                .ok_or_else(|| BindError::BodyDecode("missing multipart boundary".into()))?;
            let form = parse_multipart(raw, &boundary)?;
            debug!(fields = form.len(), "multipart body prepared");
            Ok(req.with_form(form))
        }
        CONTENT_TYPE_URL_ENCODED => Ok(req.with_form(parse_urlencoded(raw))),
        CONTENT_TYPE_JSON | "" => {
            if req.context().body().is_some() || raw.iter().all(u8::is_ascii_whitespace) {
                return Ok(req.clone());
            }
            let data: Map<String, Value> =
                serde_json::from_slice(raw).map_err(|e| BindError::BodyDecode(e.to_string()))?;
            debug!(keys = data.len(), "json body prepared");
            Ok(req.with_context(req.context().with_body(data)))
        }
        _ => Ok(req.clone()),
    }
}

/// Decoded JSON body, if one was prepared.
pub fn body_json(req: &Request) -> Option<&Map<String, Value>> {
    req.context().body()
}

/// Read one key from the prepared body. Form values win over the JSON body.
pub fn body_value(req: &Request, key: &str) -> Option<Value> {
    if let Some(v) = req.get_form_value(key) {
        return Some(Value::String(v.to_string()));
    }
    body_json(req).and_then(|data| data.get(key).cloned())
}

/// Collect the values a record of `shape` is bound from.
///
/// A decoded JSON body is used whole. Form values are matched against the
/// record's field names, case-insensitively; a map target takes every field.
pub(crate) fn body_fields(
    req: &Request,
    shape: Shape,
    label: &str,
) -> Result<Map<String, Value>, BindError> {
    let missing = || BindError::Missing {
        field: label.to_string(),
    };
    if !has_body(&req.method) {
        return Err(missing());
    }
    if let Some(data) = body_json(req) {
        return Ok(data.clone());
    }
    let form = req.form().ok_or_else(missing)?;
    let values: Map<String, Value> = match shape {
        Shape::Map => form
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect(),
        _ => shape
            .fields()
            .iter()
            .filter_map(|f| {
                find_param_folded(form, f).map(|v| (f.to_string(), Value::String(v.to_string())))
            })
            .collect(),
    };
    if values.is_empty() {
        return Err(missing());
    }
    Ok(values)
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<ParamVec, BindError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut form = ParamVec::new();

    let Some(first) = find_bytes(body, delimiter) else {
        return Ok(form);
    };
    let mut rest = &body[first + delimiter.len()..];
    loop {
        if rest.starts_with(b"--") {
            break;
        }
        let after = rest.strip_prefix(b"\r\n".as_slice()).unwrap_or(rest);
        let (part, next) = match find_bytes(after, delimiter) {
            Some(end) => (&after[..end], Some(&after[end + delimiter.len()..])),
            None => (after, None),
        };
        if let Some((name, value)) = multipart_field(part)? {
            form.push((Arc::from(name.as_str()), value));
        }
        match next {
            Some(next) => rest = next,
            None => break,
        }
    }
    Ok(form)
}

/// Name and text of one part; `None` for file parts and parts without a name.
fn multipart_field(part: &[u8]) -> Result<Option<(String, String)>, BindError> {
    let split = find_bytes(part, b"\r\n\r\n")
        .ok_or_else(|| BindError::BodyDecode("malformed multipart part".into()))?;
    let head = std::str::from_utf8(&part[..split])
        .map_err(|_| BindError::BodyDecode("multipart part headers are not valid utf-8".into()))?;
    let Some(disposition) = head
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))
    else {
        return Ok(None);
    };
    if disposition_param(disposition, "filename").is_some() {
        return Ok(None);
    }
    let Some(name) = disposition_param(disposition, "name") else {
        return Ok(None);
    };
    let content = &part[split + 4..];
    let content = content.strip_suffix(b"\r\n".as_slice()).unwrap_or(content);
    Ok(Some((name, String::from_utf8_lossy(content).into_owned())))
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn disposition_param(line: &str, key: &str) -> Option<String> {
    line.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        (name.trim() == key).then(|| value.trim().trim_matches('"').to_string())
    })
}

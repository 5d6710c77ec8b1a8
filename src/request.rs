use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use crate::context::ContextStore;
use crate::ids::{RequestId, REQUEST_ID_HEADER};

/// Maximum number of path/query/form parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Maximum inline headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Name/value pairs for path, query and form parameters.
///
/// Names are `Arc<str>` because path parameter names come from the route table
/// and are cloned into every matching request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Header storage. Names are kept lowercase.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// One incoming request as seen by the binding engine.
///
/// The transport builds it; the router fills `path_params`; body preparation
/// fills the form values or the decoded JSON body. Everything that changes after
/// construction produces a new `Request` (see [`Request::with_context`]).
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    pub method: Method,
    /// Path without query string
    pub path: String,
    /// Path parameters filled by the router
    pub path_params: ParamVec,
    /// Query string parameters
    pub query_params: ParamVec,
    /// Headers, lowercase names
    pub headers: HeaderVec,
    body: Option<Arc<[u8]>>,
    form: Option<Arc<ParamVec>>,
    context: ContextStore,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// Build a request from a method and a URI path with optional query string.
    pub fn new(method: Method, uri: &str) -> Self {
        let path = uri.split('?').next().unwrap_or("/");
        Self {
            request_id: RequestId::new(),
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            path_params: ParamVec::new(),
            query_params: parse_query_params(uri),
            headers: HeaderVec::new(),
            body: None,
            form: None,
            context: ContextStore::new(),
        }
    }

    /// Add a header. An `x-request-id` header also replaces the request id when it parses.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == REQUEST_ID_HEADER {
            self.request_id = RequestId::from_header_or_new(Some(&value));
        }
        self.headers.push((Arc::from(name.as_str()), value));
        self
    }

    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_query_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query_params.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        self.body = Some(Arc::from(body));
        self
    }

    /// Serialize `data` as the body and set a JSON content type.
    pub fn with_json_body<T: serde::Serialize + ?Sized>(
        self,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(data)?;
        Ok(self
            .with_header("content-type", crate::body::CONTENT_TYPE_JSON)
            .with_body(bytes))
    }

    /// Derived request carrying `context` instead of the current store.
    pub fn with_context(&self, context: ContextStore) -> Self {
        let mut req = self.clone();
        req.context = context;
        req
    }

    pub(crate) fn with_form(&self, form: ParamVec) -> Self {
        let mut req = self.clone();
        req.form = Some(Arc::new(form));
        req
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn raw_body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Form values parsed from an url-encoded or multipart body.
    pub fn form(&self) -> Option<&ParamVec> {
        self.form.as_deref()
    }

    /// Get a path parameter by name. Last write wins on duplicates.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        find_param(&self.path_params, name)
    }

    /// Get a query parameter by name. Last write wins on duplicates (`?a=1&a=2` gives `2`).
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        find_param(&self.query_params, name)
    }

    #[must_use]
    pub fn has_query_param(&self, name: &str) -> bool {
        self.get_query_param(name).is_some()
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn get_form_value(&self, name: &str) -> Option<&str> {
        self.form().and_then(|f| find_param(f, name))
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.get_header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
    }
}

#[inline]
pub(crate) fn find_param<'a>(params: &'a ParamVec, name: &str) -> Option<&'a str> {
    params
        .iter()
        .rfind(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}

/// Case-insensitive variant of [`find_param`], exact matches first.
pub(crate) fn find_param_folded<'a>(params: &'a ParamVec, name: &str) -> Option<&'a str> {
    find_param(params, name).or_else(|| {
        params
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    })
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
pub fn parse_query_params(path: &str) -> ParamVec {
    match path.find('?') {
        Some(pos) => parse_urlencoded(path[pos + 1..].as_bytes()),
        None => ParamVec::new(),
    }
}

pub(crate) fn parse_urlencoded(input: &[u8]) -> ParamVec {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

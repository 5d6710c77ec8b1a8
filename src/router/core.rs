//! Route table and pattern matching.

use std::sync::Arc;

use http::{Method, StatusCode};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{BindError, ResponseError};
use crate::handler::Handler;
use crate::middleware::{run_chain, Middleware};
use crate::request::{ParamVec, Request};
use crate::response::{write_exportable, Response, ResponseWriter};

/// One registered route
struct Route {
    method: Option<Method>,
    pattern: String,
    regex: Regex,
    params: Vec<Arc<str>>,
    handler: Arc<Handler>,
}

impl Route {
    /// Extract percent-decoded path parameters when `path` matches this route.
    fn captures(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    caps.get(i + 1)
                        .map(|m| (Arc::clone(name), decode_segment(m.as_str())))
                })
                .collect(),
        )
    }
}

/// Routes `METHOD /path/{param}` patterns to handlers.
///
/// Routes are tried in registration order. Sub-routers mounted under a prefix
/// see the path with the prefix stripped and run their own middlewares after
/// the parent's.
///
/// ```
/// use brrtbind::{value, Handler, Request, Router};
/// use http::Method;
/// use serde_json::{json, Value};
///
/// fn hello(name: String) -> anyhow::Result<Value> {
///     Ok(json!({ "message": format!("Hello {name}!") }))
/// }
///
/// let mut router = Router::new();
/// router
///     .handle("GET /hello/{name}", Handler::new(value::from_path::<String>("name"), hello))
///     .unwrap();
/// let res = router.serve(Request::new(Method::GET, "/hello/John"));
/// assert_eq!(res.json().unwrap(), json!({"message": "Hello John!"}));
/// ```
#[derive(Default)]
pub struct Router {
    prefix: String,
    routes: Vec<Route>,
    middlewares: Vec<Arc<dyn Middleware>>,
    mounts: Vec<Router>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router meant to be mounted under `prefix`, e.g. `/auth`.
    pub fn sub_router(prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            prefix,
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Add a middleware run around every request this router dispatches.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Register `handler` for `pattern` (`"GET /users/{id}"`, or a bare path for any method).
    ///
    /// The handler is validated here, so a bad callback/value pairing is
    /// reported at startup rather than on the first request.
    pub fn handle(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, BindError> {
        let (method, path) = parse_pattern(pattern)?;
        handler.validate()?;
        let (regex, params) = path_to_regex(pattern, path)?;
        info!(
            pattern,
            prefix = %self.prefix,
            values = handler.resolvers().len(),
            "route registered"
        );
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            regex,
            params: params.into_iter().map(|p| Arc::from(p.as_str())).collect(),
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Attach `sub` under its prefix.
    pub fn mount(&mut self, sub: Router) -> Result<&mut Self, BindError> {
        if sub.prefix.is_empty() {
            return Err(BindError::InvalidPattern {
                pattern: String::new(),
                reason: "mounted router needs a prefix".to_string(),
            });
        }
        info!(prefix = %sub.prefix, routes = sub.routes.len(), "router mounted");
        self.mounts.push(sub);
        Ok(self)
    }

    /// Dispatch `req` and return the finished response.
    pub fn serve(&self, req: Request) -> Response {
        let res = ResponseWriter::new();
        self.serve_with(req, &res);
        res.finish()
    }

    /// Dispatch `req`, writing into `res`.
    pub fn serve_with(&self, req: Request, res: &ResponseWriter) {
        run_chain(&self.middlewares, req, res, |req, res| self.dispatch(req, res));
    }

    fn dispatch(&self, req: &Request, res: &ResponseWriter) {
        for mount in &self.mounts {
            if let Some(rest) = strip_prefix(&req.path, &mount.prefix) {
                let mut inner = req.clone();
                inner.path = rest;
                return mount.serve_with(inner, res);
            }
        }

        let mut allowed: Vec<&Method> = Vec::new();
        for route in &self.routes {
            let Some(params) = route.captures(&req.path) else {
                continue;
            };
            match &route.method {
                Some(m) if *m != req.method => allowed.push(m),
                _ => {
                    debug!(pattern = %route.pattern, path = %req.path, "route matched");
                    let mut req = req.clone();
                    req.path_params = params;
                    return route.handler.serve(&req, res);
                }
            }
        }

        let err = if allowed.is_empty() {
            ResponseError::new("not found")
                .status(StatusCode::NOT_FOUND)
                .path(req.path.as_str())
        } else {
            let allow: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            res.set_header("allow", allow.join(", "));
            ResponseError::new("method not allowed")
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .path(req.path.as_str())
        };
        if let Err(write_err) = write_exportable(res, &err) {
            tracing::error!(error = %write_err, "failed to write routing error");
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field(
                "routes",
                &self.routes.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(),
            )
            .field("middlewares", &self.middlewares.len())
            .field("mounts", &self.mounts)
            .finish()
    }
}

/// Percent-decode a captured segment; invalid UTF-8 after decoding keeps the raw text.
fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

fn parse_pattern(pattern: &str) -> Result<(Option<Method>, &str), BindError> {
    let invalid = |reason: &str| BindError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    let pattern_trimmed = pattern.trim();
    let (method, path) = match pattern_trimmed.split_once(' ') {
        Some((method, path)) => {
            let method = Method::from_bytes(method.as_bytes()).map_err(|_| invalid("bad method"))?;
            (Some(method), path.trim())
        }
        None => (None, pattern_trimmed),
    };
    if !path.starts_with('/') {
        return Err(invalid("path must start with '/'"));
    }
    Ok((method, path))
}

/// Compile a route path into an anchored regex plus its parameter names.
///
/// `{name}` matches one segment; a trailing `{name...}` matches the rest of the path.
pub(crate) fn path_to_regex(pattern: &str, path: &str) -> Result<(Regex, Vec<String>), BindError> {
    let invalid = |reason: String| BindError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };
    if path == "/" {
        return Regex::new(r"^/$")
            .map(|r| (r, Vec::new()))
            .map_err(|e| invalid(e.to_string()));
    }

    let mut source = String::with_capacity(path.len() + 5);
    source.push('^');
    let mut param_names = Vec::with_capacity(path.matches('{').count());
    let segments: Vec<&str> = path.split('/').collect();

    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with('{') && segment.ends_with('}') {
            let name = segment.trim_start_matches('{').trim_end_matches('}');
            if let Some(rest) = name.strip_suffix("...") {
                if i != segments.len() - 1 {
                    return Err(invalid("wildcard must be the last segment".to_string()));
                }
                source.push_str("/(.*)");
                param_names.push(rest.to_string());
            } else {
                source.push_str("/([^/]+)");
                param_names.push(name.to_string());
            }
        } else if !segment.is_empty() {
            source.push('/');
            source.push_str(&regex::escape(segment));
        }
    }
    if path.ends_with('/') {
        source.push('/');
    }
    source.push('$');

    if param_names.iter().any(|p| p.is_empty()) {
        return Err(invalid("empty parameter name".to_string()));
    }
    let compiled = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
    Ok((compiled, param_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(path: &str) -> (Regex, Vec<String>) {
        path_to_regex(path, path).unwrap()
    }

    #[test]
    fn test_path_to_regex_params() {
        let (re, params) = compile("/users/{id}/posts/{post_id}");
        assert_eq!(params, vec!["id", "post_id"]);
        let caps = re.captures("/users/7/posts/9").unwrap();
        assert_eq!(&caps[1], "7");
        assert_eq!(&caps[2], "9");
        assert!(!re.is_match("/users/7/posts"));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let (re, _) = compile("/v1.0/items");
        assert!(re.is_match("/v1.0/items"));
        assert!(!re.is_match("/v1x0/items"));
    }

    #[test]
    fn test_wildcard() {
        let (re, params) = compile("/files/{path...}");
        assert_eq!(params, vec!["path"]);
        assert_eq!(&re.captures("/files/a/b.txt").unwrap()[1], "a/b.txt");
        assert!(path_to_regex("/x/{p...}/y", "/x/{p...}/y").is_err());
    }

    #[test]
    fn test_captured_segments_are_percent_decoded() {
        assert_eq!(decode_segment("John%20Doe"), "John Doe");
        assert_eq!(decode_segment("a+b"), "a+b");
        assert_eq!(decode_segment("%FF"), "%FF");
    }

    #[test]
    fn test_root() {
        let (re, params) = compile("/");
        assert!(re.is_match("/"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_pattern() {
        let (m, p) = parse_pattern("POST /auth/login").unwrap();
        assert_eq!(m, Some(Method::POST));
        assert_eq!(p, "/auth/login");
        assert_eq!(parse_pattern("/ping").unwrap().0, None);
        assert!(parse_pattern("GET ping").is_err());
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("/auth/login", "/auth").as_deref(), Some("/login"));
        assert_eq!(strip_prefix("/auth", "/auth").as_deref(), Some("/"));
        assert_eq!(strip_prefix("/authx", "/auth"), None);
    }

    #[test]
    fn test_sub_router_prefix_is_normalized() {
        assert_eq!(Router::sub_router("auth/").prefix(), "/auth");
        assert_eq!(Router::sub_router("/api").prefix(), "/api");
    }
}

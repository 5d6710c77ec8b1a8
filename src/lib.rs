//! # brrtbind
//!
//! **brrtbind** lets a server expose endpoints as plain callbacks whose
//! arguments are filled in from the incoming request: URL path segments, the
//! query string, the body, headers, a per-request context map, or custom
//! extraction logic. Endpoints never parse the request themselves.
//!
//! ## Overview
//!
//! A [`Handler`] pairs one callback with an ordered list of declared values.
//! For every request the handler:
//!
//! 1. checks (once, then from cache) that the callback fits the declared values,
//! 2. resolves each value in declaration order, coercing wire data to the
//!    declared type, applying optional/required rules and per-value validation,
//! 3. calls the callback and writes its JSON result or its error.
//!
//! ## Architecture
//!
//! - **[`value`]** - declared values ([`TypedResolver`]), sources, shape probing and coercion
//! - **[`binder`]** - maps a flat key/value set onto a record type through serde
//! - **[`handler`]** - typed and runtime-checked callbacks, dispatch
//! - **[`context`]** - copy-on-write request context store
//! - **[`body`]** - body preparation (JSON, url-encoded and multipart forms)
//! - **[`middleware`]** - before/after hooks, body preparation, request logging
//! - **[`router`]** - `"METHOD /path/{param}"` routing and sub-router mounting
//! - **[`response`]** - response writer and JSON/error writers
//! - **[`runtime_config`]** / **[`logging`]** - configuration and `tracing` setup
//!
//! ### Dispatch Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant R as Router
//!     participant M as Middlewares
//!     participant H as Handler
//!     participant V as TypedResolver
//!     participant C as Callback
//!
//!     T->>R: serve(Request)
//!     R->>M: before(request)
//!     M-->>R: patched request (context, prepared body)
//!     R->>H: serve(request, writer)
//!     H->>H: validate() (memoized)
//!     loop each declared value
//!         H->>V: resolve(request, writer)
//!         V-->>H: value | error
//!     end
//!     H->>C: call(values...)
//!     C-->>H: Ok(data) | Err(error)
//!     H-->>T: JSON body / JSON error
//!     R->>M: after(request, writer, latency)
//! ```
//!
//! ## Example
//!
//! ```
//! use brrtbind::middleware::PrepareBody;
//! use brrtbind::{value, Handler, Request, Router};
//! use http::Method;
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Value};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Login {
//!     username: String,
//!     password: String,
//! }
//!
//! fn hello(name: String) -> anyhow::Result<Value> {
//!     Ok(json!({ "message": format!("Hello {name}!") }))
//! }
//!
//! fn login(body: Login) -> anyhow::Result<Value> {
//!     Ok(json!({ "user": body.username }))
//! }
//!
//! let mut auth = Router::sub_router("/auth");
//! auth.handle("POST /login", Handler::new(value::structure::<Login>(), login))
//!     .unwrap();
//!
//! let mut router = Router::new();
//! router
//!     .use_middleware(PrepareBody::default())
//!     .handle("GET /hello/{name}", Handler::new(value::from_path::<String>("name"), hello))
//!     .unwrap()
//!     .mount(auth)
//!     .unwrap();
//!
//! let res = router.serve(Request::new(Method::GET, "/hello/John"));
//! assert_eq!(res.json().unwrap(), json!({"message": "Hello John!"}));
//!
//! let req = Request::new(Method::POST, "/auth/login")
//!     .with_json_body(&json!({"username": "admin", "password": "pass"}))
//!     .unwrap();
//! assert_eq!(router.serve(req).json().unwrap(), json!({"user": "admin"}));
//! ```
//!
//! ## Logging
//!
//! Everything logs through `tracing`. Install a subscriber with
//! [`logging::init_logging`] or bring your own.

pub mod binder;
pub mod body;
pub mod context;
mod error;
pub mod handler;
mod ids;
pub mod logging;
pub mod middleware;
mod request;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod value;
mod values;

pub use binder::{bind, rebind};
pub use body::{has_body, prepare_body};
pub use context::{get_all_data, get_data, patch_map, patch_value, ContextStore};
pub use error::{
    register_exportable, BindError, ExportableError, Exported, ResponseError, REASON_BIND_FAILED,
    REASON_COERCION_FAILED, REASON_VALUE_FAILED,
};
pub use handler::{Args, DynamicCallback, FailHook, Handler, Output};
pub use ids::{RequestId, REQUEST_ID_HEADER};
pub use request::{parse_query_params, HeaderVec, ParamVec, Request};
pub use response::{
    write_data, write_error, write_error_message, write_message, Response, ResponseWriter,
};
pub use router::Router;
pub use runtime_config::RuntimeConfig;
pub use value::{Shape, TypeDescriptor, TypedResolver, ValueResolver, ValueSource};
pub use values::{values, values_as};

//! Handlers: one callback, its declared values and the dispatch around it.
//!
//! [`Handler::new`] pairs a typed callback with a tuple of declared values;
//! the pairing is checked by the compiler. [`Handler::dynamic`] accepts any
//! value plus a boxed list of declared values and checks the pairing at
//! runtime. Either way the validation result is computed once and cached.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::{BindError, ResponseError};
use crate::request::Request;
use crate::response::{write_data, write_error, ResponseWriter};
use crate::value::ValueResolver;

mod dynamic;
mod typed;

pub use dynamic::{Args, DynamicCallback};
pub use typed::{Callback, ResolverSet, SideEffect, Structured};

/// Return shape of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// `Result<R, E>`: the engine writes `R` as JSON or `E` as an error
    Structured,
    /// `()`: the callback writes its own response
    SideEffect,
}

/// Called when a declared value fails to resolve.
///
/// Returning `Ok(())` swallows the failure and the callback receives the
/// value's zero value; returning an error aborts dispatch with that error.
pub type FailHook =
    Arc<dyn Fn(&dyn ValueResolver, anyhow::Error) -> anyhow::Result<()> + Send + Sync>;

trait Endpoint: Send + Sync {
    fn validate(&self) -> Result<Output, BindError>;

    fn resolvers(&self) -> Vec<&dyn ValueResolver>;

    fn call(
        &self,
        req: &Request,
        res: &ResponseWriter,
        on_fail: Option<&FailHook>,
    ) -> anyhow::Result<Option<Value>>;
}

struct TypedEndpoint<Rs, F, M> {
    resolvers: Rs,
    callback: F,
    _marker: PhantomData<fn() -> M>,
}

impl<Rs, F, M> Endpoint for TypedEndpoint<Rs, F, M>
where
    Rs: ResolverSet,
    F: Callback<Rs::Args, M>,
    M: 'static,
{
    fn validate(&self) -> Result<Output, BindError> {
        Ok(F::OUTPUT)
    }

    fn resolvers(&self) -> Vec<&dyn ValueResolver> {
        self.resolvers.resolvers()
    }

    fn call(
        &self,
        req: &Request,
        res: &ResponseWriter,
        on_fail: Option<&FailHook>,
    ) -> anyhow::Result<Option<Value>> {
        let args = self.resolvers.resolve_all(req, res, on_fail)?;
        self.callback.invoke(args)
    }
}

struct DynamicEndpoint {
    callback: Result<DynamicCallback, BindError>,
    resolvers: Vec<Box<dyn ValueResolver>>,
}

impl Endpoint for DynamicEndpoint {
    fn validate(&self) -> Result<Output, BindError> {
        match &self.callback {
            Ok(cb) => cb.check(&self.resolvers),
            Err(err) => Err(err.clone()),
        }
    }

    fn resolvers(&self) -> Vec<&dyn ValueResolver> {
        self.resolvers.iter().map(|r| &**r as &dyn ValueResolver).collect()
    }

    fn call(
        &self,
        req: &Request,
        res: &ResponseWriter,
        on_fail: Option<&FailHook>,
    ) -> anyhow::Result<Option<Value>> {
        let cb = self.callback.as_ref().map_err(Clone::clone)?;
        let mut values = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            let value = match resolver.resolve_any(req, res) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        request_id = %req.request_id,
                        field = resolver.field(),
                        error = %err,
                        "resolve value failed"
                    );
                    match on_fail {
                        Some(hook) => {
                            hook(&**resolver, err)?;
                            resolver.zero()
                        }
                        None => return Err(err),
                    }
                }
            };
            values.push(value);
        }
        cb.invoke(Args::new(values))
    }
}

/// One endpoint: a callback plus the values it is called with.
///
/// ```
/// use brrtbind::{value, Handler, Request, ResponseWriter};
/// use http::Method;
/// use serde_json::{json, Value};
///
/// fn hello(name: String) -> anyhow::Result<Value> {
///     Ok(json!({ "message": format!("Hello {name}!") }))
/// }
///
/// let handler = Handler::new(value::from_path::<String>("name"), hello);
/// let req = Request::new(Method::GET, "/hello/John").with_path_param("name", "John");
/// let res = ResponseWriter::new();
/// handler.serve(&req, &res);
/// assert_eq!(res.finish().json().unwrap(), json!({"message": "Hello John!"}));
/// ```
pub struct Handler {
    endpoint: Box<dyn Endpoint>,
    on_fail: Option<FailHook>,
    validity: OnceCell<Result<Output, BindError>>,
}

impl Handler {
    /// Pair a typed callback with its declared values.
    ///
    /// `resolvers` is `()`, a single [`TypedResolver`](crate::TypedResolver) or
    /// a tuple of up to eight; the callback takes their value types in order.
    pub fn new<Rs, F, M>(resolvers: Rs, callback: F) -> Self
    where
        Rs: ResolverSet,
        F: Callback<Rs::Args, M>,
        M: 'static,
    {
        Self {
            endpoint: Box::new(TypedEndpoint {
                resolvers,
                callback,
                _marker: PhantomData,
            }),
            on_fail: None,
            validity: OnceCell::new(),
        }
    }

    /// Pair any value with a boxed list of declared values, checked at runtime.
    ///
    /// Only a [`DynamicCallback`] is callable; anything else makes the handler
    /// permanently invalid.
    pub fn dynamic<C: Any + Send>(callback: C, resolvers: Vec<Box<dyn ValueResolver>>) -> Self {
        Self {
            endpoint: Box::new(DynamicEndpoint {
                callback: dynamic::downcast_callback(callback),
                resolvers,
            }),
            on_fail: None,
            validity: OnceCell::new(),
        }
    }

    /// Filter value resolution failures. See [`FailHook`].
    pub fn on_fail<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn ValueResolver, anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_fail = Some(Arc::new(hook));
        self
    }

    /// Check the callback against its declared values. Computed once.
    pub fn validate(&self) -> Result<Output, BindError> {
        self.validity
            .get_or_init(|| {
                let result = self.endpoint.validate();
                if let Err(err) = &result {
                    error!(error = %err, "invalid handler");
                }
                result
            })
            .clone()
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Return shape of a valid handler.
    pub fn output(&self) -> Option<Output> {
        self.validate().ok()
    }

    pub fn resolvers(&self) -> Vec<&dyn ValueResolver> {
        self.endpoint.resolvers()
    }

    /// Resolve the declared values, call the callback and write the outcome.
    ///
    /// Every failure ends in a written error; the callback is never invoked
    /// when the handler is invalid or a value fails to resolve.
    pub fn serve(&self, req: &Request, res: &ResponseWriter) {
        let output = match self.validate() {
            Ok(output) => output,
            Err(err) => return self.fail(res, &anyhow::Error::new(err)),
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.endpoint.call(req, res, self.on_fail.as_ref())
        }));
        let result = match result {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ResponseError::new(format!("handler panicked: {message}"))
                    .path(req.path.as_str())
                    .server()
                    .into())
            }
        };

        match result {
            Ok(Some(value)) if output == Output::Structured => {
                if let Err(err) = write_data(res, &value) {
                    error!(request_id = %req.request_id, error = %err, "failed to write response");
                }
            }
            Ok(_) => {}
            Err(err) => self.fail(res, &err),
        }
    }

    fn fail(&self, res: &ResponseWriter, err: &anyhow::Error) {
        if res.is_written() {
            error!(error = %err, "handler failed after writing its body, error not sent");
            return;
        }
        if let Err(write_err) = write_error(res, err) {
            error!(error = %write_err, "failed to write error response");
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("resolvers", &self.resolvers().len())
            .field("valid", &self.validity.get().map(Result::is_ok))
            .finish()
    }
}

//! Runtime-checked callbacks.
//!
//! Used when the declared values are only known at runtime, as a boxed list.
//! The callback states its parameter types up front; they are compared with
//! the declared types when the handler is validated, so a mismatch is
//! reported once at registration and the callback is never invoked.

use std::any::{type_name, Any};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::Output;
use crate::error::BindError;
use crate::value::{TypeDescriptor, ValueResolver};

type DynFn = Arc<dyn Fn(&mut Args) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Resolved arguments handed to a [`DynamicCallback`], consumed in order.
pub struct Args {
    values: VecDeque<Box<dyn Any + Send>>,
}

impl Args {
    pub(crate) fn new(values: Vec<Box<dyn Any + Send>>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Take the next argument as `T`.
    pub fn next<T: 'static>(&mut self) -> Result<T, BindError> {
        let mismatch = |actual: &str| BindError::SignatureMismatch {
            expected: type_name::<T>().to_string(),
            actual: actual.to_string(),
        };
        let value = self.values.pop_front().ok_or_else(|| mismatch("nothing"))?;
        value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| mismatch("another type"))
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// Callback with a declared parameter list, checked at runtime.
///
/// ```
/// use brrtbind::{DynamicCallback, TypeDescriptor};
///
/// let cb = DynamicCallback::structured(vec![TypeDescriptor::of::<String>()], |args| {
///     let name: String = args.next()?;
///     Ok(serde_json::json!({ "message": format!("Hello {name}!") }))
/// });
/// assert_eq!(cb.params().len(), 1);
/// ```
#[derive(Clone)]
pub struct DynamicCallback {
    params: Vec<TypeDescriptor>,
    output: Output,
    f: DynFn,
}

impl DynamicCallback {
    /// Callback producing a serializable result.
    pub fn structured<R, F>(params: Vec<TypeDescriptor>, f: F) -> Self
    where
        R: Serialize,
        F: Fn(&mut Args) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            params,
            output: Output::Structured,
            f: Arc::new(move |args| {
                let out = f(args)?;
                Ok(Some(serde_json::to_value(&out).map_err(BindError::from)?))
            }),
        }
    }

    /// Callback that writes its own response.
    pub fn side_effect<F>(params: Vec<TypeDescriptor>, f: F) -> Self
    where
        F: Fn(&mut Args) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            params,
            output: Output::SideEffect,
            f: Arc::new(move |args| {
                f(args)?;
                Ok(None)
            }),
        }
    }

    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    pub fn output(&self) -> Output {
        self.output
    }

    pub(crate) fn invoke(&self, mut args: Args) -> anyhow::Result<Option<Value>> {
        (self.f)(&mut args)
    }

    /// Compare the declared parameters with the resolvers' types.
    pub(crate) fn check(&self, resolvers: &[Box<dyn ValueResolver>]) -> Result<Output, BindError> {
        let declared: Vec<TypeDescriptor> = resolvers.iter().map(|r| r.descriptor()).collect();
        if declared != self.params {
            return Err(BindError::SignatureMismatch {
                expected: render(&declared, self.output),
                actual: render(&self.params, self.output),
            });
        }
        Ok(self.output)
    }
}

impl fmt::Debug for DynamicCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.params, self.output))
    }
}

/// `fn(String, u32) -> Result<Value>` style rendering of a signature.
fn render(params: &[TypeDescriptor], output: Output) -> String {
    let params: Vec<String> = params.iter().map(TypeDescriptor::short_name).collect();
    match output {
        Output::Structured => format!("fn({}) -> Result<Value>", params.join(", ")),
        Output::SideEffect => format!("fn({})", params.join(", ")),
    }
}

/// Build the check for an arbitrary callback value: only a [`DynamicCallback`] is callable.
pub(crate) fn downcast_callback<C: Any + Send>(callback: C) -> Result<DynamicCallback, BindError> {
    let boxed: Box<dyn Any + Send> = Box::new(callback);
    boxed
        .downcast::<DynamicCallback>()
        .map(|cb| *cb)
        .map_err(|_| BindError::NotCallable {
            kind: type_name::<C>(),
        })
}

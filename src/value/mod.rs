//! Declared values.
//!
//! A handler declares, in order, which values its callback needs. Each
//! declaration is a [`ValueResolver`]: it knows where its value lives on the
//! request, which type it must produce, whether it may be absent, and how to
//! validate it. [`TypedResolver`] is the one implementation; the free
//! functions in this module are the usual way to build one.

use std::any::{Any, TypeId};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::ContextStore;
use crate::ids::RequestId;
use crate::request::Request;
use crate::response::ResponseWriter;

pub(crate) mod coerce;
mod shape;
mod typed;

pub use shape::{probe, Shape};
pub use typed::TypedResolver;

/// Where a declared value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    Path,
    Query,
    Body,
    Header,
    Context,
    /// Body for body-carrying methods, otherwise query then path
    MethodDefault,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSource::Path => "path",
            ValueSource::Query => "query",
            ValueSource::Body => "body",
            ValueSource::Header => "header",
            ValueSource::Context => "context",
            ValueSource::MethodDefault => "default",
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime identity of a declared type, with a readable name for error messages.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module paths, `alloc::string::String` becomes `String`.
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for c in self.name.chars() {
            match c {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(c);
                }
                _ => segment.push(c),
            }
        }
        out.push_str(&segment);
        out
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Contract every declared value satisfies.
///
/// Object safe, so heterogeneous declarations can be held as
/// `Box<dyn ValueResolver>` and handed to fail hooks and [`values`](crate::values).
pub trait ValueResolver: Send + Sync {
    /// Name the value is looked up by. Empty for record and reader values.
    fn field(&self) -> &str;

    /// Name the value is exported under; the alias when one was set, else the field.
    fn output_name(&self) -> &str;

    fn descriptor(&self) -> TypeDescriptor;

    fn required(&self) -> bool;

    /// Source the value is read from, `None` when a custom reader replaces it.
    fn source(&self) -> Option<ValueSource>;

    /// Zero value of the declared type.
    fn zero(&self) -> Box<dyn Any + Send>;

    fn resolve_any(&self, req: &Request, res: &ResponseWriter)
        -> anyhow::Result<Box<dyn Any + Send>>;

    /// Resolve and encode as JSON. `Ok(None)` for values that have no JSON form.
    fn resolve_json(&self, req: &Request, res: &ResponseWriter) -> anyhow::Result<Option<Value>>;
}

/// Value from a path segment, e.g. `{name}` in `/hello/{name}`.
pub fn from_path<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::Path)
}

pub fn from_query<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::Query)
}

/// Value from the prepared body, form values first, then the JSON body.
pub fn from_body<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::Body)
}

pub fn from_header<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::Header)
}

/// Value stored in the request context store by a middleware.
pub fn from_context<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::Context)
}

/// Value looked up by method: body for POST/PUT/PATCH, otherwise query then path.
pub fn value<T>(field: &str) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new(field, ValueSource::MethodDefault)
}

/// Whole record bound from the method's default source.
pub fn structure<T>() -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new("", ValueSource::MethodDefault)
}

/// Whole record bound from `source`.
pub fn structure_from<T>(source: ValueSource) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    TypedResolver::new("", source)
}

/// Value produced by custom extraction logic. Its result is authoritative.
pub fn reader<T, F>(f: F) -> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
    F: Fn(&Request, &ResponseWriter) -> anyhow::Result<T> + Send + Sync + 'static,
{
    TypedResolver::new("", ValueSource::MethodDefault).reader(f)
}

/// The request itself.
pub fn request() -> TypedResolver<Request> {
    TypedResolver::with_reader(|req, _| Ok(req.clone()))
}

/// The response writer, for side-effecting callbacks.
pub fn response_writer() -> TypedResolver<ResponseWriter> {
    TypedResolver::with_reader(|_, res| Ok(res.clone()))
}

pub fn context_store() -> TypedResolver<ContextStore> {
    TypedResolver::with_reader(|req, _| Ok(req.context().clone()))
}

pub fn request_id() -> TypedResolver<RequestId> {
    TypedResolver::with_reader(|req, _| Ok(req.request_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_equality_is_by_type() {
        assert_eq!(TypeDescriptor::of::<String>(), TypeDescriptor::of::<String>());
        assert_ne!(TypeDescriptor::of::<String>(), TypeDescriptor::of::<u32>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeDescriptor::of::<String>().to_string(), "String");
        assert_eq!(
            TypeDescriptor::of::<Option<Vec<u8>>>().to_string(),
            "Option<Vec<u8>>"
        );
    }

    #[test]
    fn test_source_names() {
        assert_eq!(ValueSource::MethodDefault.to_string(), "default");
        assert_eq!(ValueSource::Header.as_str(), "header");
    }
}

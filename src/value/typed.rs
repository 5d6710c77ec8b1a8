use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::coerce::coerce;
use super::shape::{probe, Shape};
use super::{TypeDescriptor, ValueResolver, ValueSource};
use crate::binder::{bind, bind_text};
use crate::body::{body_fields, body_value, has_body};
use crate::error::BindError;
use crate::request::{find_param_folded, Request};
use crate::response::ResponseWriter;

type ReaderFn<T> = Arc<dyn Fn(&Request, &ResponseWriter) -> anyhow::Result<T> + Send + Sync>;
type ValidatorFn<T> = Arc<dyn Fn(&Request, &T) -> anyhow::Result<()> + Send + Sync>;

/// Conversions available when `T` has a serde representation.
struct Codec<T> {
    coerce: fn(&str, Shape, Value) -> Result<T, BindError>,
    bind: fn(Map<String, Value>) -> Result<T, BindError>,
    bind_text: fn(Map<String, Value>) -> Result<T, BindError>,
    encode: fn(&T) -> Result<Value, BindError>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Codec<T> {}

fn encode<T: Serialize>(value: &T) -> Result<Value, BindError> {
    Ok(serde_json::to_value(value)?)
}

/// Declared value of type `T`.
///
/// Built once at registration and shared by every request afterwards.
///
/// ```
/// use brrtbind::value;
///
/// let age = value::from_query::<u32>("age").optional().alias("user_age");
/// assert_eq!(brrtbind::ValueResolver::output_name(&age), "user_age");
/// ```
pub struct TypedResolver<T: 'static> {
    field: String,
    alias: Option<String>,
    required: bool,
    source: ValueSource,
    reader: Option<ReaderFn<T>>,
    validator: Option<ValidatorFn<T>>,
    shape: Shape,
    descriptor: TypeDescriptor,
    zero: fn() -> T,
    codec: Option<Codec<T>>,
}

impl<T: 'static> Clone for TypedResolver<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            alias: self.alias.clone(),
            required: self.required,
            source: self.source,
            reader: self.reader.as_ref().map(Arc::clone),
            validator: self.validator.as_ref().map(Arc::clone),
            shape: self.shape,
            descriptor: self.descriptor,
            zero: self.zero,
            codec: self.codec,
        }
    }
}

impl<T: 'static> std::fmt::Debug for TypedResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedResolver")
            .field("field", &self.field)
            .field("alias", &self.alias)
            .field("required", &self.required)
            .field("source", &self.source)
            .field("shape", &self.shape)
            .field("type", &self.descriptor.name())
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

impl<T> TypedResolver<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    pub fn new(field: impl Into<String>, source: ValueSource) -> Self {
        Self {
            field: field.into(),
            alias: None,
            required: true,
            source,
            reader: None,
            validator: None,
            shape: probe::<T>(),
            descriptor: TypeDescriptor::of::<T>(),
            zero: T::default,
            codec: Some(Codec {
                coerce: coerce::<T>,
                bind: bind::<T>,
                bind_text: bind_text::<T>,
                encode: encode::<T>,
            }),
        }
    }
}

impl<T> TypedResolver<T>
where
    T: Default + Send + 'static,
{
    /// Declared value produced only by `f`, for types without a wire form.
    pub fn with_reader<F>(f: F) -> Self
    where
        F: Fn(&Request, &ResponseWriter) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            field: String::new(),
            alias: None,
            required: true,
            source: ValueSource::MethodDefault,
            reader: Some(Arc::new(f)),
            validator: None,
            shape: Shape::Other("custom"),
            descriptor: TypeDescriptor::of::<T>(),
            zero: T::default,
            codec: None,
        }
    }
}

impl<T: 'static> TypedResolver<T> {
    /// Export the value under `name` instead of the field name.
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alias = Some(name.into());
        self
    }

    /// Resolve to the zero value instead of failing when the value cannot be read.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Run `f` on every resolved value; its error becomes the resolution error.
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Replace source lookup with custom extraction logic.
    pub fn reader<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &ResponseWriter) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.reader = Some(Arc::new(f));
        self
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn zero_value(&self) -> T {
        (self.zero)()
    }

    /// Resolve the value for one request.
    pub fn resolve(&self, req: &Request, res: &ResponseWriter) -> anyhow::Result<T> {
        if let Some(reader) = &self.reader {
            let value = reader(req, res)?;
            self.check(req, &value)?;
            return Ok(value);
        }

        match self.read(req) {
            Ok(value) => {
                self.check(req, &value)?;
                Ok(value)
            }
            Err(err) if !self.required => {
                debug!(field = self.label(), error = %err, "optional value unavailable, using zero value");
                Ok((self.zero)())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn check(&self, req: &Request, value: &T) -> anyhow::Result<()> {
        match &self.validator {
            Some(validate) => validate(req, value),
            None => Ok(()),
        }
    }

    fn label(&self) -> &str {
        if self.field.is_empty() {
            self.descriptor.name()
        } else {
            &self.field
        }
    }

    fn missing(&self, source: ValueSource) -> BindError {
        match source {
            ValueSource::Context => BindError::ContextMissing {
                key: self.label().to_string(),
            },
            _ => BindError::Missing {
                field: self.label().to_string(),
            },
        }
    }

    fn read(&self, req: &Request) -> Result<T, BindError> {
        let Some(codec) = self.codec else {
            return Err(self.missing(self.source));
        };
        if self.source != ValueSource::MethodDefault {
            return self.read_from(req, self.source, codec);
        }

        let sources: &[ValueSource] = if has_body(&req.method) {
            &[ValueSource::Body]
        } else {
            &[ValueSource::Query, ValueSource::Path]
        };
        let mut last = self.missing(ValueSource::MethodDefault);
        for &source in sources {
            match self.read_from(req, source, codec) {
                Ok(value) => return Ok(value),
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    fn read_from(&self, req: &Request, source: ValueSource, codec: Codec<T>) -> Result<T, BindError> {
        if self.shape.is_composite() {
            if !self.field.is_empty() {
                if let Some(raw) = lookup(req, source, &self.field) {
                    return (codec.coerce)(self.label(), self.shape, raw);
                }
            }
            return match source {
                ValueSource::Body => {
                    let values = body_fields(req, self.shape, self.label())?;
                    if req.context().body().is_some() {
                        (codec.bind)(values)
                    } else {
                        (codec.bind_text)(values)
                    }
                }
                _ => {
                    let values = self.probe_fields(req, source);
                    if values.is_empty() {
                        return Err(self.missing(source));
                    }
                    (codec.bind_text)(values)
                }
            };
        }

        let raw = lookup(req, source, &self.field).ok_or_else(|| self.missing(source))?;
        (codec.coerce)(self.label(), self.shape, raw)
    }

    /// Gather the record's fields from a non-body source, matching names case-insensitively.
    fn probe_fields(&self, req: &Request, source: ValueSource) -> Map<String, Value> {
        if self.shape == Shape::Map {
            return entries(req, source);
        }
        self.shape
            .fields()
            .iter()
            .filter_map(|f| lookup_folded(req, source, f).map(|v| (f.to_string(), v)))
            .collect()
    }
}

fn text(value: Option<&str>) -> Option<Value> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| Value::String(v.to_string()))
}

fn lookup(req: &Request, source: ValueSource, field: &str) -> Option<Value> {
    match source {
        ValueSource::Path => text(req.get_path_param(field)),
        ValueSource::Query => req
            .get_query_param(field)
            .map(|v| Value::String(v.to_string())),
        ValueSource::Header => req.get_header(field).map(|v| Value::String(v.to_string())),
        ValueSource::Body => body_value(req, field),
        ValueSource::Context => req.context().get(field).cloned(),
        ValueSource::MethodDefault => None,
    }
}

fn lookup_folded(req: &Request, source: ValueSource, field: &str) -> Option<Value> {
    match source {
        ValueSource::Path => text(find_param_folded(&req.path_params, field)),
        ValueSource::Query => {
            find_param_folded(&req.query_params, field).map(|v| Value::String(v.to_string()))
        }
        ValueSource::Context => req.context().get_folded(field).cloned(),
        _ => lookup(req, source, field),
    }
}

fn entries(req: &Request, source: ValueSource) -> Map<String, Value> {
    let pairs = match source {
        ValueSource::Path => req.path_params.iter(),
        ValueSource::Query => req.query_params.iter(),
        ValueSource::Header => req.headers.iter(),
        ValueSource::Context => return req.context().all().clone(),
        ValueSource::Body | ValueSource::MethodDefault => return Map::new(),
    };
    pairs
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect()
}

impl<T: Send + 'static> ValueResolver for TypedResolver<T> {
    fn field(&self) -> &str {
        &self.field
    }

    fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }

    fn descriptor(&self) -> TypeDescriptor {
        self.descriptor
    }

    fn required(&self) -> bool {
        self.required
    }

    fn source(&self) -> Option<ValueSource> {
        match self.reader {
            Some(_) => None,
            None => Some(self.source),
        }
    }

    fn zero(&self) -> Box<dyn Any + Send> {
        Box::new((self.zero)())
    }

    fn resolve_any(
        &self,
        req: &Request,
        res: &ResponseWriter,
    ) -> anyhow::Result<Box<dyn Any + Send>> {
        let value = self.resolve(req, res)?;
        Ok(Box::new(value))
    }

    fn resolve_json(&self, req: &Request, res: &ResponseWriter) -> anyhow::Result<Option<Value>> {
        let Some(codec) = self.codec else {
            return Ok(None);
        };
        let value = self.resolve(req, res)?;
        Ok(Some((codec.encode)(&value)?))
    }
}

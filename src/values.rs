use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::binder::bind;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::value::ValueResolver;

/// Resolve a set of declared values into a map keyed by their output names.
///
/// Values with an empty output name and values without a JSON form (such as
/// [`request()`](crate::value::request)) are skipped. The first failure aborts.
pub fn values(
    req: &Request,
    res: &ResponseWriter,
    resolvers: &[&dyn ValueResolver],
) -> anyhow::Result<Map<String, Value>> {
    let mut out = Map::new();
    for resolver in resolvers {
        let name = resolver.output_name();
        if name.is_empty() {
            continue;
        }
        if let Some(value) = resolver.resolve_json(req, res)? {
            out.insert(name.to_string(), value);
        }
    }
    Ok(out)
}

/// Resolve a set of declared values and bind them onto `T`.
pub fn values_as<T: DeserializeOwned>(
    req: &Request,
    res: &ResponseWriter,
    resolvers: &[&dyn ValueResolver],
) -> anyhow::Result<T> {
    let data = values(req, res, resolvers)?;
    Ok(bind(data)?)
}

//! Request-scoped context store.
//!
//! A [`ContextStore`] travels with one [`Request`] and holds two things: ad-hoc
//! key/value data written by middlewares (auth tokens, tenant ids, ...) and,
//! in a reserved slot, the JSON body decoded by body preparation.
//!
//! The store is copy-on-write. Writing never touches the mapping held by the
//! current request; it copies it, applies the change and hands back a new
//! request. Two requests derived from the same parent therefore never see each
//! other's writes, even when they are processed concurrently.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::BindError;
use crate::request::Request;

/// Ordered key/value data plus the decoded body of one request.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    data: Arc<Map<String, Value>>,
    body: Option<Arc<Map<String, Value>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Case-insensitive lookup, used when probing struct fields.
    pub fn get_folded(&self, key: &str) -> Option<&Value> {
        self.data.get(key).or_else(|| {
            self.data
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decoded JSON body, if body preparation attached one.
    pub fn body(&self) -> Option<&Map<String, Value>> {
        self.body.as_deref()
    }

    /// New store with `key` set. `self` is left untouched.
    pub fn with_value(&self, key: impl Into<String>, value: Value) -> Self {
        let mut data = Map::clone(&self.data);
        data.insert(key.into(), value);
        Self {
            data: Arc::new(data),
            body: self.body.clone(),
        }
    }

    /// New store with every entry of `values` merged in. `self` is left untouched.
    pub fn with_map(&self, values: Map<String, Value>) -> Self {
        let mut data = Map::clone(&self.data);
        data.extend(values);
        Self {
            data: Arc::new(data),
            body: self.body.clone(),
        }
    }

    /// New store with the decoded body slot replaced.
    pub fn with_body(&self, body: Map<String, Value>) -> Self {
        Self {
            data: Arc::clone(&self.data),
            body: Some(Arc::new(body)),
        }
    }
}

/// All ad-hoc data on the request's context.
pub fn get_all_data(req: &Request) -> &Map<String, Value> {
    req.context().all()
}

/// Read one context key as `T`.
///
/// A missing key is a [`BindError::ContextMissing`]; a present key of the wrong
/// shape is a binder error.
pub fn get_data<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, BindError> {
    let value = req
        .context()
        .get(key)
        .ok_or_else(|| BindError::ContextMissing {
            key: key.to_string(),
        })?;
    Ok(T::deserialize(value)?)
}

/// Derive a request whose context has `key` set.
pub fn patch_value(req: &Request, key: impl Into<String>, value: impl Into<Value>) -> Request {
    req.with_context(req.context().with_value(key, value.into()))
}

/// Derive a request whose context has every entry of `values` merged in.
pub fn patch_map(req: &Request, values: Map<String, Value>) -> Request {
    req.with_context(req.context().with_map(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_value_leaves_original_untouched() {
        let parent = ContextStore::new().with_value("a", json!(1));
        let child = parent.with_value("b", json!(2));
        assert!(parent.get("b").is_none());
        assert_eq!(child.get("a"), Some(&json!(1)));
        assert_eq!(child.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let store = ContextStore::new()
            .with_value("z", json!(1))
            .with_value("a", json!(2))
            .with_value("m", json!(3));
        let keys: Vec<&str> = store.all().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_body_slot_is_separate_from_data() {
        let mut body = Map::new();
        body.insert("username".into(), json!("admin"));
        let store = ContextStore::new().with_body(body);
        assert!(store.is_empty());
        assert_eq!(store.body().map(|b| b.len()), Some(1));
        let store = store.with_value("token", json!("t"));
        assert!(store.body().is_some());
    }

    #[test]
    fn test_get_folded() {
        let store = ContextStore::new().with_value("UserId", json!(7));
        assert_eq!(store.get_folded("userid"), Some(&json!(7)));
        assert!(store.get("userid").is_none());
    }

    #[test]
    fn test_get_data_and_patch_helpers() {
        let req = Request::default();
        let req = patch_value(&req, "identifier", "sample-iden");
        let id: String = get_data(&req, "identifier").unwrap();
        assert_eq!(id, "sample-iden");

        let missing = get_data::<String>(&req, "nope").unwrap_err();
        assert!(matches!(missing, BindError::ContextMissing { .. }));

        let mut extra = Map::new();
        extra.insert("n".into(), json!(3));
        let req2 = patch_map(&req, extra);
        assert_eq!(get_all_data(&req2).len(), 2);
        assert_eq!(get_all_data(&req).len(), 1);
    }
}

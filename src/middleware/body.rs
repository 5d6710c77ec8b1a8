use crate::body::prepare_body;
use crate::request::Request;
use crate::runtime_config::{RuntimeConfig, DEFAULT_MAX_BODY_BYTES};

use super::Middleware;

/// Prepares request bodies before any handler reads them.
///
/// Malformed bodies are rejected with 422, oversized ones with 413.
#[derive(Debug, Clone, Copy)]
pub struct PrepareBody {
    max_body_bytes: usize,
}

impl PrepareBody {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }
}

impl From<&RuntimeConfig> for PrepareBody {
    fn from(config: &RuntimeConfig) -> Self {
        Self::new(config.max_body_bytes)
    }
}

impl Default for PrepareBody {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_BYTES)
    }
}

impl Middleware for PrepareBody {
    fn before(&self, req: &Request) -> anyhow::Result<Option<Request>> {
        Ok(Some(prepare_body(req, self.max_body_bytes)?))
    }
}

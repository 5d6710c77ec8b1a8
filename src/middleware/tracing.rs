use std::time::Duration;

use tracing::{debug, info};

use super::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Logs the start and completion of every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, req: &Request) -> anyhow::Result<Option<Request>> {
        debug!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            "request started"
        );
        Ok(None)
    }

    fn after(&self, req: &Request, res: &ResponseWriter, latency: Duration) {
        let out = res.finish();
        info!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            status = out.status.as_u16(),
            size = out.body.len(),
            latency_ms = latency.as_millis() as u64,
            "request completed"
        );
    }
}

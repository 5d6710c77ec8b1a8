//! Middlewares run by the router around every dispatched handler.

mod body;
mod core;
mod tracing;

pub use self::body::PrepareBody;
pub use self::core::{from_fn, run_chain, FnMiddleware, Middleware};
pub use self::tracing::TracingMiddleware;

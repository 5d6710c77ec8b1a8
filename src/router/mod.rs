//! # Router
//!
//! Minimal pattern router that drives the binding engine end to end.
//! Patterns look like `"GET /hello/{name}"`; each is compiled to an anchored
//! regex at registration, path parameters are filled on match, and the
//! router's middlewares run around the matched handler.

mod core;

pub use self::core::Router;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::error;

use crate::request::Request;
use crate::response::{write_error, ResponseWriter};

/// Hook run around every request a router dispatches.
///
/// `before` may hand back a derived request (for example one whose context
/// carries an auth token) which replaces the current one for the rest of the
/// chain. An error from `before` is written as the response and the handler is
/// not called.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &Request) -> anyhow::Result<Option<Request>> {
        Ok(None)
    }

    fn after(&self, _req: &Request, _res: &ResponseWriter, _latency: Duration) {}
}

/// Middleware built from a closure over the incoming request.
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Request) -> anyhow::Result<Option<Request>> + Send + Sync,
{
    fn before(&self, req: &Request) -> anyhow::Result<Option<Request>> {
        (self.f)(req)
    }
}

/// Wrap a closure as a [`Middleware`].
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Request) -> anyhow::Result<Option<Request>> + Send + Sync,
{
    FnMiddleware { f }
}

/// Run `middlewares` around `next`.
///
/// `before` hooks run in order; `after` hooks run in reverse order for every
/// middleware whose `before` ran, including when the chain was cut short.
pub fn run_chain<F>(
    middlewares: &[Arc<dyn Middleware>],
    req: Request,
    res: &ResponseWriter,
    next: F,
) where
    F: FnOnce(&Request, &ResponseWriter),
{
    let start = Instant::now();
    let mut req = req;
    let mut ran = 0;
    let mut rejected = false;

    for mw in middlewares {
        ran += 1;
        match mw.before(&req) {
            Ok(Some(patched)) => req = patched,
            Ok(None) => {}
            Err(err) => {
                if let Err(write_err) = write_error(res, &err) {
                    error!(error = %write_err, "failed to write middleware error");
                }
                rejected = true;
                break;
            }
        }
    }

    if !rejected {
        next(&req, res);
    }

    let latency = start.elapsed();
    for mw in middlewares[..ran].iter().rev() {
        mw.after(&req, res, latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::patch_value;
    use http::StatusCode;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn before(&self, _req: &Request) -> anyhow::Result<Option<Request>> {
            self.log.lock().push(format!("before {}", self.name));
            Ok(None)
        }

        fn after(&self, _req: &Request, _res: &ResponseWriter, _latency: Duration) {
            self.log.lock().push(format!("after {}", self.name));
        }
    }

    #[test]
    fn test_order_and_patching() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder {
                name: "a",
                log: Arc::clone(&log),
            }),
            Arc::new(from_fn(|req: &Request| Ok(Some(patch_value(req, "user", "ann"))))),
            Arc::new(Recorder {
                name: "b",
                log: Arc::clone(&log),
            }),
        ];
        let res = ResponseWriter::new();
        let seen = Mutex::new(None);
        run_chain(&chain, Request::default(), &res, |req, _| {
            *seen.lock() = req.context().get("user").cloned();
        });
        assert_eq!(seen.lock().take(), Some(serde_json::json!("ann")));
        assert_eq!(
            *log.lock(),
            vec!["before a", "before b", "after b", "after a"]
        );
    }

    #[test]
    fn test_rejection_skips_handler() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(|_: &Request| {
            Err(crate::ResponseError::new("nope")
                .status(StatusCode::FORBIDDEN)
                .into())
        }))];
        let res = ResponseWriter::new();
        let mut called = false;
        run_chain(&chain, Request::default(), &res, |_, _| called = true);
        assert!(!called);
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}

#![allow(dead_code)]

pub mod tracing_util {
    use tracing_subscriber::fmt::format::FmtSpan;

    /// Scoped test subscriber writing through the test harness' captured output.
    pub struct TestTracing {
        _guard: tracing::subscriber::DefaultGuard,
    }

    impl TestTracing {
        pub fn init() -> Self {
            let subscriber = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::DEBUG)
                .with_span_events(FmtSpan::NONE)
                .finish();
            Self {
                _guard: tracing::subscriber::set_default(subscriber),
            }
        }
    }
}

pub mod fixtures {
    use brrtbind::middleware::{from_fn, PrepareBody};
    use brrtbind::{context, value, Handler, Request, ResponseError, ResponseWriter, Router};
    use http::StatusCode;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Login {
        pub username: String,
        pub password: String,
    }

    pub fn hello(name: String) -> anyhow::Result<Value> {
        Ok(json!({ "message": format!("Hello {name}!") }))
    }

    pub fn ping(res: ResponseWriter) {
        if let Err(err) = brrtbind::write_message(&res, "pong") {
            tracing::error!(error = %err, "failed to write pong");
        }
    }

    pub fn login(body: Login) -> anyhow::Result<Value> {
        if body.username == "admin" && body.password == "pass" {
            Ok(json!({ "token": "secret-token" }))
        } else {
            Err(ResponseError::new("invalid credentials")
                .status(StatusCode::UNAUTHORIZED)
                .into())
        }
    }

    pub fn profile(token: String) -> anyhow::Result<Value> {
        Ok(json!({ "token": token }))
    }

    /// Router with `/hello/{name}`, `/ping`, `/auth/login` and a token-protected `/me` area.
    pub fn demo_router() -> Router {
        let mut auth = Router::sub_router("/auth");
        auth.handle("POST /login", Handler::new(value::structure::<Login>(), login))
            .unwrap();

        let mut me = Router::sub_router("/me");
        me.use_middleware(from_fn(|req: &Request| {
            match req.get_header("authorization") {
                Some(token) => Ok(Some(context::patch_value(req, "token", token.to_string()))),
                None => Err(ResponseError::new("auth token missing")
                    .status(StatusCode::FORBIDDEN)
                    .into()),
            }
        }));
        me.handle("GET /", Handler::new(value::from_context::<String>("token"), profile))
            .unwrap();

        let mut router = Router::new();
        router
            .use_middleware(PrepareBody::default())
            .handle("GET /hello/{name}", Handler::new(value::from_path::<String>("name"), hello))
            .unwrap()
            .handle("GET /ping", Handler::new(value::response_writer(), ping))
            .unwrap()
            .mount(auth)
            .unwrap()
            .mount(me)
            .unwrap();
        router
    }
}

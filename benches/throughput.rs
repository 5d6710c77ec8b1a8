use std::hint::black_box;

use brrtbind::middleware::PrepareBody;
use brrtbind::{value, Handler, Request, Router, ValueSource};
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Animal {
    name: String,
    legs: u32,
    tame: bool,
}

fn get_animal(category: String, id: u64, verbose: bool) -> anyhow::Result<Value> {
    Ok(json!({ "category": category, "id": id, "verbose": verbose }))
}

fn create_animal(animal: Animal) -> anyhow::Result<Animal> {
    Ok(animal)
}

fn search(animal: Animal) -> anyhow::Result<Value> {
    Ok(json!({ "name": animal.name, "legs": animal.legs }))
}

fn zoo_router() -> Router {
    let mut router = Router::new();
    router
        .use_middleware(PrepareBody::default())
        .handle(
            "GET /zoo/{category}/animals/{id}",
            Handler::new(
                (
                    value::from_path::<String>("category"),
                    value::from_path::<u64>("id"),
                    value::from_query::<bool>("verbose").optional(),
                ),
                get_animal,
            ),
        )
        .and_then(|r| r.handle("POST /zoo/animals", Handler::new(value::structure::<Animal>(), create_animal)))
        .and_then(|r| {
            r.handle(
                "GET /zoo/search",
                Handler::new(value::structure_from::<Animal>(ValueSource::Query), search),
            )
        })
        .expect("bench routes are valid");
    router
}

fn bench_dispatch(c: &mut Criterion) {
    let router = zoo_router();

    c.bench_function("scalar_path_and_query", |b| {
        b.iter(|| {
            let req = Request::new(Method::GET, "/zoo/cats/animals/123?verbose=true");
            black_box(router.serve(req));
        })
    });

    let body = serde_json::to_vec(&json!({"name": "rex", "legs": 4, "tame": true}))
        .expect("static body serializes");
    c.bench_function("struct_json_body", |b| {
        b.iter(|| {
            let req = Request::new(Method::POST, "/zoo/animals")
                .with_header("content-type", "application/json")
                .with_body(body.clone());
            black_box(router.serve(req));
        })
    });

    c.bench_function("struct_from_query", |b| {
        b.iter(|| {
            let req = Request::new(Method::GET, "/zoo/search?name=rex&legs=4&tame=1");
            black_box(router.serve(req));
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);

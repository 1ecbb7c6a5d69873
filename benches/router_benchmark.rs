// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use routecore::{path::Pattern, HandlerResult, Params, Request, Response, Router};

async fn noop(_req: Request, _params: Params) -> HandlerResult {
    Ok(Response::empty(204))
}

fn router_with(n: usize) -> Router {
    let mut router = Router::new();
    for i in 0..n {
        router
            .register(&format!("/resource{}/{{id}}/items/{{item}}", i), "GET", noop)
            .unwrap();
    }
    router
}

fn compile_benchmark(c: &mut Criterion) {
    c.bench_function("compile_literal", |b| {
        b.iter(|| Pattern::compile(black_box("/hello_world")).unwrap());
    });
    c.bench_function("compile_params", |b| {
        b.iter(|| Pattern::compile(black_box("/users/{user}/posts/{post}/")).unwrap());
    });
}

fn resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_last_route");
    for n in [1, 10, 100] {
        let router = router_with(n);
        let path = format!("/resource{}/42/items/abc", n - 1);
        group.bench_with_input(BenchmarkId::from_parameter(n), &path, |b, path| {
            b.iter(|| router.resolve(black_box(path), "GET").is_ok());
        });
    }
    group.finish();
}

fn miss_benchmark(c: &mut Criterion) {
    let router = router_with(100);
    c.bench_function("resolve_miss_100", |b| {
        b.iter(|| router.resolve(black_box("/nowhere"), "GET").is_err());
    });
}

criterion_group!(benches, compile_benchmark, resolve_benchmark, miss_benchmark);
criterion_main!(benches);

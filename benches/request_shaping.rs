//! Benchmarks for the per-call request shaping path

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map, Value};

use fmp_mcp::catalog::discovery::discover_paths;
use fmp_mcp::catalog::schema::validate;
use fmp_mcp::catalog::seed::seed_catalog;
use fmp_mcp::upstream::{normalize_path, ResponseCache, UpstreamResponse, UrlBuilder};

fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn bench_url_build(c: &mut Criterion) {
    let builder = UrlBuilder::new(
        "https://financialmodelingprep.com",
        Some("bench-key".to_string()),
    )
    .unwrap();

    let mut group = c.benchmark_group("url_build");

    let cases = vec![
        ("bare", "quote", params(&[("symbol", "AAPL")])),
        ("legacy", "v3/quote/AAPL", Map::new()),
        (
            "many_params",
            "stable/income-statement",
            params(&[
                ("symbol", "MSFT"),
                ("period", "quarter"),
                ("limit", "40"),
                ("page", "3"),
            ]),
        ),
        (
            "caller_key",
            "profile",
            params(&[("symbol", "AAPL"), ("apikey", "caller")]),
        ),
    ];

    for (name, path, query) in &cases {
        group.bench_with_input(BenchmarkId::new("path", name), &(path, query), |b, (path, query)| {
            b.iter(|| builder.build(black_box(path), black_box(query)).unwrap())
        });
    }

    group.bench_function("normalize", |b| {
        b.iter(|| normalize_path(black_box("v4/historical-price/AAPL")))
    });

    group.finish();
}

fn bench_schema_validate(c: &mut Criterion) {
    let catalog = seed_catalog();
    let mut group = c.benchmark_group("schema_validate");

    let cases = vec![
        ("fmp.request", json!({"path": "v3/quote/AAPL", "params": {"limit": 5}})),
        ("fmp_quote", json!({"symbol": "AAPL"})),
        (
            "fmp_income_statement",
            json!({"symbol": "AAPL", "period": "quarter", "paginate": true, "max_pages": 3}),
        ),
        ("search", json!({"query": "apple", "limit": 10})),
    ];

    for (tool, args) in cases {
        let spec = catalog.get(tool).unwrap().params.clone();
        group.bench_with_input(BenchmarkId::new("tool", tool), &args, |b, args| {
            b.iter(|| validate(black_box(&spec), black_box(args)))
        });
    }

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let cache = ResponseCache::new(1000);
    let response = UpstreamResponse {
        status: 200,
        ok: true,
        data: json!([{"symbol": "AAPL", "price": 123.45}]),
    };
    for i in 0..1000 {
        cache.insert(
            format!("https://financialmodelingprep.com/stable/quote?symbol=S{}", i),
            response.clone(),
            Duration::from_secs(600),
        );
    }

    let mut group = c.benchmark_group("response_cache");

    group.bench_function("hit", |b| {
        b.iter(|| {
            cache.get(black_box(
                "https://financialmodelingprep.com/stable/quote?symbol=S500",
            ))
        })
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            cache.get(black_box(
                "https://financialmodelingprep.com/stable/quote?symbol=NONE",
            ))
        })
    });

    group.finish();
}

fn bench_discovery(c: &mut Criterion) {
    let page: String = (0..500)
        .map(|i| {
            format!(
                "<a href=\"https://financialmodelingprep.com/stable/endpoint-{}?symbol=AAPL\">x</a>\n\
                 <code>/api/v3/legacy-{}/AAPL</code>\n",
                i % 120,
                i % 80
            )
        })
        .collect();

    c.bench_function("discover_paths_500_links", |b| {
        b.iter(|| discover_paths(black_box(&page)))
    });
}

criterion_group!(
    benches,
    bench_url_build,
    bench_schema_validate,
    bench_cache,
    bench_discovery
);
criterion_main!(benches);

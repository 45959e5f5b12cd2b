use std::hint::black_box;
use std::sync::Arc;

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use http::Method;
use micro_app::{Body, Dispatcher, EnvironBuilder, Router, app_fn, get, post};
use micro_http::handler::{Handler, Request, ResponseWriter};
use micro_http::protocol::body::ReqBody;
use micro_http::protocol::{PayloadSize, RequestHeader, ResponseHead, SendError};

/// Counts bytes instead of sending them.
#[derive(Default)]
struct NullWriter {
    written: usize,
}

impl ResponseWriter for NullWriter {
    fn write_head(&mut self, head: ResponseHead, _payload_size: PayloadSize) -> Result<(), SendError> {
        self.written += head.status().len();
        Ok(())
    }

    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError> {
        self.written += chunk.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SendError> {
        Ok(())
    }

    fn abort(&mut self) {}
}

fn router() -> Router {
    let hello = app_fn(|_, start_response| {
        start_response.begin("200 OK", vec![("Content-Type".into(), "text/plain".into())])?;
        Ok(Body::from("Hello World"))
    });
    let chunks = app_fn(|_, start_response| {
        start_response.begin("200 OK", vec![])?;
        Ok(Body::iter(["Hello", " ", "World", "!"]))
    });
    let echo = app_fn(|environ, start_response| {
        start_response.begin("200 OK", vec![])?;
        Ok(Body::from(environ.input().read(None)?))
    });

    Router::builder()
        .route("/hello", get(hello))
        .and_then(|builder| builder.route("/chunks", get(chunks)))
        .and_then(|builder| builder.route("/users/{id}/posts/{post}", get(app_fn(|_, _| Ok(Body::empty())))))
        .and_then(|builder| builder.route("/echo", post(echo)))
        .unwrap()
        .build()
}

fn request(method: Method, path: &str, body: ReqBody) -> Request {
    let header: RequestHeader = http::Request::builder()
        .method(method)
        .uri(path)
        .header("Host", "localhost")
        .header("User-Agent", "bench")
        .header("Accept", "*/*")
        .body(())
        .unwrap()
        .into();
    Request::new(header, body)
}

fn dispatch_benchmark(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(Arc::new(router()), EnvironBuilder::new("localhost", 8000));

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("hello", |b| {
        b.iter(|| {
            let mut writer = NullWriter::default();
            dispatcher.handle(request(Method::GET, "/hello", ReqBody::empty()), &mut writer);
            black_box(writer.written)
        })
    });

    group.bench_function("chunked_iterator", |b| {
        b.iter(|| {
            let mut writer = NullWriter::default();
            dispatcher.handle(request(Method::GET, "/chunks", ReqBody::empty()), &mut writer);
            black_box(writer.written)
        })
    });

    group.bench_function("echo_body", |b| {
        b.iter(|| {
            let mut writer = NullWriter::default();
            let body = ReqBody::from_chunks(["Hello", " ", "World"]);
            dispatcher.handle(request(Method::POST, "/echo", body), &mut writer);
            black_box(writer.written)
        })
    });

    group.bench_function("not_found", |b| {
        b.iter(|| {
            let mut writer = NullWriter::default();
            dispatcher.handle(request(Method::GET, "/missing", ReqBody::empty()), &mut writer);
            black_box(writer.written)
        })
    });

    group.finish();
}

fn router_benchmark(c: &mut Criterion) {
    let router = router();

    c.bench_function("router_lookup_params", |b| {
        b.iter(|| router.lookup(black_box(&Method::GET), black_box("/users/42/posts/7")).map(|found| found.params().len()))
    });
}

criterion_group!(benches, dispatch_benchmark, router_benchmark);
criterion_main!(benches);

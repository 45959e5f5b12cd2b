//! A route table exercising every body shape and failure mode.
//!
//! ```sh
//! cargo run -p micro-app --example routes
//! curl -i http://127.0.0.1:8000/generator
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use micro_app::{
    AppError, Body, Environ, Generator, Pull, PullIterator, Router, RouterError, Server, ServerConfig, StartResponse,
    get, post,
};

pub fn router(close_count: Arc<AtomicUsize>) -> Result<Router, RouterError> {
    let called_close_count = Arc::clone(&close_count);

    Ok(Router::builder()
        .route("/", get(root))?
        .route("/hello", get(hello))?
        .route("/echo", post(echo))?
        .route("/list", get(list))?
        .route("/tuple", get(tuple))?
        .route("/iterator", get(iterator))?
        .route("/generator", get(generator))?
        .route(
            "/call_close",
            get(move |_: &mut Environ, start_response: &mut StartResponse| -> Result<Body, AppError> {
                start_response.begin("200 OK", vec![])?;
                Ok(Body::pull_iter(CloseCounting { done: false, close_count: Arc::clone(&close_count) }))
            }),
        )?
        .route(
            "/called_close",
            get(move |_: &mut Environ, start_response: &mut StartResponse| -> Result<Body, AppError> {
                start_response.begin("200 OK", vec![])?;
                Ok(Body::from(called_close_count.load(Ordering::SeqCst).to_string()))
            }),
        )?
        .route("/no_start_response", get(no_start_response))?
        .route("/invalid_body", get(invalid_body))?
        .route("/raise_exception_before_sr", get(raise_before_start))?
        .route("/raise_exception_after_sr", get(raise_after_start))?
        .build())
}

fn root(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::empty())
}

fn hello(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::from("Hello World"))
}

/// Sends back the request's `HTTP_*` headers, without the prefix, and its body.
pub fn echo(environ: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    let headers = environ
        .http_headers()
        .map(|(key, value)| (key.strip_prefix("HTTP_").unwrap_or(key).to_string(), value.to_string()))
        .collect();
    start_response.begin("200 OK", headers)?;
    Ok(Body::from(environ.input().read(None)?))
}

fn list(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::from(vec![Bytes::from_static(b"Hello"), Bytes::from_static(b" "), Bytes::from_static(b"World")]))
}

fn tuple(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::from([&b"Hello"[..], &b" "[..], &b"World"[..]]))
}

fn iterator(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::iter(["Hello", " ", "World"]))
}

fn generator(_: &mut Environ, _: &mut StartResponse) -> Result<Body, AppError> {
    let mut step = 0;
    let generator = Generator::new(move |start_response: &mut StartResponse| {
        step += 1;
        let chunk: &'static str = match step {
            1 => {
                start_response.begin("200 OK", vec![])?;
                "Hello"
            }
            2 => " ",
            3 => "World",
            _ => return Ok(Pull::Exhausted),
        };
        Ok(Pull::Chunk(Bytes::from_static(chunk.as_bytes())))
    });
    Ok(generator.into())
}

fn no_start_response(_: &mut Environ, _: &mut StartResponse) -> Result<Body, AppError> {
    Ok(Body::from("Hello World"))
}

fn invalid_body(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Ok(Body::other(()))
}

fn raise_before_start(_: &mut Environ, _: &mut StartResponse) -> Result<Body, AppError> {
    Err("Test Exception".into())
}

fn raise_after_start(_: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    start_response.begin("200 OK", vec![])?;
    Err("Test Exception".into())
}

struct CloseCounting {
    done: bool,
    close_count: Arc<AtomicUsize>,
}

impl PullIterator for CloseCounting {
    fn pull(&mut self) -> Result<Pull, AppError> {
        if self.done {
            return Ok(Pull::Exhausted);
        }
        self.done = true;
        Ok(Pull::Chunk(Bytes::from_static(b"Hello World")))
    }

    fn close(&mut self) -> Result<(), AppError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = router(Arc::new(AtomicUsize::new(0)))?;
    Server::builder().router(router).config(ServerConfig::default()).build()?.start().await?;
    Ok(())
}

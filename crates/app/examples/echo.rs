//! Answers every request, whatever its method or path, with the request's
//! own headers and body.
//!
//! ```sh
//! cargo run -p micro-app --example echo
//! curl -i -d 'Hello World' -H 'Hello: World' http://127.0.0.1:8000/
//! ```

use micro_app::{AppError, Body, Environ, Router, Server, StartResponse};

fn echo(environ: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
    let headers = environ
        .http_headers()
        .map(|(key, value)| (key.strip_prefix("HTTP_").unwrap_or(key).to_string(), value.to_string()))
        .collect();
    start_response.begin("200 OK", headers)?;

    let body = environ.input().read_to_end()?;
    Ok(body.into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::builder().default_handler(echo).build();
    Server::builder().router(router).address("127.0.0.1:8000").build()?.start().await?;
    Ok(())
}

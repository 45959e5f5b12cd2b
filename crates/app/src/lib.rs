//! An embedded application server with a synchronous callback contract.
//!
//! Applications are plain functions: they get the request [`Environ`] and a
//! [`StartResponse`], announce a status line and headers, and return a
//! [`Body`]. The server runs them on tokio's blocking pool on top of the
//! `micro-http` transport, so an application can read its request body or do
//! other blocking work without stalling other connections.
//!
//! # Example
//!
//! ```no_run
//! use micro_app::{Body, Router, Server, app_fn, get};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hello = app_fn(|_environ, start_response| {
//!         start_response.begin("200 OK", vec![("Content-Type".into(), "text/plain".into())])?;
//!         Ok(Body::from("Hello World"))
//!     });
//!
//!     let router = Router::builder().route("/hello", get(hello)).unwrap().build();
//!     let server = Server::builder().router(router).address("127.0.0.1:8000").build().unwrap();
//!     server.start().await.unwrap();
//! }
//! ```
//!
//! # Response lifecycle
//!
//! 1. the request is routed by method and path ([`Router`]); no match is `404`
//! 2. the application runs and records its head with [`StartResponse::begin`]
//! 3. the body is pulled; the head is committed together with the first
//!    bytes, `Server` and `Date` are added unless the application set them
//! 4. any failure before the commit is answered with `500`, a failure after
//!    it closes the connection
//!
//! The body producer's cleanup ([`PullIterator::close`],
//! [`Generator::on_close`]) runs exactly once, whichever way the request ends.

mod application;
mod body;
mod config;
mod date;
mod dispatcher;
pub mod environ;
mod error;
mod header;
mod input;
pub mod router;
mod server;
mod start_response;

pub use application::{Application, app_fn};
pub use body::{Body, ChunkSource, Generator, Pull, PullIterator};
pub use config::ServerConfig;
pub use date::DateService;
pub use dispatcher::Dispatcher;
pub use environ::{Environ, EnvironBuilder, EnvironError};
pub use error::{AppError, DispatchError, ProtocolViolation};
pub use header::{HeaderPolicy, SERVER_NAME};
pub use input::Input;
pub use router::{Router, RouterBuilder, RouterError, delete, get, head, options, patch, post, put};
pub use server::{BoundServer, Server, ServerBuilder, ServerError};
pub use start_response::{ResponseState, StartResponse};

use micro_app::{Body, Router, Server, ServerConfig, app_fn, get};
use tracing::error;

#[tokio::main]
async fn main() {
    let hello = app_fn(|_environ, start_response| {
        start_response.begin("200 OK", vec![("Content-Type".into(), mime::TEXT_PLAIN_UTF_8.to_string())])?;
        Ok(Body::from("Hello World!\r\n"))
    });

    let router = match Router::builder().route("/", get(hello)) {
        Ok(builder) => builder.build(),
        Err(e) => {
            error!(cause = %e, "invalid routes");
            return;
        }
    };

    let config = ServerConfig::default().with_port(8080);
    match Server::builder().router(router).config(config).build() {
        Ok(server) => {
            if let Err(e) = server.start().await {
                error!(cause = %e, "server stopped");
            }
        }
        Err(e) => error!(cause = %e, "failed to build server"),
    }
}

use crate::body::Body;
use crate::environ::Environ;
use crate::error::AppError;
use crate::start_response::StartResponse;

/// A request callback.
///
/// The application reads the request from `environ`, announces its status
/// and headers through `start_response` and returns the body. It runs on a
/// blocking thread, so reading [`Environ::input`] or doing other blocking work
/// is fine. Returning `Err` (or panicking) before the head was committed sends
/// a `500 Internal Server Error`.
///
/// Any `Fn(&mut Environ, &mut StartResponse) -> Result<Body, AppError>`
/// closure is an application.
pub trait Application: Send + Sync {
    fn call(&self, environ: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError>;
}

impl<F> Application for F
where
    F: Fn(&mut Environ, &mut StartResponse) -> Result<Body, AppError> + Send + Sync,
{
    fn call(&self, environ: &mut Environ, start_response: &mut StartResponse) -> Result<Body, AppError> {
        (self)(environ, start_response)
    }
}

/// Pins a closure to the application signature so its argument types can be
/// inferred at the call site.
pub fn app_fn<F>(f: F) -> F
where
    F: Fn(&mut Environ, &mut StartResponse) -> Result<Body, AppError> + Send + Sync,
{
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_http::handler::ConnectionInfo;
    use micro_http::protocol::body::ReqBody;

    use crate::environ::EnvironBuilder;
    use crate::router::PathParams;

    #[test]
    fn closures_are_applications() {
        let app = app_fn(|environ, start_response| {
            start_response.begin("200 OK", vec![])?;
            Ok(Body::from(environ.path().to_string()))
        });

        let request = http::Request::get("/hello").body(()).unwrap();
        let mut environ = EnvironBuilder::new("localhost", 8000)
            .build_from_parts(request.into(), ReqBody::empty(), ConnectionInfo::default(), PathParams::empty())
            .unwrap();
        let mut start_response = StartResponse::new();

        let body = Application::call(&app, &mut environ, &mut start_response).unwrap();
        assert!(matches!(body, Body::Bytes(bytes) if bytes == "/hello"));
        assert!(start_response.is_started());
    }
}

use crate::http::{HandlerBody, make_boxed_error_response, make_text_response};
use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Hooks the admin listener calls into.
#[async_trait]
pub trait AdminHooks: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Reloads the named table. Returns the status and a short message for the caller.
    async fn reload(&self, table: &str) -> (StatusCode, String);
}

/// Serves `/health`, `/ready` and `POST /reload/{table}`.
pub struct AdminService<E> {
    hooks: Arc<dyn AdminHooks>,
    _error: PhantomData<fn() -> E>,
}

impl<E> AdminService<E> {
    pub fn new(hooks: Arc<dyn AdminHooks>) -> Self {
        Self {
            hooks,
            _error: PhantomData,
        }
    }
}

impl<E> Service<Request<Incoming>> for AdminService<E>
where
    E: Send + 'static,
{
    type Response = Response<HandlerBody>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let hooks = self.hooks.clone();

        Box::pin(async move {
            Ok(route(hooks.as_ref(), req.method(), req.uri().path()).await)
        })
    }
}

async fn route(hooks: &dyn AdminHooks, method: &Method, path: &str) -> Response<HandlerBody> {
    match path {
        "/health" => make_text_response(StatusCode::OK, "ok\n"),
        "/ready" => match hooks.is_ready() {
            true => make_text_response(StatusCode::OK, "ok\n"),
            false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
        },
        _ => match path.strip_prefix("/reload/") {
            Some(table) if *method == Method::POST && !table.is_empty() => {
                let (status, message) = hooks.reload(table).await;
                make_text_response(status, format!("{message}\n"))
            }
            Some(_) => make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED),
            None => make_boxed_error_response(StatusCode::NOT_FOUND),
        },
    }
}

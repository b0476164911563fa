//! Application hook invoked for each request a band delivers.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use crate::http::{HttpRequest, HttpResponse};

/// Produces a response for every request routed to the cell.
///
/// Handlers are shared by all bands of a session and may run concurrently.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one fully received request.
    async fn handle(&self, request: HttpRequest) -> HttpResponse;
}

#[async_trait]
impl<H> RequestHandler for Arc<H>
where
    H: RequestHandler + ?Sized,
{
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        (**self).handle(request).await
    }
}

/// Adapter turning an async function into a [`RequestHandler`].
///
/// # Examples
///
/// ```
/// use hivewire::{
///     cell::{RequestHandler, handler_fn},
///     http::{HttpRequest, HttpResponse},
/// };
///
/// # #[tokio::main]
/// # async fn main() {
/// let echo = handler_fn(|request: HttpRequest| async move {
///     HttpResponse::new(200, request.body)
/// });
/// let response = echo.handle(HttpRequest::default()).await;
/// assert_eq!(response.head.status_code, 200);
/// # }
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HandlerFn<F>(F);

/// Wrap `f` as a [`RequestHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    async fn handle(&self, request: HttpRequest) -> HttpResponse { (self.0)(request).await }
}

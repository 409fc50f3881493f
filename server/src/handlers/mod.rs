pub mod http;

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::AppState;
use crate::handlers::http::routes::Router;
use crate::handlers::http::utils::{headers, json_response};

/// Entry point for every request: route, turn failures into a generic 500,
/// then stamp the CORS and cache headers.
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    router: Arc<Router>,
) -> Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = state.config.server.allowed_origin.clone();

    let mut response = match router.route(req, state).await {
        Ok(response) => response,
        Err(e) => {
            error!("{} {} failed: {:#}", method, path, e);
            json_response::internal_error()
        }
    };

    debug!("{} {} -> {}", method, path, response.status());

    headers::add_cors_headers(&mut response, &origin);
    headers::add_no_cache_headers(&mut response);
    Ok(response)
}

/// Wait before retrying a failed `accept`. Errors such as EMFILE persist
/// until some connection closes.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

async fn pause_after_accept_error(e: &std::io::Error) {
    error!("Failed to accept connection: {}", e);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Accept connections until `shutdown` resolves, one task per connection.
pub async fn serve<S>(
    listener: TcpListener,
    state: AppState,
    router: Arc<Router>,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    pause_after_accept_error(&e).await;
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone(), router.clone()));

            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .await
            {
                debug!("Connection from {} ended with error: {:?}", peer, err);
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn accept_errors_back_off() {
        let started = Instant::now();
        pause_after_accept_error(&std::io::Error::other("too many open files")).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }
}

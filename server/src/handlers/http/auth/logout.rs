use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use tracing::info;

use crate::AppState;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::json_response;

/// End the caller's session and clear the cookie.
pub async fn handle_logout(
    _req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Session,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let clearing = state
        .sessions
        .revoke(session.user_id)
        .await
        .context("Failed to build clearing cookie")?;

    info!("User {} logged out", session.user_id);
    json_response::deliver_success_with_cookie(None::<()>, clearing)
}

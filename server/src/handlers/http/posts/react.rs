use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use tracing::{debug, warn};

use shared::types::{ReactionData, ValidationReport};

use crate::AppState;
use crate::database::mapper::MapperError;
use crate::database::posts;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

/// Like or dislike a post. The opposite reaction, if any, is replaced.
pub async fn handle_react(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Session,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let data: ReactionData = match body::read_json(req).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Reaction parsing failed: {}", e);
            return super::bad_body("reaction");
        }
    };

    if !posts::post_exists(&state.db, data.post_id)
        .await
        .context("Failed to look up post")?
    {
        return super::post_not_found();
    }

    match posts::add_reaction(&state.db, session.user_id, data.post_id, data.reaction, false).await
    {
        Ok(()) => {
            debug!(
                "User {} reacted {} to post {}",
                session.user_id,
                data.reaction.as_str(),
                data.post_id
            );
            json_response::deliver_success_json(None::<()>)
        }
        Err(MapperError::Conflict { .. }) => {
            let mut report = ValidationReport::new();
            report.push("already reacted");
            json_response::deliver_validation_report(&report)
        }
        Err(e) => Err(e).context("Failed to record reaction"),
    }
}

use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use serde_json::json;
use tracing::{info, warn};

use shared::types::{NewComment, ValidationReport};

use crate::AppState;
use crate::database::mapper::MapperError;
use crate::database::posts;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

pub async fn handle_add_comment(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Session,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let comment: NewComment = match body::read_json(req).await {
        Ok(comment) => comment,
        Err(e) => {
            warn!("Comment parsing failed: {}", e);
            return super::bad_body("comment");
        }
    };

    if !posts::post_exists(&state.db, comment.post_id)
        .await
        .context("Failed to look up post")?
    {
        return super::post_not_found();
    }

    let text = comment.comment.trim();
    let mut report = ValidationReport::new();
    report.check("empty comment", text.is_empty());

    match posts::add_comment(
        &state.db,
        session.user_id,
        comment.post_id,
        text,
        !report.is_empty(),
    )
    .await
    {
        Ok(comment_id) => {
            info!(
                "User {} commented on post {} (comment {})",
                session.user_id, comment.post_id, comment_id
            );
            json_response::deliver_success_json(Some(json!({ "comment_id": comment_id })))
        }
        Err(MapperError::Aborted) => json_response::deliver_validation_report(&report),
        Err(e) => Err(e).context("Failed to insert comment"),
    }
}

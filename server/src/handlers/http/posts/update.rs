use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use tracing::{info, warn};

use shared::types::{UpdatePost, ValidationReport};

use crate::AppState;
use crate::database::categories::check_categories;
use crate::database::mapper::MapperError;
use crate::database::posts;
use crate::database::utils::sanitize_string;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

/// Highest post status; 0 hides a post.
const MAX_STATUS: i64 = 2;

/// Rewrite one of the caller's own posts.
pub async fn handle_update_post(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Session,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let post: UpdatePost = match body::read_json(req).await {
        Ok(post) => post,
        Err(e) => {
            warn!("Update post parsing failed: {}", e);
            return super::bad_body("post update");
        }
    };

    let title = sanitize_string(&post.title);
    let mut report = ValidationReport::new();
    report.check("empty title", title.is_empty());
    report.check("wrong status", !(0..=MAX_STATUS).contains(&post.status));
    let categories = check_categories(&state.db, &post.categories, &mut report)
        .await
        .context("Failed to check categories")?;

    let updated = posts::update_post(
        &state.db,
        session.user_id,
        post.post_id,
        &title,
        &post.text,
        &categories,
        post.status,
        !report.is_empty(),
    )
    .await;

    match updated {
        Ok(true) => {
            info!("Post {} updated by user {}", post.post_id, session.user_id);
            json_response::deliver_success_json(None::<()>)
        }
        Ok(false) => {
            warn!(
                "User {} tried to update post {} they do not own",
                session.user_id, post.post_id
            );
            super::post_not_found()
        }
        Err(MapperError::Aborted) => json_response::deliver_validation_report(&report),
        Err(e) => Err(e).context("Failed to update post"),
    }
}

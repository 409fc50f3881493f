use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use serde_json::json;
use tracing::{info, warn};

use shared::types::{NewPost, ValidationReport};

use crate::AppState;
use crate::database::categories::check_categories;
use crate::database::mapper::MapperError;
use crate::database::posts;
use crate::database::utils::sanitize_string;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

pub async fn handle_add_post(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Session,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let post: NewPost = match body::read_json(req).await {
        Ok(post) => post,
        Err(e) => {
            warn!("Add post parsing failed: {}", e);
            return super::bad_body("post");
        }
    };

    let title = sanitize_string(&post.title);
    let mut report = ValidationReport::new();
    report.check("empty title", title.is_empty());
    let categories = check_categories(&state.db, &post.categories, &mut report)
        .await
        .context("Failed to check categories")?;

    match posts::add_post(
        &state.db,
        session.user_id,
        &title,
        &post.text,
        &categories,
        !report.is_empty(),
    )
    .await
    {
        Ok(post_id) => {
            info!("Post {} added by user {}", post_id, session.user_id);
            json_response::deliver_success_json(Some(json!({ "post_id": post_id })))
        }
        Err(MapperError::Aborted) => json_response::deliver_validation_report(&report),
        Err(e) => Err(e).context("Failed to insert post"),
    }
}

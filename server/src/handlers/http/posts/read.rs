use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use crate::AppState;
use crate::database::categories::load_expander;
use crate::database::posts::{self, CommentView, PostView};
use crate::database::utils::parse_optional_id;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

#[derive(Debug, Serialize)]
struct Thread {
    #[serde(rename = "Post")]
    post: PostView,
    #[serde(rename = "Comments")]
    comments: Vec<CommentView>,
}

/// `GET /api/readpost?postID=N`: the post and its comments.
pub async fn handle_read_post(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Option<Session>,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let params = body::query_params(&req);
    let Some(post_id) = parse_optional_id(params.get("postID").map(String::as_str)) else {
        return json_response::deliver_error_json(
            "BAD_REQUEST",
            "postID query parameter is required",
            StatusCode::BAD_REQUEST,
        );
    };
    let viewer = session.map(|s| s.user_id);

    let expander = load_expander(&state.db)
        .await
        .context("Failed to load categories")?;
    let post = posts::read_post(&state.db, viewer, post_id, expander)
        .await
        .context("Failed to read post")?;

    let Some(post) = post else {
        return super::post_not_found();
    };

    let comments = posts::post_comments(&state.db, viewer, post_id)
        .await
        .context("Failed to read comments")?;

    json_response::deliver_serialized_json(&Thread { post, comments }, StatusCode::OK)
}

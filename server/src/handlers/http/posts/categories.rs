use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};

use crate::AppState;
use crate::database::categories::all_categories;
use crate::handlers::http::utils::json_response;

pub async fn handle_categories(
    _req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let categories = all_categories(&state.db)
        .await
        .context("Failed to load categories")?;
    json_response::deliver_serialized_json(&categories, StatusCode::OK)
}

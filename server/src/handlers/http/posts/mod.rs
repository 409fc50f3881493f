pub mod add;
pub mod categories;
pub mod comment;
pub mod react;
pub mod read;
pub mod update;
pub mod view;

pub use add::handle_add_post;
pub use categories::handle_categories;
pub use comment::handle_add_comment;
pub use react::handle_react;
pub use read::handle_read_post;
pub use update::handle_update_post;
pub use view::handle_view_posts;

use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Response, StatusCode};

use crate::handlers::http::utils::json_response;

fn bad_body(what: &str) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    json_response::deliver_error_json(
        "BAD_REQUEST",
        &format!("Expected a JSON {} body", what),
        StatusCode::BAD_REQUEST,
    )
}

fn post_not_found() -> Result<Response<BoxBody<Bytes, Infallible>>> {
    json_response::deliver_error_json("NOT_FOUND", "Post not found", StatusCode::NOT_FOUND)
}

use std::collections::HashMap;
use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use tracing::debug;

use crate::AppState;
use crate::database::categories::load_expander;
use crate::database::posts::{self, PostFilter};
use crate::database::utils::parse_optional_id;
use crate::handlers::http::routes::Session;
use crate::handlers::http::utils::{body, json_response};

/// `GET /api/viewposts?cat=&userID=&search=&status=&page=`
pub async fn handle_view_posts(
    req: Request<hyper::body::Incoming>,
    state: AppState,
    session: Option<Session>,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let filter = filter_from_query(&body::query_params(&req));
    let viewer = session.map(|s| s.user_id);

    let expander = load_expander(&state.db)
        .await
        .context("Failed to load categories")?;
    let found = posts::view_posts(&state.db, viewer, &filter, expander)
        .await
        .context("Failed to list posts")?;

    debug!("Viewer {:?} listed {} posts", viewer, found.len());
    json_response::deliver_serialized_json(&found, StatusCode::OK)
}

fn filter_from_query(params: &HashMap<String, String>) -> PostFilter {
    let id = |key: &str| parse_optional_id(params.get(key).map(String::as_str));
    PostFilter {
        category: id("cat"),
        author: id("userID"),
        search: params
            .get("search")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        status: id("status"),
        page: id("page").unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_query_matches_everything() {
        let filter = filter_from_query(&HashMap::new());
        assert_eq!(
            filter,
            PostFilter {
                page: 1,
                ..PostFilter::default()
            }
        );
    }

    #[test]
    fn query_fields_are_read() {
        let filter = filter_from_query(&params(&[
            ("cat", "2"),
            ("userID", "7"),
            ("search", " rust "),
            ("status", "1"),
            ("page", "3"),
        ]));
        assert_eq!(filter.category, Some(2));
        assert_eq!(filter.author, Some(7));
        assert_eq!(filter.search.as_deref(), Some("rust"));
        assert_eq!(filter.status, Some(1));
        assert_eq!(filter.page, 3);
    }

    #[test]
    fn junk_values_are_ignored() {
        let filter = filter_from_query(&params(&[("cat", "abc"), ("page", ""), ("search", "  ")]));
        assert_eq!(filter.category, None);
        assert_eq!(filter.page, 1);
        assert_eq!(filter.search, None);
    }
}

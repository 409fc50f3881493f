use std::collections::HashMap;
use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, Limited, combinators::BoxBody};
use hyper::Request;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest JSON body a handler will read.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body could not be read: {0}")]
    Read(String),

    #[error("request body is not valid JSON for this endpoint: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read the whole request body (bounded) and deserialize it as JSON.
pub async fn read_json<T, B>(req: Request<B>) -> Result<T, BodyError>
where
    T: DeserializeOwned,
    B: hyper::body::Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            warn!("Failed to read request body: {}", e);
            BodyError::Read(e.to_string())
        })?
        .to_bytes();

    debug!("Read request body, size: {} bytes", bytes.len());
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode the query string of `req` into a map. Later keys win.
pub fn query_params<B>(req: &Request<B>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|query| {
            form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Helper function to create an empty body
pub fn empty() -> BoxBody<Bytes, Infallible> {
    Empty::<Bytes>::new().boxed()
}

/// Helper function to create a full body from various types
pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

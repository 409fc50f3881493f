use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{CONTENT_TYPE, HeaderValue, SET_COOKIE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error, warn};

use shared::types::{ErrorResponse, ValidationReport};

use crate::handlers::http::utils::body::full;

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// This is the primary helper all handlers should use instead of
/// writing their own one-off serialization + response-building blocks.
pub fn deliver_serialized_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;
    deliver_json(json, status)
}

/// Delivers a JSON error response with the specified error code, message, and status.
pub fn deliver_error_json(
    error_code: &str,
    message: &str,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    warn!(
        "Delivering error JSON: {} - {} ({})",
        status.as_u16(),
        error_code,
        message
    );

    deliver_serialized_json(&ErrorResponse::new(error_code, message), status)
}

/// 400 carrying every problem found in a submission.
pub fn deliver_validation_report(
    report: &ValidationReport,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    warn!("Rejecting submission: {:?}", report.messages());

    let body = ErrorResponse::new("VALIDATION_FAILED", "Submission is not valid")
        .with_errors(report.messages().to_vec());
    deliver_serialized_json(&body, StatusCode::BAD_REQUEST)
}

/// Delivers a success JSON response with optional data.
pub fn deliver_success_json<T: Serialize>(
    data: Option<T>,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let response_body = match data {
        Some(d) => json!({
            "status": "success",
            "data": d
        }),
        None => json!({
            "status": "success"
        }),
    };

    deliver_json(response_body.to_string(), StatusCode::OK)
}

/// Like [`deliver_success_json`], also setting a cookie.
pub fn deliver_success_with_cookie<T: Serialize>(
    data: Option<T>,
    cookie: HeaderValue,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let mut response = deliver_success_json(data)?;
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// Delivers a JSON response from raw pre-serialized bytes.
/// Prefer `deliver_serialized_json` when you have a typed value.
pub fn deliver_json<T: Into<Bytes>>(
    json: T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let bytes: Bytes = json.into();

    debug!("Delivering JSON response, size: {} bytes", bytes.len());

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(bytes))
        .map_err(|e: http::Error| {
            error!("Failed to build JSON response: {}", e);
            anyhow!("Failed to build JSON response: {}", e)
        })
}

/// The generic 500 sent when a handler fails. Cannot itself fail.
pub fn internal_error() -> Response<BoxBody<Bytes, Infallible>> {
    let body = r#"{"status":"error","code":"INTERNAL_ERROR","message":"An internal error occurred"}"#;
    let mut response = Response::new(full(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<BoxBody<Bytes, Infallible>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn error_json_shape() {
        let response =
            deliver_error_json("NOT_FOUND", "Post not found", StatusCode::NOT_FOUND).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn validation_report_lists_problems() {
        let mut report = ValidationReport::new();
        report.push("email already exist");
        let response = deliver_validation_report(&report).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"], json!(["email already exist"]));
    }

    #[tokio::test]
    async fn success_wraps_data() {
        let body = body_json(deliver_success_json(Some(json!({"post_id": 4}))).unwrap()).await;
        assert_eq!(body, json!({"status": "success", "data": {"post_id": 4}}));
    }

    #[tokio::test]
    async fn internal_error_is_generic() {
        let response = internal_error();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }
}

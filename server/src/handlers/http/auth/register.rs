use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use shared::types::{RegistrationData, ValidationReport};

use crate::AppState;
use crate::database::mapper::MapperError;
use crate::database::users::{self, NewUser};
use crate::database::utils::sanitize_string;
use crate::handlers::http::utils::{body, json_response};

/// Main registration handler
///
/// The insert runs even when the submission already failed a check: the
/// guard rolls it back, but a duplicate username or email is still found and
/// reported alongside the other problems.
pub async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    info!("Processing registration request");

    let data: RegistrationData = match body::read_json(req).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Registration parsing failed: {}", e);
            return json_response::deliver_error_json(
                "BAD_REQUEST",
                "Expected a JSON registration body",
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let new_user = NewUser {
        username: sanitize_string(&data.username),
        email: sanitize_string(&data.email),
        fullname: sanitize_string(&data.fullname),
        password_hash: String::new(),
    };

    let mut report = ValidationReport::new();
    report.check("empty username", new_user.username.is_empty());
    report.check("empty email", new_user.email.is_empty());
    report.check("empty password", data.password.is_empty());

    let hasher = state.hasher.clone();
    let password = data.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .context("Password hashing task failed")??;

    let new_user = NewUser {
        password_hash,
        ..new_user
    };

    match users::register_user(&state.db, &new_user, !report.is_empty()).await {
        Ok(user_id) => {
            info!("User registered: {} (ID: {})", new_user.username, user_id);
            json_response::deliver_success_json(Some(json!({ "user_id": user_id })))
        }
        Err(MapperError::Conflict { target }) => {
            report_conflict(&mut report, &target);
            json_response::deliver_validation_report(&report)
        }
        Err(MapperError::Aborted) => json_response::deliver_validation_report(&report),
        Err(e) => Err(e).context("Failed to insert user"),
    }
}

fn report_conflict(report: &mut ValidationReport, target: &str) {
    report.check("email already exist", target == "users.email");
    report.check("user already exist", target == "users.username");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_messages() {
        let mut report = ValidationReport::new();
        report_conflict(&mut report, "users.email");
        assert_eq!(report.messages(), ["email already exist".to_string()]);

        let mut report = ValidationReport::new();
        report_conflict(&mut report, "users.username");
        assert_eq!(report.messages(), ["user already exist".to_string()]);

        let mut report = ValidationReport::new();
        report_conflict(&mut report, "posts.title");
        assert!(report.is_empty());
    }
}

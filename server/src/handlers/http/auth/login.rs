use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use tracing::{info, warn};

use shared::types::{LoginData, LoginError, LoginResponse};

use crate::AppState;
use crate::database::users;
use crate::handlers::http::utils::{body, json_response};

/// Main login handler
pub async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    info!("Processing login request");

    let login_data: LoginData = match body::read_json(req).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Login parsing failed: {}", e);
            return json_response::deliver_error_json(
                "BAD_REQUEST",
                "Expected a JSON body with username and password",
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let credentials = users::find_credentials(&state.db, login_data.username.trim())
        .await
        .context("Failed to look up user")?;

    let Some(credentials) = credentials else {
        warn!("Login for unknown user: {}", login_data.username);
        return deliver_login_error(LoginError::UnknownUser);
    };

    // argon2 blocks for tens of milliseconds.
    let hasher = state.hasher.clone();
    let digest = credentials.password_hash.clone();
    let password = login_data.password;
    let valid = tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
        .await
        .context("Password verification task failed")?;

    if !valid {
        warn!("Invalid password for user: {}", login_data.username);
        return deliver_login_error(LoginError::WrongPassword);
    }

    let issued = state
        .sessions
        .issue(credentials.user_id, credentials.role)
        .await
        .context("Failed to issue session")?;

    info!(
        "User logged in successfully: {} (ID: {})",
        login_data.username, credentials.user_id
    );

    let response = LoginResponse {
        user_id: credentials.user_id,
        role: credentials.role.to_string(),
        expires_at: issued.expiry,
    };
    json_response::deliver_success_with_cookie(Some(response), issued.set_cookie)
}

fn deliver_login_error(err: LoginError) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let status = match err {
        LoginError::UnknownUser => StatusCode::NOT_FOUND,
        LoginError::WrongPassword => StatusCode::FORBIDDEN,
    };
    json_response::deliver_error_json(err.to_code(), err.to_message(), status)
}

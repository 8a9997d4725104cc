//! Single-admin login check against the `ADMIN_EMAIL`/`ADMIN_PASSWORD` env
//! vars. No session store or token issuance — the client is expected to
//! hold the admin credentials itself and re-send them, or treat a 200 as a
//! local unlock signal.

use axum::{extract::State, routing::post, Router};
use serde::{Deserialize, Serialize};

use crate::context::App;
use crate::error::{AppError, EngineError};
use crate::json::Json;

pub fn route() -> Router<App> {
    Router::new().route("/login", post(login))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: &'static str,
}

async fn login(
    State(ctx): State<App>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let username_matches = ctx
        .config
        .admin_email
        .as_deref()
        .is_some_and(|expected| expected == body.username);
    let password_matches = ctx
        .config
        .admin_password
        .as_deref()
        .is_some_and(|expected| expected == body.password);

    if username_matches && password_matches {
        Ok(Json(LoginResponse {
            token: "authenticated",
        }))
    } else {
        Err(EngineError::AuthFailure.into())
    }
}

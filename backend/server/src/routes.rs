use std::sync::Arc;

use axum::{
    Json,
    extract::{self, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    accounts::AccountView,
    auth::{ChangePasswordRequest, LoginRequest},
    error::AppError,
    signup::{Session, SignupRequest},
    state::State,
};

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    otp: String,
}

#[derive(Serialize)]
struct SessionResponse {
    message: &'static str,
    token: String,
    user: AccountView,
}

impl SessionResponse {
    fn new(message: &'static str, session: Session) -> Json<Self> {
        Json(Self {
            message,
            user: AccountView::from(&session.account),
            token: session.token,
        })
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|_| AppError::MalformedPayload)
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

pub async fn register_otp_handler(
    extract::State(state): extract::State<Arc<State>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    state.signup.submit(body(payload)?).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "OTP sent to email for verification" })),
    ))
}

pub async fn verify_otp_handler(
    extract::State(state): extract::State<Arc<State>>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = body(payload)?;
    let session = state.signup.verify(&request.email, &request.otp).await?;

    Ok((
        StatusCode::CREATED,
        SessionResponse::new("User created successfully", session),
    ))
}

pub async fn register_handler(
    extract::State(state): extract::State<Arc<State>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.register(body(payload)?).await?;

    Ok((
        StatusCode::CREATED,
        SessionResponse::new("User created successfully", session),
    ))
}

pub async fn login_handler(
    extract::State(state): extract::State<Arc<State>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth.login(body(payload)?).await?;

    Ok((StatusCode::OK, SessionResponse::new("Login successful", session)))
}

pub async fn change_password_handler(
    extract::State(state): extract::State<Arc<State>>,
    headers: HeaderMap,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    state
        .auth
        .change_password(authorization, body(payload)?)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Password changed successfully" })),
    ))
}

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use super::{
    authenticate, check_rate_limit, session_cookie, set_cookie_header, ClientIp, JsonBody,
    SessionToken,
};
use crate::app_error::AppError;
use crate::engine::{self, EngineError};
use crate::models::room::RoomState;
use crate::rate_limit::RateLimitKind;
use crate::validation::validate_room_code;
use crate::web::responses::{
    AddOptionResponse, CreateRoomResponse, JoinRoomResponse, MessageResponse, SpinResponse,
};
use crate::web::state::AppState;

// Missing fields become empty strings and fail validation with the proper code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub host_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddOptionRequest {
    #[serde(default)]
    pub text: String,
}

fn require_room_code(code: &str) -> Result<(), AppError> {
    if validate_room_code(code) {
        Ok(())
    } else {
        Err(EngineError::InvalidRoomCode.into())
    }
}

pub async fn create_room(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    JsonBody(request): JsonBody<CreateRoomRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_rate_limit(&state, RateLimitKind::CreateRoom, &ip)?;

    let created =
        engine::create_room(state.store.as_ref(), &request.category, &request.host_name).await?;

    let cookie = session_cookie(&state.config, created.session_token);
    Ok((
        set_cookie_header(cookie),
        Json(CreateRoomResponse { code: created.code }),
    ))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomState>, AppError> {
    let room_state = engine::get_room_state(state.store.as_ref(), &code).await?;
    Ok(Json(room_state))
}

pub async fn join_room(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(code): Path<String>,
    JsonBody(request): JsonBody<JoinRoomRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_rate_limit(&state, RateLimitKind::JoinRoom, &ip)?;

    let joined = engine::join_room(state.store.as_ref(), &code, &request.name).await?;

    let cookie = session_cookie(&state.config, joined.session_token);
    Ok((
        set_cookie_header(cookie),
        Json(JoinRoomResponse { success: true }),
    ))
}

pub async fn add_option(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: SessionToken,
    Path(code): Path<String>,
    JsonBody(request): JsonBody<AddOptionRequest>,
) -> Result<Json<AddOptionResponse>, AppError> {
    check_rate_limit(&state, RateLimitKind::SubmitOption, &ip)?;
    require_room_code(&code)?;
    let participant_id = authenticate(&state, session).await?;

    let option =
        engine::add_option(state.store.as_ref(), &code, participant_id, &request.text).await?;

    Ok(Json(AddOptionResponse {
        option,
        message: "Option added successfully".to_string(),
    }))
}

pub async fn veto_option(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: SessionToken,
    Path((code, option_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    check_rate_limit(&state, RateLimitKind::Veto, &ip)?;
    require_room_code(&code)?;
    let option_id: i64 = option_id
        .parse()
        .map_err(|_| AppError::InvalidOptionId(option_id.clone()))?;
    let participant_id = authenticate(&state, session).await?;

    engine::veto_option(state.store.as_ref(), &code, option_id, participant_id).await?;

    Ok(Json(MessageResponse::new("Option vetoed successfully")))
}

pub async fn spin(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: SessionToken,
    Path(code): Path<String>,
) -> Result<Json<SpinResponse>, AppError> {
    check_rate_limit(&state, RateLimitKind::Spin, &ip)?;
    require_room_code(&code)?;
    let participant_id = authenticate(&state, session).await?;

    let outcome = engine::spin(state.store.as_ref(), &code, participant_id).await?;

    Ok(Json(outcome.into()))
}

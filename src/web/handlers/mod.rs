use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::extract::{FromRequest, FromRequestParts};
use axum::{async_trait, Json};
use std::convert::Infallible;
use tower_sessions::cookie::{Cookie, SameSite};

use super::responses::ErrorResponse;
use super::state::AppState;
use crate::app_error::AppError;
use crate::rate_limit::{client_identifier, RateLimitKind};
use crate::session::{verify_session, SESSION_LIFETIME_HOURS};
use crate::AppConfig;

pub mod health;
pub mod recent;
pub mod rooms;

pub const SESSION_COOKIE: &str = "spin_session";

pub async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("NOT_FOUND", "Not found")),
    )
}

/// `Json` body whose rejections are reported as [`AppError::InvalidRequest`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Client identifier for rate limiting, taken from `X-Forwarded-For`.
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded_for = parts
            .headers
            .get(HeaderName::from_static("x-forwarded-for"))
            .and_then(|value| value.to_str().ok());
        Ok(ClientIp(client_identifier(forwarded_for)))
    }
}

/// Raw value of the session cookie, if the request carries one.
pub struct SessionToken(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());
        Ok(SessionToken(token))
    }
}

pub fn check_rate_limit(state: &AppState, kind: RateLimitKind, ip: &str) -> Result<(), AppError> {
    if state.rate_limiter.check(kind, ip) {
        Ok(())
    } else {
        Err(AppError::RateLimited)
    }
}

/// Resolves the session cookie to a participant id.
pub async fn authenticate(state: &AppState, token: SessionToken) -> Result<i64, AppError> {
    let token = token.0.ok_or(AppError::NotAuthenticated)?;
    verify_session(state.store.as_ref(), &token)
        .await?
        .ok_or(AppError::InvalidSession)
}

pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .path("/")
        .max_age(time::Duration::hours(SESSION_LIFETIME_HOURS))
        .same_site(SameSite::Lax)
        .secure(config.is_production())
        .build()
}

pub fn set_cookie_header(cookie: Cookie<'static>) -> [(HeaderName, String); 1] {
    [(SET_COOKIE, cookie.to_string())]
}

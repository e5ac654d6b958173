use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::error::HttpError;
use crate::drive::DriveError;

use super::HttpState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub removed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BindResponse {
    pub bound: bool,
    pub account: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct BindQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub(super) async fn clear_cache(State(state): State<HttpState>) -> Response {
    match state.cache.clear_all().await {
        Ok(removed) => {
            info!(removed, "query cache cleared by administrator");
            Json(ClearCacheResponse { removed }).into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Send the administrator to the identity provider's consent page.
pub(super) async fn bind_start(State(state): State<HttpState>) -> Response {
    let Some(drive) = state.drive.as_ref() else {
        return HttpError::from(DriveError::Disabled).into_response();
    };
    match drive.authorization_url(None) {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Callback of the authorization code flow.
pub(super) async fn bind_callback(
    State(state): State<HttpState>,
    Query(query): Query<BindQuery>,
) -> Response {
    let Some(drive) = state.drive.as_ref() else {
        return HttpError::from(DriveError::Disabled).into_response();
    };

    if let Some(error) = query.error {
        return HttpError::new(
            "infra::http::admin::bind_callback",
            StatusCode::BAD_REQUEST,
            "Authorization was declined",
            format!(
                "{error}: {}",
                query.error_description.unwrap_or_default()
            ),
        )
        .into_response();
    }

    let code = query.code.unwrap_or_default();
    match drive.authorize(&code).await {
        Ok(token) => Json(BindResponse {
            bound: true,
            account: token.account,
            expires_at: token.expires_at.unix_timestamp(),
        })
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

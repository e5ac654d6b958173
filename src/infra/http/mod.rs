//! HTTP surface: cookie helper, cache administration, and the drive binding callback.

mod admin;
mod cookie;
mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};

use crate::cache::QueryCacheProvider;
use crate::drive::{BIND_CALLBACK_PATH, TokenService};

pub use admin::{BindResponse, ClearCacheResponse};
pub use cookie::{NameValuePair, build_set_cookie};
pub use middleware::{X_ACTION_TIME, action_timing, log_responses};

#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<QueryCacheProvider>,
    /// Present only when the drive integration is enabled.
    pub drive: Option<Arc<TokenService>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/SetCookie",
            get(cookie::set_cookie_get).post(cookie::set_cookie_post),
        )
        .route("/api/admin/cache/clear", post(admin::clear_cache))
        .route("/api/admin/bind", get(admin::bind_start))
        .route(BIND_CALLBACK_PATH, get(admin::bind_callback))
        .layer(from_fn(action_timing))
        .layer(from_fn(log_responses))
        .with_state(state)
}

//! Drive (Microsoft Graph) token management.
//!
//! An administrator binds the drive once through the OAuth authorization
//! code flow (`/api/admin/bind/new`). The resulting token is persisted to a
//! JSON cache file and refreshed silently on a fixed interval for as long as
//! that file exists.

mod client;
mod cloud;
mod error;
mod refresher;
mod service;
mod token;

pub use client::{IdentityClient, OAuthClient, redirect_uri};
pub use cloud::CloudInstance;
pub use error::DriveError;
pub use refresher::{RefreshTask, spawn_refresher};
pub use service::TokenService;
pub use token::{AccessToken, TokenCache};

/// Path of the authorization callback, relative to the configured base URI.
pub const BIND_CALLBACK_PATH: &str = "/api/admin/bind/new";

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DriveError;

/// Bearer token for the Graph API, as persisted in the token cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl AccessToken {
    /// True when the token stays valid for at least `skew` past `now`.
    pub fn is_fresh(&self, now: OffsetDateTime, skew: time::Duration) -> bool {
        self.expires_at - skew > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("account", &self.account)
            .finish()
    }
}

/// Successful body of the token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: i64,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self, issued_at: OffsetDateTime) -> AccessToken {
        // The cache file keeps whole seconds.
        let issued_at = issued_at.replace_nanosecond(0).unwrap_or(issued_at);
        AccessToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scopes: self.scope.split_whitespace().map(str::to_string).collect(),
            expires_at: issued_at + time::Duration::seconds(self.expires_in.max(0)),
            account: None,
        }
    }
}

/// Error body of the token endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenErrorResponse {
    #[serde(default)]
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

/// JSON file holding the bound drive token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn load(&self) -> Result<Option<AccessToken>, DriveError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(DriveError::cache_file(&self.path, err)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replace the cached token. The file is swapped in with a rename.
    pub async fn save(&self, token: &AccessToken) -> Result<(), DriveError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| DriveError::cache_file(parent, err))?;
        }

        let payload = serde_json::to_vec_pretty(token)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, payload)
            .await
            .map_err(|err| DriveError::cache_file(&staging, err))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| DriveError::cache_file(&self.path, err))
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

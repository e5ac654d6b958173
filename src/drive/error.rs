use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("drive integration is disabled")]
    Disabled,
    #[error("invalid argument `{0}`")]
    InvalidArgument(&'static str),
    #[error("no cached drive token is available")]
    NoCachedToken,
    #[error("cached drive token belongs to `{found}`, expected `{expected}`")]
    AccountMismatch { expected: String, found: String },
    #[error("identity provider rejected the request ({status}): {error}")]
    Identity {
        status: u16,
        error: String,
        description: Option<String>,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("token cache `{path}`: {source}")]
    CacheFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("token payload could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl DriveError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn cache_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheFile {
            path: path.into(),
            source,
        }
    }
}

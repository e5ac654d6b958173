use async_trait::async_trait;
use reqwest::{Client, Proxy, Response, Url};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::DriveSettings;

use super::BIND_CALLBACK_PATH;
use super::error::DriveError;
use super::token::{AccessToken, TokenErrorResponse, TokenResponse};

const TENANT: &str = "common";

/// OAuth operations against the identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// URL the administrator visits to grant consent.
    fn authorize_url(&self, state: Option<&str>) -> Result<Url, DriveError>;

    /// Exchange an authorization code for a token.
    async fn acquire_by_code(&self, code: &str) -> Result<AccessToken, DriveError>;

    /// Obtain a new token from the refresh token of `cached`.
    async fn acquire_silent(&self, cached: &AccessToken) -> Result<AccessToken, DriveError>;
}

/// Callback URL registered with the identity provider.
pub fn redirect_uri(base_uri: &Url) -> Result<Url, DriveError> {
    let base = base_uri.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}{BIND_CALLBACK_PATH}"))?)
}

/// Confidential OAuth client speaking the v2.0 endpoints over reqwest.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    scopes: Vec<String>,
    authorize_endpoint: Url,
    token_endpoint: Url,
}

impl OAuthClient {
    pub fn new(settings: &DriveSettings) -> Result<Self, DriveError> {
        let base_uri = settings
            .base_uri
            .as_ref()
            .ok_or_else(|| DriveError::configuration("drive.base_uri is not set"))?;

        let mut builder = Client::builder()
            .user_agent(concat!("scriptorium/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout);
        if let Some(proxy) = settings.proxy.as_ref() {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        let authority = settings.cloud.authority_host();
        Ok(Self {
            http: builder.build()?,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: redirect_uri(base_uri)?,
            scopes: settings.scopes.clone(),
            authorize_endpoint: Url::parse(&format!(
                "{authority}/{TENANT}/oauth2/v2.0/authorize"
            ))?,
            token_endpoint: Url::parse(&format!("{authority}/{TENANT}/oauth2/v2.0/token"))?,
        })
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<AccessToken, DriveError> {
        let issued_at = OffsetDateTime::now_utc();
        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(form)
            .send()
            .await?;
        Self::handle(response, issued_at).await
    }

    async fn handle(response: Response, issued_at: OffsetDateTime) -> Result<AccessToken, DriveError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let body: TokenErrorResponse = serde_json::from_slice(&bytes).unwrap_or_default();
            let error = if body.error.is_empty() {
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                body.error
            };
            return Err(DriveError::Identity {
                status: status.as_u16(),
                error,
                description: body.error_description,
            });
        }
        let body: TokenResponse = serde_json::from_slice(&bytes)?;
        Ok(body.into_token(issued_at))
    }
}

#[async_trait]
impl IdentityClient for OAuthClient {
    fn authorize_url(&self, state: Option<&str>) -> Result<Url, DriveError> {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", self.redirect_uri.as_str())
                .append_pair("response_mode", "query")
                .append_pair("scope", &self.scope());
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    #[instrument(skip_all)]
    async fn acquire_by_code(&self, code: &str) -> Result<AccessToken, DriveError> {
        let scope = self.scope();
        let token = self
            .request_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ])
            .await?;
        debug!(expires_at = %token.expires_at, "drive token acquired by code");
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn acquire_silent(&self, cached: &AccessToken) -> Result<AccessToken, DriveError> {
        let refresh_token = cached
            .refresh_token
            .as_deref()
            .ok_or(DriveError::NoCachedToken)?;
        let scope = self.scope();
        let mut token = self
            .request_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ])
            .await?;
        if token.refresh_token.is_none() {
            token.refresh_token = cached.refresh_token.clone();
        }
        debug!(expires_at = %token.expires_at, "drive token refreshed");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::drive::CloudInstance;

    fn settings(cloud: CloudInstance) -> DriveSettings {
        DriveSettings {
            enabled: true,
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            base_uri: Some(Url::parse("https://blog.example/").expect("url")),
            cloud,
            scopes: vec!["Files.ReadWrite.All".to_string(), "offline_access".to_string()],
            account_name: None,
            proxy: None,
            token_cache_path: PathBuf::from("token.json"),
            refresh_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn redirect_uri_appends_bind_path() {
        let base = Url::parse("https://blog.example/").expect("url");
        assert_eq!(
            redirect_uri(&base).expect("redirect").as_str(),
            "https://blog.example/api/admin/bind/new"
        );
    }

    #[test]
    fn endpoints_follow_cloud_authority() {
        let global = OAuthClient::new(&settings(CloudInstance::Global)).expect("client");
        assert_eq!(
            global.token_endpoint().as_str(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );

        let china = OAuthClient::new(&settings(CloudInstance::China)).expect("client");
        assert_eq!(
            china.token_endpoint().as_str(),
            "https://login.chinacloudapi.cn/common/oauth2/v2.0/token"
        );
    }

    #[test]
    fn authorize_url_carries_client_and_scopes() {
        let client = OAuthClient::new(&settings(CloudInstance::Global)).expect("client");
        let url = client.authorize_url(Some("xyz")).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://blog.example/api/admin/bind/new".to_string()
        )));
        assert!(pairs.contains(&(
            "scope".to_string(),
            "Files.ReadWrite.All offline_access".to_string()
        )));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
    }

    #[test]
    fn missing_base_uri_is_a_configuration_error() {
        let mut settings = settings(CloudInstance::Global);
        settings.base_uri = None;

        let err = OAuthClient::new(&settings).expect_err("no base uri");
        assert!(matches!(err, DriveError::Configuration { .. }));
    }
}

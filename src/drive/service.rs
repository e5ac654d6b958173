use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use url::Url;

use crate::config::DriveSettings;

use super::client::{IdentityClient, OAuthClient};
use super::error::DriveError;
use super::token::{AccessToken, TokenCache};

const METRIC_REFRESH: &str = "scriptorium_drive_token_refresh_total";

/// Tokens closer than this to expiry are refreshed instead of reused.
const EXPIRY_SKEW: time::Duration = time::Duration::minutes(5);

/// Holds the current drive token and keeps it alive.
pub struct TokenService {
    client: Arc<dyn IdentityClient>,
    cache: TokenCache,
    account_name: Option<String>,
    graph_api: &'static str,
    current: RwLock<Option<AccessToken>>,
}

impl TokenService {
    pub fn new(settings: &DriveSettings, client: Arc<dyn IdentityClient>) -> Self {
        Self {
            client,
            cache: TokenCache::new(settings.token_cache_path.clone()),
            account_name: settings.account_name.clone(),
            graph_api: settings.cloud.graph_api(),
            current: RwLock::new(None),
        }
    }

    /// Build the service with an [`OAuthClient`] for `settings`.
    pub fn from_settings(settings: &DriveSettings) -> Result<Self, DriveError> {
        if !settings.enabled {
            return Err(DriveError::Disabled);
        }
        let client = OAuthClient::new(settings)?;
        Ok(Self::new(settings, Arc::new(client)))
    }

    /// Root URL for Graph requests, e.g. `https://graph.microsoft.com/v1.0`.
    pub fn graph_base_url(&self) -> String {
        format!("{}/v1.0", self.graph_api)
    }

    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url, DriveError> {
        self.client.authorize_url(state)
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Latest token obtained by [`authorize`](Self::authorize) or [`refresh`](Self::refresh).
    pub async fn current(&self) -> Option<AccessToken> {
        self.current.read().await.clone()
    }

    /// Complete the binding flow with the code returned to the callback URL.
    #[instrument(skip_all)]
    pub async fn authorize(&self, code: &str) -> Result<AccessToken, DriveError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DriveError::InvalidArgument("code"));
        }

        let mut token = self.client.acquire_by_code(code).await?;
        token.account = self.account_name.clone();
        self.cache.save(&token).await?;
        *self.current.write().await = Some(token.clone());

        info!(account = ?token.account, expires_at = %token.expires_at, "drive account bound");
        Ok(token)
    }

    /// Refresh the token from the cache file.
    ///
    /// Does nothing and returns `Ok(None)` until an account has been bound,
    /// i.e. while the cache file does not exist. A cached token that is still
    /// fresh is reused without contacting the identity provider.
    #[instrument(skip_all, fields(cache = %self.cache.path().display()))]
    pub async fn refresh(&self) -> Result<Option<AccessToken>, DriveError> {
        if !self.cache.exists().await {
            counter!(METRIC_REFRESH, "result" => "skipped").increment(1);
            return Ok(None);
        }

        match self.refresh_from_cache().await {
            Ok(token) => {
                counter!(METRIC_REFRESH, "result" => "success").increment(1);
                Ok(Some(token))
            }
            Err(err) => {
                counter!(METRIC_REFRESH, "result" => "failure").increment(1);
                Err(err)
            }
        }
    }

    async fn refresh_from_cache(&self) -> Result<AccessToken, DriveError> {
        let cached = self.cache.load().await?.ok_or(DriveError::NoCachedToken)?;

        if let (Some(expected), Some(found)) = (self.account_name.as_ref(), cached.account.as_ref())
            && !expected.eq_ignore_ascii_case(found)
        {
            return Err(DriveError::AccountMismatch {
                expected: expected.clone(),
                found: found.clone(),
            });
        }

        let token = if cached.is_fresh(OffsetDateTime::now_utc(), EXPIRY_SKEW) {
            cached
        } else {
            let mut token = self.client.acquire_silent(&cached).await?;
            token.account = cached.account.clone();
            self.cache.save(&token).await?;
            token
        };

        *self.current.write().await = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::drive::CloudInstance;

    #[derive(Default)]
    struct FakeIdentity {
        by_code: AtomicUsize,
        silent: AtomicUsize,
    }

    fn token(access: &str, expires_in: time::Duration) -> AccessToken {
        AccessToken {
            access_token: access.to_string(),
            refresh_token: Some(format!("{access}-refresh")),
            token_type: "Bearer".to_string(),
            scopes: vec!["Files.ReadWrite.All".to_string()],
            expires_at: (OffsetDateTime::now_utc() + expires_in)
                .replace_nanosecond(0)
                .expect("whole second"),
            account: None,
        }
    }

    #[async_trait]
    impl IdentityClient for FakeIdentity {
        fn authorize_url(&self, _state: Option<&str>) -> Result<Url, DriveError> {
            Ok(Url::parse("https://login.example/authorize")?)
        }

        async fn acquire_by_code(&self, code: &str) -> Result<AccessToken, DriveError> {
            self.by_code.fetch_add(1, Ordering::SeqCst);
            Ok(token(&format!("code-{code}"), time::Duration::hours(1)))
        }

        async fn acquire_silent(&self, cached: &AccessToken) -> Result<AccessToken, DriveError> {
            let n = self.silent.fetch_add(1, Ordering::SeqCst);
            cached.refresh_token.as_ref().ok_or(DriveError::NoCachedToken)?;
            Ok(token(&format!("silent-{n}"), time::Duration::hours(1)))
        }
    }

    fn settings(path: &Path) -> DriveSettings {
        DriveSettings {
            enabled: true,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            base_uri: Some(Url::parse("https://blog.example").expect("url")),
            cloud: CloudInstance::Global,
            scopes: vec!["Files.ReadWrite.All".to_string()],
            account_name: Some("owner@example.com".to_string()),
            proxy: None,
            token_cache_path: path.to_path_buf(),
            refresh_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
        }
    }

    fn service(path: &Path) -> (Arc<FakeIdentity>, TokenService) {
        let identity = Arc::new(FakeIdentity::default());
        let service = TokenService::new(&settings(path), identity.clone());
        (identity, service)
    }

    #[tokio::test]
    async fn refresh_without_cache_file_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));

        assert!(service.refresh().await.expect("refresh").is_none());
        assert_eq!(identity.silent.load(Ordering::SeqCst), 0);
        assert!(service.current().await.is_none());
    }

    #[tokio::test]
    async fn authorize_persists_token_for_the_account() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));

        let bound = service.authorize(" abc ").await.expect("authorize");

        assert_eq!(bound.access_token, "code-abc");
        assert_eq!(bound.account.as_deref(), Some("owner@example.com"));
        assert_eq!(identity.by_code.load(Ordering::SeqCst), 1);
        assert_eq!(service.current().await, Some(bound.clone()));
        assert_eq!(
            service.token_cache().load().await.expect("load"),
            Some(bound)
        );
    }

    #[tokio::test]
    async fn blank_code_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));

        let err = service.authorize("  ").await.expect_err("blank code");
        assert!(matches!(err, DriveError::InvalidArgument("code")));
        assert_eq!(identity.by_code.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_cached_token_is_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));
        service.authorize("abc").await.expect("authorize");

        let token = service.refresh().await.expect("refresh").expect("token");
        assert_eq!(token.access_token, "code-abc");
        assert_eq!(identity.silent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_cached_token_is_refreshed_and_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));
        let mut stale = token("old", time::Duration::minutes(-1));
        stale.account = Some("owner@example.com".to_string());
        service.token_cache().save(&stale).await.expect("save");

        let token = service.refresh().await.expect("refresh").expect("token");

        assert_eq!(token.access_token, "silent-0");
        assert_eq!(token.account.as_deref(), Some("owner@example.com"));
        assert_eq!(identity.silent.load(Ordering::SeqCst), 1);
        assert_eq!(
            service.token_cache().load().await.expect("load"),
            Some(token)
        );
    }

    #[tokio::test]
    async fn cached_token_of_another_account_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (identity, service) = service(&dir.path().join("token.json"));
        let mut foreign = token("old", time::Duration::minutes(-1));
        foreign.account = Some("someone@example.com".to_string());
        service.token_cache().save(&foreign).await.expect("save");

        let err = service.refresh().await.expect_err("mismatch");
        assert!(matches!(err, DriveError::AccountMismatch { .. }));
        assert_eq!(identity.silent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn graph_base_url_targets_v1() {
        let service = TokenService::new(
            &settings(Path::new("token.json")),
            Arc::new(FakeIdentity::default()),
        );
        assert_eq!(service.graph_base_url(), "https://graph.microsoft.com/v1.0");
    }

    #[test]
    fn disabled_settings_do_not_build_a_service() {
        let mut settings = settings(Path::new("token.json"));
        settings.enabled = false;

        assert!(matches!(
            TokenService::from_settings(&settings),
            Err(DriveError::Disabled)
        ));
    }
}

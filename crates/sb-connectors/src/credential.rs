//! Credential lifecycle: login exchanges and the cached, expiring credential
//! each connector attaches to its data calls.

use crate::http::{HttpRequest, Transport};
use crate::secure_string::SecureString;
use crate::traits::{ConnectorError, ConnectorResult};
use crate::xml;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A credential is refreshed this long before it actually expires.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Default CrowdStrike token lifetime when the response omits `expires_in`.
pub const DEFAULT_OAUTH_TTL: Duration = Duration::from_secs(1800);

/// Default Splunk session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on any credential lifetime, whatever the backend reports.
pub const MAX_CREDENTIAL_TTL: Duration = Duration::from_secs(86_400);

/// Called with the value of each newly obtained credential.
pub type SecretObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// A bearer token, session key or API key with an optional expiry.
#[derive(Debug, Clone)]
pub struct Credential {
    token: SecureString,
    expires_at: Option<Instant>,
}

impl Credential {
    /// Creates a credential that expires `ttl` from now, with `ttl` capped
    /// at [`MAX_CREDENTIAL_TTL`].
    pub fn expiring(token: SecureString, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_CREDENTIAL_TTL))
            .unwrap_or(now);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Creates a credential that never expires.
    pub fn permanent(token: SecureString) -> Self {
        Self {
            token,
            expires_at: None,
        }
    }

    /// Returns the token.
    pub fn token(&self) -> &SecureString {
        &self.token
    }

    /// Returns true if the credential can still be attached to a request.
    pub fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() + EXPIRY_MARGIN < expires_at,
            None => true,
        }
    }
}

/// Obtains a new credential from a backend.
#[async_trait]
pub trait LoginExchange: Send + Sync {
    /// Performs the exchange. Failures are reported as
    /// [`ConnectorError::Authentication`].
    async fn login(&self) -> ConnectorResult<Credential>;
}

/// A preconfigured key used as-is (MISP API key, Splunk token).
pub struct StaticKey {
    key: SecureString,
}

impl StaticKey {
    /// Wraps a key.
    pub fn new(key: SecureString) -> Self {
        Self { key }
    }
}

#[async_trait]
impl LoginExchange for StaticKey {
    async fn login(&self) -> ConnectorResult<Credential> {
        if self.key.is_empty() {
            return Err(ConnectorError::Authentication(
                "no API key configured".to_string(),
            ));
        }
        Ok(Credential::permanent(self.key.clone()))
    }
}

/// OAuth2 client-credentials exchange against `/oauth2/token`.
pub struct OAuthClientCredentials {
    transport: Arc<dyn Transport>,
    client_id: String,
    client_secret: SecureString,
    member_cid: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl OAuthClientCredentials {
    /// Token endpoint path.
    pub const TOKEN_PATH: &'static str = "/oauth2/token";

    /// Creates the exchange.
    pub fn new(
        transport: Arc<dyn Transport>,
        client_id: String,
        client_secret: SecureString,
        member_cid: Option<String>,
    ) -> Self {
        Self {
            transport,
            client_id,
            client_secret,
            member_cid,
        }
    }
}

#[async_trait]
impl LoginExchange for OAuthClientCredentials {
    async fn login(&self) -> ConnectorResult<Credential> {
        info!("Requesting new OAuth2 access token");

        let mut form = vec![
            ("client_id".to_string(), self.client_id.clone()),
            (
                "client_secret".to_string(),
                self.client_secret.expose_secret().to_string(),
            ),
        ];
        if let Some(cid) = self.member_cid.as_ref().filter(|c| !c.is_empty()) {
            form.push(("member_cid".to_string(), cid.clone()));
        }

        let response = self
            .transport
            .send(HttpRequest::post(Self::TOKEN_PATH).form(form))
            .await
            .map_err(|e| ConnectorError::Authentication(e.to_string()))?;

        if response.status != 200 && response.status != 201 {
            return Err(ConnectorError::Authentication(format!(
                "token request returned status {}",
                response.status
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|_| ConnectorError::Authentication("unreadable token response".into()))?;

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ConnectorError::Authentication("token response has no access_token".into())
            })?;
        let ttl = parsed
            .expires_in
            .map(|secs| Duration::from_secs(secs).min(MAX_CREDENTIAL_TTL))
            .unwrap_or(DEFAULT_OAUTH_TTL);

        debug!(ttl_secs = ttl.as_secs(), "OAuth2 access token obtained");
        Ok(Credential::expiring(SecureString::new(token), ttl))
    }
}

/// Username/password login against `/services/auth/login`.
pub struct SplunkSessionLogin {
    transport: Arc<dyn Transport>,
    username: String,
    password: SecureString,
    session_ttl: Duration,
}

impl SplunkSessionLogin {
    /// Login endpoint path.
    pub const LOGIN_PATH: &'static str = "/services/auth/login";

    /// Creates the exchange.
    pub fn new(
        transport: Arc<dyn Transport>,
        username: String,
        password: SecureString,
        session_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            username,
            password,
            session_ttl,
        }
    }

    fn session_key(body: &str) -> Option<String> {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            return value
                .get("sessionKey")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
        xml::element_text(body, "sessionKey").ok().flatten()
    }
}

#[async_trait]
impl LoginExchange for SplunkSessionLogin {
    async fn login(&self) -> ConnectorResult<Credential> {
        info!(username = %self.username, "Logging in to Splunk");

        let request = HttpRequest::post(Self::LOGIN_PATH).form([
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret()),
        ]);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ConnectorError::Authentication(e.to_string()))?;

        if !response.is_success() {
            return Err(ConnectorError::Authentication(format!(
                "login returned status {}",
                response.status
            )));
        }

        let key = Self::session_key(&response.body).ok_or_else(|| {
            ConnectorError::Authentication("login response has no session key".into())
        })?;

        Ok(Credential::expiring(SecureString::new(key), self.session_ttl))
    }
}

/// Holds the current credential for one connector and refreshes it on demand.
pub struct CredentialManager {
    exchange: Arc<dyn LoginExchange>,
    slot: RwLock<Option<Credential>>,
    observer: OnceCell<SecretObserver>,
}

impl CredentialManager {
    /// Creates a manager with an empty slot.
    pub fn new(exchange: Arc<dyn LoginExchange>) -> Self {
        Self {
            exchange,
            slot: RwLock::new(None),
            observer: OnceCell::new(),
        }
    }

    /// Registers a callback that sees every credential value this manager
    /// obtains. Only the first observer is kept.
    pub fn observe_with(&self, observer: SecretObserver) {
        if self.observer.set(observer).is_err() {
            debug!("Secret observer already registered");
        }
    }

    /// Returns a token that is outside the expiry margin, logging in first
    /// if the cached one is missing or stale.
    pub async fn ensure_valid(&self) -> ConnectorResult<SecureString> {
        {
            let slot = self.slot.read().await;
            if let Some(credential) = slot.as_ref().filter(|c| c.is_fresh()) {
                return Ok(credential.token().clone());
            }
        }

        let mut slot = self.slot.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(credential) = slot.as_ref().filter(|c| c.is_fresh()) {
            return Ok(credential.token().clone());
        }

        match self.exchange.login().await {
            Ok(credential) => {
                let token = credential.token().clone();
                if let Some(observer) = self.observer.get() {
                    observer(token.expose_secret());
                }
                *slot = Some(credential);
                Ok(token)
            }
            Err(e) => {
                *slot = None;
                warn!(error_kind = e.kind(), "Login exchange failed");
                Err(match e {
                    ConnectorError::Authentication(_) => e,
                    other => ConnectorError::Authentication(other.to_string()),
                })
            }
        }
    }

    /// Drops the cached credential so the next call logs in again.
    pub async fn invalidate(&self) {
        debug!("Invalidating cached credential");
        *self.slot.write().await = None;
    }

    /// Tears down the credential on shutdown.
    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        if slot.take().is_some() {
            info!("Cleared cached credential");
        }
    }

    /// Returns true if a credential is cached, fresh or not.
    pub async fn has_credential(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;

    fn oauth(mock: Arc<MockTransport>) -> CredentialManager {
        CredentialManager::new(Arc::new(OAuthClientCredentials::new(
            mock,
            "client".to_string(),
            SecureString::from("secret"),
            None,
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_reused_until_margin() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            201,
            r#"{"access_token": "tok-1", "expires_in": 1800}"#,
        )
        .await;
        let manager = oauth(mock.clone());

        let first = manager.ensure_valid().await.unwrap();
        tokio::time::advance(Duration::from_secs(1000)).await;
        let second = manager.ensure_valid().await.unwrap();

        assert_eq!(first.expose_secret(), "tok-1");
        assert_eq!(second.expose_secret(), "tok-1");
        assert_eq!(mock.count(Method::POST, OAuthClientCredentials::TOKEN_PATH).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_refreshed_inside_margin() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            200,
            r#"{"access_token": "tok-1", "expires_in": 1800}"#,
        )
        .await;
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            200,
            r#"{"access_token": "tok-2", "expires_in": 1800}"#,
        )
        .await;
        let manager = oauth(mock.clone());

        manager.ensure_valid().await.unwrap();
        // 30s before expiry is inside the 60s margin.
        tokio::time::advance(Duration::from_secs(1770)).await;
        let refreshed = manager.ensure_valid().await.unwrap();

        assert_eq!(refreshed.expose_secret(), "tok-2");
        assert_eq!(mock.count(Method::POST, OAuthClientCredentials::TOKEN_PATH).await, 2);
    }

    #[tokio::test]
    async fn test_oauth_form_fields() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            201,
            r#"{"access_token": "tok"}"#,
        )
        .await;
        let manager = CredentialManager::new(Arc::new(OAuthClientCredentials::new(
            mock.clone(),
            "client".to_string(),
            SecureString::from("secret"),
            Some("cid-1".to_string()),
        )));
        manager.ensure_valid().await.unwrap();

        let calls = mock.calls().await;
        assert_eq!(calls[0].form_value("client_id"), Some("client"));
        assert_eq!(calls[0].form_value("client_secret"), Some("secret"));
        assert_eq!(calls[0].form_value("member_cid"), Some("cid-1"));
    }

    #[tokio::test]
    async fn test_oauth_rejected_is_authentication_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            401,
            r#"{"errors": [{"message": "access denied"}]}"#,
        )
        .await;
        let manager = oauth(mock);

        let result = manager.ensure_valid().await;
        assert!(matches!(result, Err(ConnectorError::Authentication(_))));
        assert!(!manager.has_credential().await);
    }

    #[tokio::test]
    async fn test_transport_failure_during_login_is_authentication_error() {
        let mock = Arc::new(MockTransport::new());
        let manager = oauth(mock);
        assert!(matches!(
            manager.ensure_valid().await,
            Err(ConnectorError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_splunk_session_login_xml() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            SplunkSessionLogin::LOGIN_PATH,
            200,
            "<response>\n  <sessionKey>sess-42</sessionKey>\n</response>",
        )
        .await;
        let manager = CredentialManager::new(Arc::new(SplunkSessionLogin::new(
            mock.clone(),
            "admin".to_string(),
            SecureString::from("changeme"),
            DEFAULT_SESSION_TTL,
        )));

        let key = manager.ensure_valid().await.unwrap();
        assert_eq!(key.expose_secret(), "sess-42");

        let calls = mock.calls().await;
        assert_eq!(calls[0].form_value("username"), Some("admin"));
        assert_eq!(calls[0].form_value("password"), Some("changeme"));
    }

    #[tokio::test]
    async fn test_splunk_session_login_missing_key() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            SplunkSessionLogin::LOGIN_PATH,
            200,
            "<response><messages/></response>",
        )
        .await;
        let manager = CredentialManager::new(Arc::new(SplunkSessionLogin::new(
            mock,
            "admin".to_string(),
            SecureString::from("changeme"),
            DEFAULT_SESSION_TTL,
        )));
        assert!(matches!(
            manager.ensure_valid().await,
            Err(ConnectorError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            200,
            r#"{"access_token": "tok"}"#,
        )
        .await;
        let manager = oauth(mock.clone());

        manager.ensure_valid().await.unwrap();
        manager.invalidate().await;
        assert!(!manager.has_credential().await);
        manager.ensure_valid().await.unwrap();
        assert_eq!(mock.count(Method::POST, OAuthClientCredentials::TOKEN_PATH).await, 2);

        manager.clear().await;
        assert!(!manager.has_credential().await);
    }

    #[tokio::test]
    async fn test_static_key() {
        let manager = CredentialManager::new(Arc::new(StaticKey::new(SecureString::from("k"))));
        assert_eq!(manager.ensure_valid().await.unwrap().expose_secret(), "k");

        let empty = CredentialManager::new(Arc::new(StaticKey::new(SecureString::default())));
        assert!(matches!(
            empty.ensure_valid().await,
            Err(ConnectorError::Authentication(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_expires_in_is_capped() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            201,
            r#"{"access_token": "tok", "expires_in": 18446744073709551615}"#,
        )
        .await;
        let manager = oauth(mock.clone());

        assert_eq!(manager.ensure_valid().await.unwrap().expose_secret(), "tok");

        // Still cached just inside the cap, refreshed once past it.
        tokio::time::advance(MAX_CREDENTIAL_TTL - EXPIRY_MARGIN - Duration::from_secs(1)).await;
        manager.ensure_valid().await.unwrap();
        assert_eq!(mock.count(Method::POST, OAuthClientCredentials::TOKEN_PATH).await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        manager.ensure_valid().await.unwrap();
        assert_eq!(mock.count(Method::POST, OAuthClientCredentials::TOKEN_PATH).await, 2);
    }

    #[test]
    fn test_expiring_with_max_duration() {
        let credential = Credential::expiring(SecureString::from("k"), Duration::MAX);
        assert!(credential.is_fresh());
    }

    #[tokio::test]
    async fn test_observer_sees_each_new_token() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            200,
            r#"{"access_token": "tok-1"}"#,
        )
        .await;
        mock.push(
            Method::POST,
            OAuthClientCredentials::TOKEN_PATH,
            200,
            r#"{"access_token": "tok-2"}"#,
        )
        .await;
        let manager = oauth(mock);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.observe_with(Arc::new(move |token: &str| {
            sink.lock().unwrap().push(token.to_string());
        }));

        manager.ensure_valid().await.unwrap();
        manager.ensure_valid().await.unwrap();
        manager.invalidate().await;
        manager.ensure_valid().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["tok-1", "tok-2"]);
    }
}

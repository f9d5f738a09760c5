//! Credential Providers
//!
//! Bearer tokens for the metrics and log backends. A single provider is built
//! at startup and injected into every gateway; tokens are fetched lazily on
//! first use and cached per scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::GatewayError;
use crate::config::CredentialsConfig;

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECONDS: i64 = 300;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Bearer token for `scope`, or `None` when requests go out unauthenticated.
    async fn bearer_token(&self, scope: &str) -> Result<Option<String>, GatewayError>;
}

/// Scope string for an Azure resource endpoint.
pub fn scope_for(endpoint: &str) -> String {
    format!("{}/.default", endpoint.trim_end_matches('/'))
}

/// Build the provider described by configuration: client credentials when a
/// full service principal is configured, otherwise a static token, otherwise
/// anonymous.
pub fn from_config(config: &CredentialsConfig, http: reqwest::Client) -> Arc<dyn CredentialProvider> {
    match (&config.tenant_id, &config.client_id, &config.client_secret) {
        (Some(tenant), Some(client), Some(secret)) => {
            info!("Using client-secret credential for tenant {}", tenant);
            Arc::new(ClientSecretCredential::new(
                http,
                config.authority.clone(),
                tenant.clone(),
                client.clone(),
                secret.clone(),
            ))
        }
        _ => match &config.access_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(Anonymous),
        },
    }
}

/// A pre-issued token, e.g. from `az account get-access-token`.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self, _scope: &str) -> Result<Option<String>, GatewayError> {
        Ok(Some(self.token.clone()))
    }
}

/// No credentials; used against local or proxied backends.
pub struct Anonymous;

#[async_trait]
impl CredentialProvider for Anonymous {
    async fn bearer_token(&self, _scope: &str) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 client-credentials flow against Microsoft Entra ID.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            authority,
            tenant_id,
            client_id,
            client_secret,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, scope: &str) -> Result<CachedToken, GatewayError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        );

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    async fn bearer_token(&self, scope: &str) -> Result<Option<String>, GatewayError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(scope) {
            if cached.expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECONDS) > Utc::now() {
                return Ok(Some(cached.token.clone()));
            }
        }

        debug!("Fetching access token for scope {}", scope);
        let fresh = self.fetch(scope).await?;
        let token = fresh.token.clone();
        cache.insert(scope.to_string(), fresh);
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_for_endpoint() {
        assert_eq!(
            scope_for("https://management.azure.com/"),
            "https://management.azure.com/.default"
        );
        assert_eq!(
            scope_for("https://api.loganalytics.io"),
            "https://api.loganalytics.io/.default"
        );
    }

    #[tokio::test]
    async fn test_provider_selection() {
        let http = reqwest::Client::new();

        let anonymous = from_config(&CredentialsConfig::default(), http.clone());
        assert_eq!(anonymous.bearer_token("scope").await, Ok(None));

        let config = CredentialsConfig {
            access_token: Some("abc".to_string()),
            ..CredentialsConfig::default()
        };
        let static_token = from_config(&config, http);
        assert_eq!(static_token.bearer_token("scope").await, Ok(Some("abc".to_string())));
    }
}

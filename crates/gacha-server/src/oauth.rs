//! Identity provider seam and its Discord implementation.
//!
//! Login is the OAuth2 authorization-code flow: the browser is sent to
//! [`IdentityProvider::authorize_url`], comes back with a `code`, and the
//! server exchanges it for an access token that is used to read the
//! account and its server memberships.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ServerConfig;

pub const DISCORD_API_BASE: &str = "https://discord.com/api";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider url: {0}")]
    Url(String),
}

/// Account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderIdentity {
    pub id: String,
    pub username: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Trade an authorization code for an access token.
    async fn exchange(&self, code: &str) -> Result<String, ProviderError>;

    async fn fetch_identity(&self, token: &str) -> Result<ProviderIdentity, ProviderError>;

    /// Ids of the groups (Discord servers) the account belongs to.
    async fn fetch_memberships(&self, token: &str) -> Result<HashSet<String>, ProviderError>;
}

/// True when the account shares at least one group with the allow-list.
pub fn is_member_of_allowed(memberships: &HashSet<String>, allowed: &[String]) -> bool {
    allowed.iter().any(|id| memberships.contains(id))
}

#[derive(Clone)]
pub struct DiscordProvider {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Guild {
    id: String,
}

impl DiscordProvider {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DISCORD_API_BASE.to_string(),
            client_id: config.discord_client_id.clone(),
            client_secret: config.discord_client_secret.clone(),
            redirect_uri: config.discord_redirect_uri.clone(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityProvider for DiscordProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            &format!("{}/oauth2/authorize", self.api_base),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "identify guilds"),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::Url(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.api_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let token: TokenResponse = check_status(response).await?.json().await?;
        Ok(token.access_token)
    }

    async fn fetch_identity(&self, token: &str) -> Result<ProviderIdentity, ProviderError> {
        self.get_json("/users/@me", token).await
    }

    async fn fetch_memberships(&self, token: &str) -> Result<HashSet<String>, ProviderError> {
        let guilds: Vec<Guild> = self.get_json("/users/@me/guilds", token).await?;
        Ok(guilds.into_iter().map(|g| g.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DiscordProvider {
        let config = ServerConfig {
            discord_client_id: "1234".into(),
            discord_client_secret: "secret".into(),
            discord_redirect_uri: "https://wall.example/auth/callback".into(),
            ..ServerConfig::default()
        };
        DiscordProvider::new(&config)
    }

    #[test]
    fn test_authorize_url() {
        let url = Url::parse(&provider().authorize_url("nonce").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("discord.com"));
        assert_eq!(url.path(), "/api/oauth2/authorize");

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".into(), "1234".into())));
        assert!(query.contains(&("scope".into(), "identify guilds".into())));
        assert!(query.contains(&("state".into(), "nonce".into())));
        assert!(query.contains(&(
            "redirect_uri".into(),
            "https://wall.example/auth/callback".into()
        )));
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn test_api_base_override() {
        let provider = provider().with_api_base("http://127.0.0.1:9/api/");
        let url = provider.authorize_url("s").unwrap();
        assert!(url.starts_with("http://127.0.0.1:9/api/oauth2/authorize?"));
    }

    #[test]
    fn test_membership_rule() {
        let memberships: HashSet<String> = ["1".to_string(), "2".to_string()].into();
        assert!(is_member_of_allowed(&memberships, &["2".into(), "9".into()]));
        assert!(!is_member_of_allowed(&memberships, &["9".into()]));
        assert!(!is_member_of_allowed(&HashSet::new(), &["1".into()]));
    }
}

//! Firebase Authentication via the Identity Toolkit REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::{FederatedIdentity, IdentityProvider, UpstreamAccount, UpstreamError};
use crate::auth::models::FederatedProvider;

pub const IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key for the user-facing endpoints
    pub api_key: String,
    /// Needed, with `admin_token`, for lookups by email and password updates
    pub project_id: Option<String>,
    /// OAuth2 bearer token of a service account
    pub admin_token: Option<String>,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: None,
            admin_token: None,
        }
    }

    pub fn with_admin(mut self, project_id: impl Into<String>, admin_token: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self.admin_token = Some(admin_token.into());
        self
    }
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    id_token: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderInfo {
    provider_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn linked_provider(provider_id: &str) -> Option<FederatedProvider> {
    match provider_id {
        "google.com" => Some(FederatedProvider::Google),
        "apple.com" => Some(FederatedProvider::Apple),
        _ => None,
    }
}

/// Identity Toolkit client
pub struct FirebaseIdentityProvider {
    config: FirebaseConfig,
    client: Client,
    base_url: String,
}

impl FirebaseIdentityProvider {
    pub fn new(config: FirebaseConfig, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;
        log::info!(
            "Firebase identity provider ready (admin operations {})",
            if config.admin_token.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            config,
            client,
            base_url: IDENTITY_TOOLKIT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_endpoint(&self, method: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/v1/accounts:{}", self.base_url, method))
            .query(&[("key", self.config.api_key.as_str())])
    }

    fn admin_endpoint(&self, method: &str) -> Result<RequestBuilder, UpstreamError> {
        let (Some(project), Some(token)) = (&self.config.project_id, &self.config.admin_token) else {
            return Err(UpstreamError::NotConfigured("FIREBASE_PROJECT_ID and FIREBASE_ADMIN_TOKEN"));
        };

        Ok(self
            .client
            .post(format!("{}/v1/projects/{}/accounts:{}", self.base_url, project, method))
            .bearer_auth(token))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, UpstreamError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let code = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or_default();
        // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
        let code = code.split([' ', ':']).next().unwrap_or_default();

        Err(match code {
            "EMAIL_EXISTS" => UpstreamError::EmailExists,
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
                UpstreamError::InvalidCredentials
            }
            "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "INVALID_IDP_RESPONSE" => {
                UpstreamError::InvalidToken(code.to_string())
            }
            _ => {
                log::error!("Identity Toolkit error: {} - {}", status, text);
                UpstreamError::Rejected {
                    status: status.as_u16(),
                    message: code.to_string(),
                }
            }
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UpstreamAccount, UpstreamError> {
        let body: AuthResponse = self
            .call(self.user_endpoint("signUp").json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            })))
            .await?;

        Ok(UpstreamAccount {
            uid: body.local_id,
            id_token: body.id_token,
            email: body.email,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UpstreamAccount, UpstreamError> {
        let body: AuthResponse = self
            .call(self.user_endpoint("signInWithPassword").json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            })))
            .await?;

        Ok(UpstreamAccount {
            uid: body.local_id,
            id_token: body.id_token,
            email: body.email,
        })
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<FederatedIdentity, UpstreamError> {
        log::debug!("Verifying federated id token");

        let body: LookupResponse = self
            .call(self.user_endpoint("lookup").json(&json!({ "idToken": id_token })))
            .await?;

        let user = body
            .users
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::InvalidToken("no user for token".to_string()))?;

        Ok(FederatedIdentity {
            uid: user.local_id,
            email: user.email,
            name: user.display_name,
            linked_providers: user
                .provider_user_info
                .iter()
                .filter_map(|p| linked_provider(&p.provider_id))
                .collect(),
        })
    }

    async fn get_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UpstreamAccount>, UpstreamError> {
        let body: LookupResponse = self
            .call(self.admin_endpoint("lookup")?.json(&json!({ "email": [email] })))
            .await?;

        Ok(body.users.into_iter().next().map(|user| UpstreamAccount {
            uid: user.local_id,
            id_token: None,
            email: user.email,
        }))
    }

    async fn update_password(&self, uid: &str, new_password: &str) -> Result<(), UpstreamError> {
        let _: serde_json::Value = self
            .call(self.admin_endpoint("update")?.json(&json!({
                "localId": uid,
                "password": new_password,
            })))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_ids_map_to_federated_providers() {
        assert_eq!(linked_provider("google.com"), Some(FederatedProvider::Google));
        assert_eq!(linked_provider("apple.com"), Some(FederatedProvider::Apple));
        assert_eq!(linked_provider("password"), None);
    }

    #[tokio::test]
    async fn test_admin_calls_need_admin_config() {
        let provider = FirebaseIdentityProvider::new(
            FirebaseConfig::new("key"),
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(matches!(
            provider.get_account_by_email("a@b.co").await,
            Err(UpstreamError::NotConfigured(_))
        ));
        assert!(matches!(
            provider.update_password("uid", "Password123").await,
            Err(UpstreamError::NotConfigured(_))
        ));
    }
}

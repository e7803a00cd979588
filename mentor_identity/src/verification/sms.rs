//! Phone channel backed by the Twilio Verify v2 API.
//!
//! Twilio generates, delivers and checks the code; only the verification
//! SID is kept locally.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::models::{PendingSecret, VerificationPurpose};
use super::provider::{CodeProvider, ProviderError};
use crate::identifier::{Identifier, IdentifierKind};

pub const TWILIO_VERIFY_BASE_URL: &str = "https://verify.twilio.com";

#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Verify service SID (`VA...`)
    pub service_id: String,
}

impl TwilioConfig {
    /// Read `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN` and
    /// `TWILIO_VERIFY_SERVICE_ID`; `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Some(Self {
            account_sid: var("TWILIO_ACCOUNT_SID")?,
            auth_token: var("TWILIO_AUTH_TOKEN")?,
            service_id: var("TWILIO_VERIFY_SERVICE_ID")?,
        })
    }
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("service_id", &self.service_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct VerificationCheckResponse {
    status: String,
}

pub struct TwilioVerifyProvider {
    config: TwilioConfig,
    client: Client,
    base_url: String,
}

impl TwilioVerifyProvider {
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            config,
            client,
            base_url: TWILIO_VERIFY_BASE_URL.to_string(),
        })
    }

    /// Point the client at another host (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/v2/Services/{}/{}",
            self.base_url, self.config.service_id, resource
        )
    }

    async fn post_form(
        &self,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, ProviderError> {
        Ok(self
            .client
            .post(self.url(resource))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?)
    }
}

async fn rejected(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    log::warn!("Twilio Verify returned {}: {}", status, message);
    ProviderError::Rejected { status, message }
}

#[async_trait]
impl CodeProvider for TwilioVerifyProvider {
    fn channel(&self) -> IdentifierKind {
        IdentifierKind::Phone
    }

    async fn send(
        &self,
        identifier: &Identifier,
        _purpose: VerificationPurpose,
    ) -> Result<PendingSecret, ProviderError> {
        let response = self
            .post_form(
                "Verifications",
                &[("To", identifier.normalized()), ("Channel", "sms")],
            )
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: VerificationResponse = response.json().await?;
        log::debug!("Twilio verification {} is {}", body.sid, body.status);

        Ok(PendingSecret::ProviderReference(body.sid))
    }

    async fn verify(
        &self,
        identifier: &Identifier,
        code: &str,
        _secret: &PendingSecret,
    ) -> Result<bool, ProviderError> {
        let response = self
            .post_form(
                "VerificationCheck",
                &[("To", identifier.normalized()), ("Code", code.trim())],
            )
            .await?;

        // Twilio answers 404 once a verification expired, was approved or
        // hit its own attempt limit.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: VerificationCheckResponse = response.json().await?;
        Ok(body.status == "approved")
    }
}

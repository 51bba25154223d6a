use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

/// IdentityProvider
///
/// The external service that owns identities and issues their tokens. This
/// service never authenticates anyone itself; it only delegates the session
/// operations the provider exposes. Swapped for `MockIdentityProvider` in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Ends the session behind `access_token` at the provider.
    async fn sign_out(&self, access_token: &str) -> AppResult<()>;
}

/// SupabaseAuthClient
///
/// Calls the hosted backend's auth API (`/auth/v1/*`).
#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    /// sign_out
    ///
    /// POST `/auth/v1/logout` with the user's own token. Any transport error or
    /// non-success status is an `Upstream` failure.
    async fn sign_out(&self, access_token: &str) -> AppResult<()> {
        let url = format!("{}/auth/v1/logout", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("identity provider unreachable: {:?}", e);
                AppError::Upstream("identity provider unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(%status, "identity provider refused sign-out");
            return Err(AppError::Upstream(format!(
                "identity provider refused sign-out ({status})"
            )));
        }

        Ok(())
    }
}

/// MockIdentityProvider
///
/// In-memory provider for handler and router tests.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    /// When true, every call fails as if the provider were down.
    pub should_fail: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_out(&self, _access_token: &str) -> AppResult<()> {
        if self.should_fail {
            return Err(AppError::Upstream(
                "mock identity provider failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// IdentityProviderState
///
/// Shared handle to the provider inside `AppState`.
pub type IdentityProviderState = Arc<dyn IdentityProvider>;

//! REST clients for the token backend.
//!
//! Three leaf clients share one [`HttpBackend`]:
//! - [`credentials`] exchanges application credentials for a bearer token and
//!   an SDK token
//! - [`directory`] lists the lockers that are available for drop-off
//! - [`tokens`] requests a one-time open command for a locker
//!
//! The coordinator only sees the [`LockerBackend`] trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{BackendConfig, Credentials, DropoffConfig};
use crate::types::{AccessTokens, DropoffToken, Locker, LockerId};

pub mod credentials;
pub mod directory;
pub mod tokens;

/// Errors raised by the REST clients.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// An endpoint URL could not be formed.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    /// The request never produced a response.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        /// Endpoint path relative to the base URL.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint path relative to the base URL.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        /// Endpoint path relative to the base URL.
        endpoint: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

/// Result alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The token backend as seen by the coordinator.
#[async_trait]
pub trait LockerBackend: Send + Sync {
    /// Exchange `credentials` for a bearer token and an SDK token.
    async fn authenticate(&self, credentials: &Credentials) -> BackendResult<AccessTokens>;

    /// Lockers of `tower_id` whose status is "available", in backend order.
    async fn available_lockers(
        &self,
        tower_id: &str,
        bearer_token: &str,
    ) -> BackendResult<Vec<Locker>>;

    /// Request a one-time open command for `locker_id`.
    async fn create_dropoff_token(
        &self,
        tower_id: &str,
        locker_id: LockerId,
        bearer_token: &str,
    ) -> BackendResult<DropoffToken>;
}

/// reqwest-backed implementation of [`LockerBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    authorize_user_id: String,
    dropoff: DropoffConfig,
}

impl HttpBackend {
    /// Build a client for the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Client`] if the TLS backend cannot be set up.
    pub fn new(config: &BackendConfig, dropoff: &DropoffConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(BackendError::Client)?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(config.base_url.clone()),
            authorize_user_id: config.authorize_user_id.clone(),
            dropoff: dropoff.clone(),
        })
    }

    /// Base URL every endpoint is joined onto.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send `request` and decode a JSON body from a 2xx response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> BackendResult<T> {
        debug!(endpoint, "Calling backend");

        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|source| BackendError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl LockerBackend for HttpBackend {
    async fn authenticate(&self, credentials: &Credentials) -> BackendResult<AccessTokens> {
        self.retrieve_credentials(credentials).await
    }

    async fn available_lockers(
        &self,
        tower_id: &str,
        bearer_token: &str,
    ) -> BackendResult<Vec<Locker>> {
        self.lockers_in_tower(tower_id, bearer_token).await
    }

    async fn create_dropoff_token(
        &self,
        tower_id: &str,
        locker_id: LockerId,
        bearer_token: &str,
    ) -> BackendResult<DropoffToken> {
        self.request_dropoff_token(tower_id, locker_id, bearer_token)
            .await
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

//! Token issuer client.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendResult, HttpBackend};
use crate::types::{DropoffToken, LockerId};

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_info: &'a str,
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    payload: String,
    payload_auth: String,
}

impl HttpBackend {
    /// Request a one-time drop-off token for `locker_id` in `tower_id`.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx responses and malformed bodies.
    pub async fn request_dropoff_token(
        &self,
        tower_id: &str,
        locker_id: LockerId,
        bearer_token: &str,
    ) -> BackendResult<DropoffToken> {
        let endpoint = format!("towers/{tower_id}/lockers/{locker_id}/dropoff-locker-tokens");
        let url = self.endpoint(&endpoint)?;
        let request = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .json(&TokenRequest {
                client_info: &self.dropoff.client_info,
                duration: self.dropoff.token_duration_secs,
            });

        let response: TokenResponse = self.send_json(&endpoint, request).await?;
        debug!(tower_id, locker_id, "Issued drop-off token");

        Ok(DropoffToken {
            tower_id: tower_id.to_string(),
            locker_id,
            payload: response.payload,
            payload_auth: response.payload_auth,
        })
    }
}

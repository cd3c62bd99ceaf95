//! Locker directory client.
//!
//! Only lockers in "available" status are safe drop-off targets, so the
//! filter here is part of the contract rather than a convenience.

use serde::Deserialize;
use tracing::debug;

use super::{BackendResult, HttpBackend};
use crate::types::{Locker, LockerId};

const AVAILABLE_STATUS: &str = "available";

#[derive(Debug, Deserialize)]
struct LockerRecord {
    id: LockerId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: Option<LockerStatus>,
}

#[derive(Debug, Deserialize)]
struct LockerStatus {
    name: String,
}

impl LockerRecord {
    fn is_available(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.name == AVAILABLE_STATUS)
    }
}

impl HttpBackend {
    /// Available lockers of `tower_id`. The id is lowercased in the URL.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx responses and malformed bodies.
    pub async fn lockers_in_tower(
        &self,
        tower_id: &str,
        bearer_token: &str,
    ) -> BackendResult<Vec<Locker>> {
        let endpoint = format!("towers/{}/lockers", tower_id.to_lowercase());
        let url = self.endpoint(&endpoint)?;
        let records: Vec<LockerRecord> = self
            .send_json(&endpoint, self.client.get(url).bearer_auth(bearer_token))
            .await?;

        let total = records.len();
        let available = available_only(records);
        debug!(total, available = available.len(), "Fetched locker directory");

        Ok(available)
    }
}

fn available_only(records: Vec<LockerRecord>) -> Vec<Locker> {
    records
        .into_iter()
        .filter(LockerRecord::is_available)
        .map(|record| Locker {
            id: record.id,
            name: record.name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::backend_for;
    use crate::backend::BackendError;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_only_available_lockers_are_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/towers/00aa11bb22cc33dd/lockers"))
            .and(header("authorization", "Bearer api-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "A1", "status": {"name": "available"}},
                {"id": 2, "name": "A2", "status": {"name": "closed"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let lockers = backend_for(&server)
            .lockers_in_tower("00AA11BB22CC33DD", "api-token")
            .await
            .unwrap();

        assert_eq!(
            lockers,
            vec![Locker {
                id: 1,
                name: "A1".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_order_is_preserved_and_missing_status_excluded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/towers/00aa11bb22cc33dd/lockers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 9, "name": "C3", "status": {"name": "available"}},
                {"id": 4, "name": "B1"},
                {"id": 3, "name": "A3", "status": {"name": "available"}},
                {"id": 5, "name": "B2", "status": {"name": "occupied"}}
            ])))
            .mount(&server)
            .await;

        let lockers = backend_for(&server)
            .lockers_in_tower("00aa11bb22cc33dd", "api-token")
            .await
            .unwrap();

        let ids: Vec<LockerId> = lockers.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![9, 3]);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .lockers_in_tower("00aa11bb22cc33dd", "api-token")
            .await
            .unwrap_err();

        match err {
            BackendError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"lockers": []})))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .lockers_in_tower("00aa11bb22cc33dd", "api-token")
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Decode { .. }));
    }
}

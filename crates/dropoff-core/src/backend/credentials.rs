//! Credential client.
//!
//! Two calls: a form-encoded login that yields the bearer token, then an
//! authorize call that trades the bearer token for the SDK token.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{BackendResult, HttpBackend};
use crate::config::Credentials;
use crate::types::AccessTokens;

const LOGIN_PATH: &str = "login/access-token";
const AUTHORIZE_PATH: &str = "login/authorize";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    access_token: String,
}

impl HttpBackend {
    /// Log in with `credentials`, then authorize SDK usage.
    ///
    /// # Errors
    ///
    /// Fails if either call fails; no partial tokens are returned.
    pub async fn retrieve_credentials(
        &self,
        credentials: &Credentials,
    ) -> BackendResult<AccessTokens> {
        let login = self.login(credentials).await?;
        let authorized = self.authorize(&login.access_token).await?;

        info!(grant_type = credentials.grant_type(), "Obtained backend and SDK tokens");

        Ok(AccessTokens {
            bearer_token: login.access_token,
            token_type: login.token_type,
            sdk_token: authorized.access_token,
        })
    }

    async fn login(&self, credentials: &Credentials) -> BackendResult<LoginResponse> {
        let grant_type = credentials.grant_type();
        let form: [(&str, &str); 3] = match credentials {
            Credentials::Password { username, password } => [
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("grant_type", grant_type),
            ],
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            } => [
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("grant_type", grant_type),
            ],
        };

        let url = self.endpoint(LOGIN_PATH)?;
        self.send_json(LOGIN_PATH, self.client.post(url).form(&form))
            .await
    }

    async fn authorize(&self, bearer_token: &str) -> BackendResult<AuthorizeResponse> {
        let url = self.endpoint(AUTHORIZE_PATH)?;
        let request = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .json(&AuthorizeRequest {
                user_id: &self.authorize_user_id,
            });
        self.send_json(AUTHORIZE_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::backend_for;
    use crate::backend::BackendError;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_credentials() -> Credentials {
        Credentials::ClientCredentials {
            client_id: "demo-client".into(),
            client_secret: "s3cret".into(),
        }
    }

    async fn mount_authorize(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/login/authorize"))
            .and(header("authorization", "Bearer api-token"))
            .and(body_json(json!({"userId": "test-run"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sdk-token"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_client_credentials_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/access-token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=demo-client"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "api-token",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_authorize(&server).await;

        let tokens = backend_for(&server)
            .retrieve_credentials(&client_credentials())
            .await
            .unwrap();

        assert_eq!(
            tokens,
            AccessTokens {
                bearer_token: "api-token".into(),
                token_type: "bearer".into(),
                sdk_token: "sdk-token".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_password_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/access-token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=me%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "api-token"
            })))
            .mount(&server)
            .await;
        mount_authorize(&server).await;

        let credentials = Credentials::Password {
            username: "me@example.com".into(),
            password: "hunter2".into(),
        };
        let tokens = backend_for(&server)
            .retrieve_credentials(&credentials)
            .await
            .unwrap();

        assert_eq!(tokens.token_type, "bearer");
        assert_eq!(tokens.sdk_token, "sdk-token");
    }

    #[tokio::test]
    async fn test_rejected_login_skips_authorize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/access-token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/authorize"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .retrieve_credentials(&client_credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_failed_authorize_fails_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "api-token",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .retrieve_credentials(&client_credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Decode { .. }));
    }
}

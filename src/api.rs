//! `reqwest` implementations of the backend traits.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, LicenseConfig};
use crate::error::Error;
use crate::gate::StartupGate;
use crate::license::{FeatureFlag, GrantHandle};
use crate::session::SessionManager;
use crate::traits::{
    AccountApi, AppVersionResponse, KeyValueStore, LicenseApi, LicenseResponse, VersionApi,
};
use crate::types::{BearerToken, Profile, Registration, SignIn, SignInResponse};
use crate::update::VersionCheck;

/// Header carrying the license grant token.
pub const GRANT_HEADER: &str = "X-V";

const BAD_CREDENTIALS: &str = "Invalid email or password";
const BAD_CODE: &str = "Invalid or expired code.";

#[derive(Serialize)]
struct VerifyEmail<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct ResendCode<'a> {
    email: &'a str,
}

/// Portal backend client.
///
/// Sends `Authorization: Bearer` where a token applies and `X-V` whenever
/// the shared [`GrantHandle`] holds a grant.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    grant: GrantHandle,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            grant: GrantHandle::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Read grant tokens from `grant` (usually the license check's handle).
    #[must_use]
    pub fn with_grant_handle(mut self, grant: GrantHandle) -> Self {
        self.grant = grant;
        self
    }

    #[must_use]
    pub fn grant_handle(&self) -> &GrantHandle {
        &self.grant
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&BearerToken>,
    ) -> Result<RequestBuilder, Error> {
        let mut request = self
            .http
            .request(method, self.config.endpoint(path)?)
            .header(ACCEPT, "application/json")
            .timeout(self.config.request_timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }
        if let Some(grant) = self.grant.get() {
            request = request.header(GRANT_HEADER, grant.as_str());
        }
        Ok(request)
    }
}

impl AccountApi for ApiClient {
    async fn sign_in(&self, credentials: &SignIn) -> Result<SignInResponse, Error> {
        let response = self
            .request(Method::POST, "/auth/login", None)?
            .json(credentials)
            .send()
            .await?;
        let response = ensure_success(response, "sign in", Some(BAD_CREDENTIALS)).await?;
        Ok(response.json().await?)
    }

    async fn register(&self, registration: &Registration) -> Result<(), Error> {
        let response = self
            .request(Method::POST, "/auth/register", None)?
            .json(registration)
            .send()
            .await?;
        ensure_success(response, "registration", Some("Registration failed")).await?;
        Ok(())
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<(), Error> {
        let response = self
            .request(Method::POST, "/auth/verify-email", None)?
            .json(&VerifyEmail { email, code })
            .send()
            .await?;
        ensure_success(response, "email verification", Some(BAD_CODE)).await?;
        Ok(())
    }

    async fn resend_verification_code(&self, email: &str) -> Result<(), Error> {
        let response = self
            .request(Method::POST, "/auth/resend-verification-code", None)?
            .json(&ResendCode { email })
            .send()
            .await?;
        ensure_success(response, "code resend", Some("Could not resend code.")).await?;
        Ok(())
    }

    async fn me(&self, token: &BearerToken) -> Result<Profile, Error> {
        let response = self
            .request(Method::GET, "/auth/me", Some(token))?
            .send()
            .await?;
        let response = ensure_success(response, "session check", None).await?;
        Ok(response.json().await?)
    }

    async fn deactivate(&self, token: &BearerToken) -> Result<(), Error> {
        let response = self
            .request(Method::PATCH, "/users/me/deactivate", Some(token))?
            .send()
            .await?;
        ensure_success(response, "account deactivation", None).await?;
        Ok(())
    }
}

impl VersionApi for ApiClient {
    async fn fetch_app_version(&self) -> Result<AppVersionResponse, Error> {
        let response = self
            .request(Method::GET, "/app-version", None)?
            .send()
            .await?;
        let response = ensure_success(response, "app version check", None).await?;
        Ok(response.json().await?)
    }
}

/// License ("V") endpoint client: `GET <url>?client=<client_id>`.
#[derive(Clone)]
pub struct LicenseClient {
    license: LicenseConfig,
    timeout: Duration,
    http: reqwest::Client,
}

impl LicenseClient {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            license: config.license.clone(),
            timeout: config.request_timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl LicenseApi for LicenseClient {
    async fn fetch_license(&self) -> Result<LicenseResponse, Error> {
        let (Some(url), Some(client_id)) = (&self.license.url, &self.license.client_id) else {
            return Err(Error::Config("license endpoint is not configured".into()));
        };
        let mut url = url.clone();
        url.query_pairs_mut().append_pair("client", client_id);

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        let response = ensure_success(response, "license check", None).await?;
        Ok(response.json().await?)
    }
}

/// Startup gate wired to the real backend.
pub type HttpGate<K> = StartupGate<LicenseClient, ApiClient, ApiClient, K>;

impl<K: KeyValueStore> StartupGate<LicenseClient, ApiClient, ApiClient, K> {
    /// Build the gate, session manager and checks from one config, sharing
    /// the grant token between the license check and the backend client.
    #[must_use]
    pub fn over_http(config: &ClientConfig, kv: Arc<K>) -> Self {
        let grant = GrantHandle::new();
        let api = Arc::new(ApiClient::new(config.clone()).with_grant_handle(grant.clone()));
        let flag = FeatureFlag::new(Arc::new(LicenseClient::new(config)), config)
            .with_grant_handle(grant);
        let versions = VersionCheck::new(api.clone(), kv.clone(), config);
        let sessions = SessionManager::new(api, kv, config);
        Self::new(Arc::new(flag), Arc::new(versions), sessions, config)
    }
}

/// Checks HTTP response status; returns the response on success or an error
/// carrying the backend's message, else `fallback`, else the status reason.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
    fallback: Option<&'static str>,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        operation,
        status: status.as_u16(),
        message: error_message(status, &body, fallback),
    })
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<ErrorMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

/// `{"message": "..."}` or `{"message": ["...", "..."]}`. Anything else
/// yields `fallback`, or the status reason when the call has none.
fn error_message(status: StatusCode, body: &str, fallback: Option<&'static str>) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(ErrorMessage::One(m)),
        }) => m,
        Ok(ErrorBody {
            message: Some(ErrorMessage::Many(m)),
        }) => m.join(". "),
        _ => fallback
            .or_else(|| status.canonical_reason())
            .unwrap_or("Request failed")
            .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_backend_text() {
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, r#"{"message": "Account locked"}"#, None),
            "Account locked"
        );
    }

    #[test]
    fn error_message_joins_validation_lists() {
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"message": ["email must be an email", "password is too short"]}"#,
                Some("Registration failed"),
            ),
            "email must be an email. password is too short"
        );
    }

    #[test]
    fn error_message_falls_back_to_reason() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "<html>", None), "Bad Gateway");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, "{}", None), "Bad Request");
        assert_eq!(
            error_message(StatusCode::from_u16(599).unwrap(), "", None),
            "Request failed"
        );
    }

    #[test]
    fn error_message_prefers_operation_fallback_over_reason() {
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, "", Some(BAD_CREDENTIALS)),
            "Invalid email or password"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, "{}", Some(BAD_CODE)),
            BAD_CODE
        );
    }

    #[test]
    fn endpoint_joins_base_without_double_slash() {
        let config = ClientConfig::new(
            "http://backend.test/api/".parse().unwrap(),
            "1.0.0".into(),
        );
        let client = ApiClient::new(config);
        let request = client
            .request(Method::GET, "/auth/me", Some(&BearerToken::from("t")))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://backend.test/api/auth/me");
        assert_eq!(request.headers()["authorization"], "Bearer t");
        assert!(request.headers().get(GRANT_HEADER).is_none());
    }

    #[test]
    fn grant_header_follows_handle() {
        let config = ClientConfig::new("http://backend.test".parse().unwrap(), "1.0.0".into());
        let grant = GrantHandle::new();
        let client = ApiClient::new(config).with_grant_handle(grant.clone());
        let build = || {
            client
                .request(Method::GET, "/app-version", None)
                .unwrap()
                .build()
                .unwrap()
        };

        assert!(build().headers().get(GRANT_HEADER).is_none());

        grant.set(Some("g-1".into()));
        let request = build();
        assert_eq!(request.headers()[GRANT_HEADER], "g-1");
        assert!(request.headers().get("authorization").is_none());

        grant.set(None);
        assert!(build().headers().get(GRANT_HEADER).is_none());
    }
}

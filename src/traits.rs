use std::future::Future;

use serde::Deserialize;

use crate::error::Error;
use crate::types::{BearerToken, Profile, Registration, SignIn, SignInResponse};

/// Consumer-provided persistent string storage.
///
/// Mirrors the key-value storage a mobile shell already has (AsyncStorage,
/// SharedPreferences, Keychain wrappers). Writes replace the whole value.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStore for Prefs {
///     async fn get(&self, key: &str) -> Result<Option<String>, Error> {
///         Ok(self.inner.string(key))
///     }
///     async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
///         self.inner.put_string(key, value).map_err(|e| Error::Store(e.to_string()))
///     }
///     async fn remove(&self, keys: &[&str]) -> Result<(), Error> {
///         keys.iter().for_each(|k| self.inner.remove(k));
///         Ok(())
///     }
/// }
/// ```
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Error>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Remove every key in `keys` in one write.
    fn remove(&self, keys: &[&str]) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Account endpoints of the portal backend.
///
/// Implemented by [`ApiClient`](crate::ApiClient); tests substitute fakes.
pub trait AccountApi: Send + Sync + 'static {
    /// `POST /auth/login`.
    fn sign_in(
        &self,
        credentials: &SignIn,
    ) -> impl Future<Output = Result<SignInResponse, Error>> + Send;

    /// `POST /auth/register`.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// `POST /auth/verify-email` with the 6-digit code mailed after
    /// registration.
    fn verify_email(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// `POST /auth/resend-verification-code`.
    fn resend_verification_code(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// `GET /auth/me`. 401/403 surface as [`Error::Api`] with that status.
    fn me(&self, token: &BearerToken) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// `PATCH /users/me/deactivate`.
    fn deactivate(&self, token: &BearerToken) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Remote license ("V") endpoint.
pub trait LicenseApi: Send + Sync + 'static {
    fn fetch_license(&self) -> impl Future<Output = Result<LicenseResponse, Error>> + Send;
}

/// App-version policy endpoint.
pub trait VersionApi: Send + Sync + 'static {
    fn fetch_app_version(&self) -> impl Future<Output = Result<AppVersionResponse, Error>> + Send;
}

/// License endpoint payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LicenseResponse {
    #[serde(default)]
    pub licensed: bool,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl LicenseResponse {
    #[must_use]
    pub fn new(licensed: bool, access_token: Option<String>) -> Self {
        Self {
            licensed,
            access_token,
        }
    }
}

/// `/app-version` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AppVersionResponse {
    pub minimum_version: String,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub store_url_android: Option<String>,
    #[serde(default)]
    pub store_url_ios: Option<String>,
}

impl AppVersionResponse {
    #[must_use]
    pub fn new(minimum_version: impl Into<String>) -> Self {
        Self {
            minimum_version: minimum_version.into(),
            latest_version: None,
            store_url_android: None,
            store_url_ios: None,
        }
    }

    #[must_use]
    pub fn with_latest_version(mut self, version: impl Into<String>) -> Self {
        self.latest_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_store_urls(mut self, android: Option<String>, ios: Option<String>) -> Self {
        self.store_url_android = android;
        self.store_url_ios = ios;
        self
    }
}

use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::version::AppVersion;

/// Play Store listing used when the server names no store link.
pub const DEFAULT_STORE_URL: &str = "https://play.google.com/store/apps/details?id=com.fgeha.app";

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Which store link the version endpoint's answer resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

impl std::str::FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(Error::Config(format!("unknown platform: {other}"))),
        }
    }
}

/// License ("V") endpoint settings.
///
/// An unset endpoint or client id makes every non-bypassed check fail.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct LicenseConfig {
    pub(crate) url: Option<Url>,
    pub(crate) client_id: Option<String>,
    pub(crate) bypass: bool,
}

impl LicenseConfig {
    #[must_use]
    pub fn new(url: Url, client_id: impl Into<String>) -> Self {
        Self {
            url: Some(url),
            client_id: Some(client_id.into()),
            bypass: false,
        }
    }

    /// Skip the remote check entirely (local development builds).
    #[must_use]
    pub fn bypassed() -> Self {
        Self {
            bypass: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.client_id.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Client configuration.
///
/// Required fields are constructor parameters. Everything else has a default
/// and a `with_*` override.
///
/// ```rust,ignore
/// use rsp_client::{AppVersion, ClientConfig};
///
/// let config = ClientConfig::new("https://rsp.example.org".parse()?, AppVersion::parse("1.4.0"))
///     .with_watchdog(std::time::Duration::from_secs(15));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_url: Url,
    pub(crate) app_version: AppVersion,
    pub(crate) platform: Platform,
    pub(crate) default_store_url: String,
    pub(crate) license: LicenseConfig,
    pub(crate) request_timeout: Duration,
    pub(crate) flag_freshness: Duration,
    pub(crate) watchdog: Duration,
    pub(crate) min_display: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: Url, app_version: AppVersion) -> Self {
        Self {
            api_url,
            app_version,
            platform: Platform::default(),
            default_store_url: DEFAULT_STORE_URL.into(),
            license: LicenseConfig::default(),
            request_timeout: Duration::from_secs(10),
            flag_freshness: Duration::from_secs(6 * 60 * 60),
            watchdog: Duration::from_secs(12),
            min_display: Duration::from_millis(1500),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `RSP_API_URL`: backend base URL (default `http://localhost:8080`)
    /// - `RSP_APP_VERSION`: bundled app version (default `0.0.0`)
    /// - `RSP_PLATFORM`: `android` or `ios` (default `android`)
    /// - `RSP_STORE_URL`: store link used when the server names none
    /// - `RSP_LICENSE_URL`, `RSP_LICENSE_CLIENT_ID`: license endpoint
    /// - `RSP_LICENSE_ACTIVATED`, `RSP_LICENSE_BYPASS`: bypass switch. Debug
    ///   builds bypass when `RSP_LICENSE_ACTIVATED` is `1` or `true`; any build
    ///   bypasses when it equals a non-empty `RSP_LICENSE_BYPASS`.
    /// - `RSP_REQUEST_TIMEOUT_SECS`: per-request timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL, platform or number does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_url = var("RSP_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let api_url = parse_url("RSP_API_URL", &api_url)?;
        let app_version = var("RSP_APP_VERSION").unwrap_or_else(|| "0.0.0".into());
        let app_version = AppVersion::parse(&app_version);

        let mut config = Self::new(api_url, app_version);

        if let Some(platform) = var("RSP_PLATFORM") {
            config = config.with_platform(platform.parse()?);
        }
        if let Some(store_url) = var("RSP_STORE_URL") {
            config = config.with_default_store_url(store_url);
        }
        if let Some(secs) = var("RSP_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("RSP_REQUEST_TIMEOUT_SECS: {e}")))?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        let mut license = LicenseConfig::default();
        if let Some(url) = var("RSP_LICENSE_URL").filter(|u| !u.is_empty()) {
            license.url = Some(parse_url("RSP_LICENSE_URL", &url)?);
        }
        license.client_id = var("RSP_LICENSE_CLIENT_ID").filter(|c| !c.is_empty());

        let activated = var("RSP_LICENSE_ACTIVATED").unwrap_or_default();
        let secret = var("RSP_LICENSE_BYPASS").unwrap_or_default();
        license.bypass = (cfg!(debug_assertions) && matches!(activated.as_str(), "1" | "true"))
            || (!secret.is_empty() && activated == secret);

        Ok(config.with_license(license))
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_default_store_url(mut self, url: impl Into<String>) -> Self {
        self.default_store_url = url.into();
        self
    }

    #[must_use]
    pub fn with_license(mut self, license: LicenseConfig) -> Self {
        self.license = license;
        self
    }

    /// Per-request network timeout (default 10 s).
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long a successful license check is reused (default 6 h).
    #[must_use]
    pub fn with_flag_freshness(mut self, freshness: Duration) -> Self {
        self.flag_freshness = freshness;
        self
    }

    /// Backstop for the whole startup check (default 12 s).
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Minimum time the startup screen stays up (default 1.5 s). Zero disables it.
    #[must_use]
    pub fn with_min_display(mut self, min_display: Duration) -> Self {
        self.min_display = min_display;
        self
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn app_version(&self) -> &AppVersion {
        &self.app_version
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn default_store_url(&self) -> &str {
        &self.default_store_url
    }

    #[must_use]
    pub fn license(&self) -> &LicenseConfig {
        &self.license
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn flag_freshness(&self) -> Duration {
        self.flag_freshness
    }

    #[must_use]
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    #[must_use]
    pub fn min_display(&self) -> Duration {
        self.min_display
    }

    /// `path` resolved against the API base URL, ignoring trailing slashes
    /// on the base.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.api_url.as_str().trim_end_matches('/');
        parse_url("endpoint", &format!("{base}{path}"))
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}

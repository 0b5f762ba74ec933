//! App-version policy: forced and optional updates.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientConfig, Platform};
use crate::error::Error;
use crate::store::DismissedVersions;
use crate::traits::{AppVersionResponse, KeyValueStore, VersionApi};
use crate::version::AppVersion;

const UNAVAILABLE: &str = "Connection timed out or unavailable.";

/// Outcome of comparing the running app against the server's policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionStatus {
    Ok,
    /// Below the minimum supported version. Blocks the app; only the store
    /// link is offered.
    UpdateRequired {
        store_url: String,
        minimum_version: AppVersion,
    },
    /// A newer release exists and the user has not dismissed it.
    UpdateAvailable {
        store_url: String,
        latest_version: AppVersion,
    },
    Fail { message: String },
}

pub struct VersionCheck<V, K> {
    api: Arc<V>,
    dismissed: DismissedVersions<K>,
    platform: Platform,
    default_store_url: String,
    timeout: Duration,
}

impl<V: VersionApi, K: KeyValueStore> VersionCheck<V, K> {
    #[must_use]
    pub fn new(api: Arc<V>, kv: Arc<K>, config: &ClientConfig) -> Self {
        Self {
            api,
            dismissed: DismissedVersions::new(kv),
            platform: config.platform,
            default_store_url: config.default_store_url.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Fetch the policy and classify `current` against it.
    ///
    /// Network failures, timeouts and malformed answers yield
    /// [`VersionStatus::Fail`], never `Ok`.
    pub async fn check(&self, current: &AppVersion) -> VersionStatus {
        let response = match tokio::time::timeout(self.timeout, self.api.fetch_app_version()).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "App version check failed");
                return VersionStatus::Fail {
                    message: UNAVAILABLE.into(),
                };
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "App version check timed out");
                return VersionStatus::Fail {
                    message: UNAVAILABLE.into(),
                };
            }
        };

        let minimum = AppVersion::parse(&response.minimum_version);
        let latest = response
            .latest_version
            .as_deref()
            .map_or_else(|| minimum.clone(), AppVersion::parse);
        let store_url = self.store_url(&response);

        if current < &minimum {
            tracing::info!(%current, %minimum, "App update required");
            return VersionStatus::UpdateRequired {
                store_url,
                minimum_version: minimum,
            };
        }
        if current < &latest {
            if self.dismissed.is_dismissed(&latest).await {
                tracing::debug!(%latest, "Optional update previously dismissed");
                return VersionStatus::Ok;
            }
            return VersionStatus::UpdateAvailable {
                store_url,
                latest_version: latest,
            };
        }
        VersionStatus::Ok
    }

    /// Remember "Later" for exactly this version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the marker cannot be persisted.
    pub async fn dismiss(&self, latest: &AppVersion) -> Result<(), Error> {
        self.dismissed.dismiss(latest).await
    }

    fn store_url(&self, response: &AppVersionResponse) -> String {
        let url = match self.platform {
            Platform::Android => response.store_url_android.as_deref(),
            Platform::Ios => response.store_url_ios.as_deref(),
        };
        url.filter(|u| !u.is_empty())
            .unwrap_or(self.default_store_url.as_str())
            .to_owned()
    }
}

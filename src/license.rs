//! Remote license ("V") check: may this app run at all?

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{ClientConfig, LicenseConfig};
use crate::traits::LicenseApi;
use crate::types::GrantToken;

const UNAVAILABLE: &str = "Connection timed out or unavailable.";

/// Result of a license check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    Ok,
    /// Denied, unconfigured or unreachable. `message` is only set when there
    /// is something useful to tell the user.
    Fail { message: Option<String> },
}

impl FlagOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Shared slot holding the current grant token.
///
/// [`FeatureFlag`] writes it; [`ApiClient`](crate::ApiClient) reads it to
/// attach the `X-V` header.
#[derive(Debug, Clone, Default)]
pub struct GrantHandle(Arc<RwLock<Option<GrantToken>>>);

impl GrantHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<GrantToken> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set(&self, grant: Option<GrantToken>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = grant;
    }
}

#[derive(Debug, Clone, Copy)]
struct Allowed {
    at: Instant,
}

/// License check with an in-memory freshness window.
///
/// Only an allowed result is cached. A denial or failure clears the cache,
/// so the next check always goes back to the network.
pub struct FeatureFlag<L> {
    api: Arc<L>,
    license: LicenseConfig,
    timeout: Duration,
    freshness: Duration,
    cached: RwLock<Option<Allowed>>,
    grant: GrantHandle,
}

impl<L: LicenseApi> FeatureFlag<L> {
    #[must_use]
    pub fn new(api: Arc<L>, config: &ClientConfig) -> Self {
        Self {
            api,
            license: config.license.clone(),
            timeout: config.request_timeout,
            freshness: config.flag_freshness,
            cached: RwLock::new(None),
            grant: GrantHandle::new(),
        }
    }

    /// Share an existing grant slot (typically the one held by `ApiClient`).
    #[must_use]
    pub fn with_grant_handle(mut self, grant: GrantHandle) -> Self {
        self.grant = grant;
        self
    }

    #[must_use]
    pub fn grant_handle(&self) -> &GrantHandle {
        &self.grant
    }

    /// Grant from the last allowed check, if the server issued one.
    #[must_use]
    pub fn grant_token(&self) -> Option<GrantToken> {
        if self.license.bypass {
            return None;
        }
        self.grant.get()
    }

    /// Run the check, reusing a fresh allowed result.
    pub async fn check(&self) -> FlagOutcome {
        if self.license.bypass {
            tracing::debug!("License check bypassed");
            self.store(Some(Allowed { at: Instant::now() }), None);
            return FlagOutcome::Ok;
        }
        if !self.license.is_configured() {
            tracing::warn!("License endpoint is not configured");
            return FlagOutcome::Fail { message: None };
        }

        let now = Instant::now();
        if let Some(allowed) = self.cached() {
            if now.saturating_duration_since(allowed.at) < self.freshness {
                return FlagOutcome::Ok;
            }
        }

        match tokio::time::timeout(self.timeout, self.api.fetch_license()).await {
            Ok(Ok(response)) if response.licensed => {
                let grant = response.access_token.map(GrantToken::from);
                self.store(Some(Allowed { at: now }), grant);
                tracing::debug!("License check allowed");
                FlagOutcome::Ok
            }
            Ok(Ok(_)) => {
                self.store(None, None);
                tracing::warn!("License check denied");
                FlagOutcome::Fail { message: None }
            }
            Ok(Err(e)) => {
                self.store(None, None);
                tracing::warn!(error = %e, "License check failed");
                FlagOutcome::Fail {
                    message: Some(UNAVAILABLE.into()),
                }
            }
            Err(_) => {
                self.store(None, None);
                tracing::warn!(timeout = ?self.timeout, "License check timed out");
                FlagOutcome::Fail {
                    message: Some(UNAVAILABLE.into()),
                }
            }
        }
    }

    /// Forget any cached result so the next check hits the network.
    pub fn clear_cache(&self) {
        self.store(None, None);
    }

    fn cached(&self) -> Option<Allowed> {
        *self.cached.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, allowed: Option<Allowed>, grant: Option<GrantToken>) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = allowed;
        self.grant.set(grant);
    }
}

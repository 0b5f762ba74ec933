//! Startup gate: hold navigation until the license and version checks agree.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::license::{FeatureFlag, FlagOutcome};
use crate::session::{Revalidation, SessionManager};
use crate::traits::{AccountApi, KeyValueStore, LicenseApi, VersionApi};
use crate::types::Session;
use crate::update::{VersionCheck, VersionStatus};
use crate::version::AppVersion;

const TRY_LATER: &str = "Please try again later.";
const WATCHDOG_EXPIRED: &str = "Startup checks timed out. Please try again.";

/// Combined state of the startup checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Checking,
    /// Blocking; offer Retry.
    Fail { message: String },
    /// Blocking and terminal; offer only the store link.
    UpdateRequired {
        store_url: String,
        minimum_version: AppVersion,
    },
    /// Dismissible prompt over the normal app.
    UpdateAvailable {
        store_url: String,
        latest_version: AppVersion,
    },
    Ok,
}

impl GateStatus {
    /// Whether the app may leave the startup screen.
    #[must_use]
    pub fn permits_navigation(&self) -> bool {
        matches!(self, Self::Ok | Self::UpdateAvailable { .. })
    }

    /// Whether Retry can change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    fn combine(flag: FlagOutcome, version: VersionStatus) -> Self {
        if let FlagOutcome::Fail { message } = flag {
            return Self::Fail {
                message: message.unwrap_or_else(|| TRY_LATER.into()),
            };
        }
        match version {
            VersionStatus::Ok => Self::Ok,
            VersionStatus::UpdateRequired {
                store_url,
                minimum_version,
            } => Self::UpdateRequired {
                store_url,
                minimum_version,
            },
            VersionStatus::UpdateAvailable {
                store_url,
                latest_version,
            } => Self::UpdateAvailable {
                store_url,
                latest_version,
            },
            VersionStatus::Fail { message } => Self::Fail { message },
        }
    }
}

/// Where the app goes once the gate opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    MainApp,
    /// Signed in, waiting for admin approval.
    Pending,
    SignIn,
}

impl Destination {
    #[must_use]
    pub fn for_session(session: &Session) -> Self {
        if !session.is_signed_in() {
            return Self::SignIn;
        }
        match session.profile() {
            Some(p) if !p.is_active() => Self::SignIn,
            Some(p) if p.is_approved() => Self::MainApp,
            _ => Self::Pending,
        }
    }
}

/// Result of one gate run.
#[derive(Debug)]
pub struct GateOutcome {
    pub status: GateStatus,
    /// Session restored from storage at the start of the run.
    pub session: Session,
    /// Background revalidation of `session`. The gate never waits on it;
    /// await it to react to a late sign-out or profile refresh.
    pub revalidation: JoinHandle<Revalidation>,
}

/// Startup orchestrator.
///
/// Restores the cached session, starts its revalidation in the background,
/// and runs the license and version checks concurrently under a watchdog.
/// A license failure wins over any version result.
pub struct StartupGate<L, V, A, K> {
    flag: Arc<FeatureFlag<L>>,
    versions: Arc<VersionCheck<V, K>>,
    sessions: SessionManager<A, K>,
    app_version: AppVersion,
    watchdog: Duration,
    min_display: Duration,
    status: watch::Sender<GateStatus>,
    started_at: Mutex<Instant>,
}

impl<L, V, A, K> StartupGate<L, V, A, K>
where
    L: LicenseApi,
    V: VersionApi,
    A: AccountApi,
    K: KeyValueStore,
{
    #[must_use]
    pub fn new(
        flag: Arc<FeatureFlag<L>>,
        versions: Arc<VersionCheck<V, K>>,
        sessions: SessionManager<A, K>,
        config: &ClientConfig,
    ) -> Self {
        let (status, _) = watch::channel(GateStatus::Checking);
        Self {
            flag,
            versions,
            sessions,
            app_version: config.app_version.clone(),
            watchdog: config.watchdog,
            min_display: config.min_display,
            status,
            started_at: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn status(&self) -> GateStatus {
        self.status.borrow().clone()
    }

    /// Follow status changes (e.g. to drive the startup screen).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GateStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn feature_flag(&self) -> &FeatureFlag<L> {
        &self.flag
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager<A, K> {
        &self.sessions
    }

    /// Run the startup checks.
    ///
    /// Restoring the cached session counts against the same watchdog as the
    /// checks. If storage does not answer in time the run fails with a
    /// signed-out session.
    pub async fn run(&self) -> GateOutcome {
        let started_at = Instant::now();
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = started_at;
        self.status.send_replace(GateStatus::Checking);

        let deadline = started_at + self.watchdog;
        let restore = async {
            let session = self.sessions.restore().await;
            let revalidation = {
                let sessions = self.sessions.clone();
                let session = session.clone();
                tokio::spawn(async move { sessions.revalidate(&session).await })
            };
            (session, revalidation)
        };
        let (restored, status) = tokio::join!(
            tokio::time::timeout_at(deadline, restore),
            self.evaluate(deadline)
        );

        let (session, revalidation, status) = match restored {
            Ok((session, revalidation)) => (session, revalidation, status),
            Err(_) => {
                tracing::warn!(watchdog = ?self.watchdog, "Restoring the session did not finish");
                let status = GateStatus::Fail {
                    message: WATCHDOG_EXPIRED.into(),
                };
                let revalidation = tokio::spawn(std::future::ready(Revalidation::NoSession));
                (Session::empty(), revalidation, status)
            }
        };
        tracing::debug!(?status, "Startup gate resolved");
        self.status.send_replace(status.clone());

        GateOutcome {
            status,
            session,
            revalidation,
        }
    }

    /// User-triggered retry: drop cached license state, then run again.
    pub async fn retry(&self) -> GateOutcome {
        self.flag.clear_cache();
        self.run().await
    }

    /// "Later" on the optional-update prompt. Persists the dismissal for the
    /// surfaced version and opens the gate. No-op in any other state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the dismissal cannot be persisted; the
    /// status is left unchanged.
    pub async fn dismiss_update(&self) -> Result<(), Error> {
        let GateStatus::UpdateAvailable { latest_version, .. } = self.status() else {
            return Ok(());
        };
        self.versions.dismiss(&latest_version).await?;
        tracing::debug!(%latest_version, "Optional update dismissed");
        self.status.send_replace(GateStatus::Ok);
        Ok(())
    }

    /// Destination for `session` once the gate permits navigation, held back
    /// until the startup screen has been up for the minimum display time.
    /// `None` while checking or blocked.
    pub async fn navigate(&self, session: &Session) -> Option<Destination> {
        if !self.status().permits_navigation() {
            return None;
        }
        let started_at = *self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        tokio::time::sleep_until(started_at + self.min_display).await;
        Some(Destination::for_session(session))
    }

    async fn evaluate(&self, deadline: Instant) -> GateStatus {
        let checks = async {
            tokio::join!(self.flag.check(), self.versions.check(&self.app_version))
        };
        match tokio::time::timeout_at(deadline, checks).await {
            Ok((flag, version)) => GateStatus::combine(flag, version),
            Err(_) => {
                tracing::warn!(watchdog = ?self.watchdog, "Startup checks did not finish");
                GateStatus::Fail {
                    message: WATCHDOG_EXPIRED.into(),
                }
            }
        }
    }
}

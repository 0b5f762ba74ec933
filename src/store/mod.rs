//! Session and dismissal persistence on top of a [`KeyValueStore`].

#[cfg(feature = "fs")]
mod file;
mod memory;

use std::sync::Arc;

use tokio::sync::Mutex;

#[cfg(feature = "fs")]
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Error;
use crate::traits::KeyValueStore;
use crate::types::{BearerToken, Profile, Session};
use crate::version::AppVersion;

pub(crate) const TOKEN_KEY: &str = "token";
pub(crate) const USER_KEY: &str = "user";
pub(crate) const DISMISS_KEY_PREFIX: &str = "forceUpdateDismissed_";

/// Persisted session: the bearer token under `token`, the cached profile as
/// JSON under `user`.
///
/// Clones share one write lock, so a conditional write from a background
/// revalidation cannot interleave with a sign-in or sign-out.
pub struct SessionStore<K> {
    kv: Arc<K>,
    lock: Arc<Mutex<()>>,
}

impl<K> Clone for SessionStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            lock: self.lock.clone(),
        }
    }
}

impl<K: KeyValueStore> SessionStore<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load the cached session. Never fails.
    ///
    /// A cached profile that does not parse discards the whole session, so a
    /// token is never trusted without its profile. Storage errors read as
    /// signed out.
    pub async fn load(&self) -> Session {
        let token = match self.kv.get(TOKEN_KEY).await {
            Ok(Some(t)) if !t.is_empty() => BearerToken::from(t),
            Ok(_) => return Session::empty(),
            Err(e) => {
                tracing::warn!(error = %e, "Reading cached token failed");
                return Session::empty();
            }
        };

        let raw_profile = match self.kv.get(USER_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Reading cached profile failed");
                return Session::empty();
            }
        };

        match raw_profile {
            None => Session::signed_in(token, None),
            Some(raw) => match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) => Session::signed_in(token, Some(profile)),
                Err(e) => {
                    tracing::warn!(error = %e, "Cached profile is corrupt; discarding session");
                    if let Err(e) = self.clear().await {
                        tracing::warn!(error = %e, "Clearing corrupt session failed");
                    }
                    Session::empty()
                }
            },
        }
    }

    /// Persist `session`, replacing whatever was stored.
    ///
    /// The old session is removed first and the token is written last, so a
    /// failed write leaves storage signed out rather than pairing the new
    /// token with a previous user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store rejects a write.
    pub async fn save(&self, session: &Session) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.kv.remove(&[TOKEN_KEY, USER_KEY]).await?;
        let Some(token) = session.token() else {
            return Ok(());
        };
        if let Some(profile) = session.profile() {
            self.kv.set(USER_KEY, &serde_json::to_string(profile)?).await?;
        }
        self.kv.set(TOKEN_KEY, token.as_str()).await
    }

    /// Overwrite only the cached profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store rejects the write.
    pub async fn save_profile(&self, profile: &Profile) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.kv.set(USER_KEY, &serde_json::to_string(profile)?).await
    }

    /// Overwrite the cached profile only while `token` is still the stored
    /// token. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store fails.
    pub async fn save_profile_for(
        &self,
        token: &BearerToken,
        profile: &Profile,
    ) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        if !self.holds(token).await? {
            return Ok(false);
        }
        self.kv.set(USER_KEY, &serde_json::to_string(profile)?).await?;
        Ok(true)
    }

    /// Remove token and profile together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store rejects the removal.
    pub async fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.kv.remove(&[TOKEN_KEY, USER_KEY]).await
    }

    /// Remove the session only while `token` is still the stored token.
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store fails.
    pub async fn clear_for(&self, token: &BearerToken) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        if !self.holds(token).await? {
            return Ok(false);
        }
        self.kv.remove(&[TOKEN_KEY, USER_KEY]).await?;
        Ok(true)
    }

    async fn holds(&self, token: &BearerToken) -> Result<bool, Error> {
        let stored = self.kv.get(TOKEN_KEY).await?;
        Ok(stored.as_deref() == Some(token.as_str()))
    }
}

/// Persisted "Later" choices on the optional-update prompt, one marker per
/// exact latest-version string.
pub struct DismissedVersions<K> {
    kv: Arc<K>,
}

impl<K> Clone for DismissedVersions<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<K: KeyValueStore> DismissedVersions<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    /// Whether the user dismissed exactly this version string.
    ///
    /// Storage errors read as "not dismissed".
    pub async fn is_dismissed(&self, version: &AppVersion) -> bool {
        match self.kv.get(&dismiss_key(version)).await {
            Ok(v) => v.as_deref() == Some("1"),
            Err(e) => {
                tracing::warn!(error = %e, version = %version, "Reading update dismissal failed");
                false
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the marker cannot be written.
    pub async fn dismiss(&self, version: &AppVersion) -> Result<(), Error> {
        self.kv.set(&dismiss_key(version), "1").await
    }
}

fn dismiss_key(version: &AppVersion) -> String {
    format!("{DISMISS_KEY_PREFIX}{}", version.as_str())
}

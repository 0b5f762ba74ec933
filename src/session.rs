//! Session lifecycle: restore, revalidate, sign in, sign out.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::store::SessionStore;
use crate::traits::{AccountApi, KeyValueStore};
use crate::types::{BearerToken, Profile, Registration, Session, SignIn};

/// Server verdict on a stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(Profile),
    /// 401 or 403. Expired tokens and deactivated accounts look the same.
    Unauthorized,
    /// Anything that says nothing about the credential itself.
    NetworkError(String),
}

/// Checks a token against `GET /auth/me`.
pub struct SessionValidator<A> {
    api: Arc<A>,
    timeout: Duration,
}

impl<A> Clone for SessionValidator<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            timeout: self.timeout,
        }
    }
}

impl<A: AccountApi> SessionValidator<A> {
    #[must_use]
    pub fn new(api: Arc<A>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn validate(&self, token: &BearerToken) -> Validation {
        match tokio::time::timeout(self.timeout, self.api.me(token)).await {
            Ok(Ok(profile)) => Validation::Valid(profile),
            Ok(Err(e)) if e.is_auth_rejection() => Validation::Unauthorized,
            Ok(Err(e)) => Validation::NetworkError(e.to_string()),
            Err(_) => Validation::NetworkError(Error::Timeout("session check").to_string()),
        }
    }
}

/// What revalidation did to the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    /// No token stored; nothing was sent.
    NoSession,
    /// Profile refreshed and persisted.
    Refreshed(Session),
    /// Server rejected the token; local session destroyed.
    SignedOut,
    /// Server unreachable; cached session kept as is.
    Offline(Session),
    /// The stored session changed (sign-out or another sign-in) while the
    /// check was in flight. Nothing was written.
    Superseded,
}

/// Owns the persisted session and the calls that create or destroy it.
pub struct SessionManager<A, K> {
    api: Arc<A>,
    store: SessionStore<K>,
    validator: SessionValidator<A>,
}

impl<A, K> Clone for SessionManager<A, K> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            store: self.store.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<A: AccountApi, K: KeyValueStore> SessionManager<A, K> {
    #[must_use]
    pub fn new(api: Arc<A>, kv: Arc<K>, config: &ClientConfig) -> Self {
        Self {
            validator: SessionValidator::new(api.clone(), config.request_timeout),
            api,
            store: SessionStore::new(kv),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore<K> {
        &self.store
    }

    #[must_use]
    pub fn validator(&self) -> &SessionValidator<A> {
        &self.validator
    }

    /// Cached session from the last run. Never fails.
    pub async fn restore(&self) -> Session {
        self.store.load().await
    }

    /// Confirm `session` with the server and update storage to match.
    pub async fn revalidate(&self, session: &Session) -> Revalidation {
        let Some(token) = session.token() else {
            return Revalidation::NoSession;
        };

        match self.validator.validate(token).await {
            Validation::Valid(profile) => match self.store.save_profile_for(token, &profile).await {
                Ok(true) => Revalidation::Refreshed(session.clone().with_profile(profile)),
                Ok(false) => {
                    tracing::debug!("Session replaced during check; dropping refreshed profile");
                    Revalidation::Superseded
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Persisting refreshed profile failed");
                    Revalidation::Refreshed(session.clone().with_profile(profile))
                }
            },
            Validation::Unauthorized => match self.store.clear_for(token).await {
                Ok(true) => {
                    tracing::info!("Session rejected by server; signing out");
                    Revalidation::SignedOut
                }
                Ok(false) => {
                    tracing::debug!("Rejected token no longer stored; keeping current session");
                    Revalidation::Superseded
                }
                Err(e) => {
                    tracing::error!(error = %e, "Clearing rejected session failed");
                    Revalidation::SignedOut
                }
            },
            Validation::NetworkError(reason) => {
                tracing::warn!(%reason, "Session check unavailable; keeping cached session");
                Revalidation::Offline(session.clone())
            }
        }
    }

    /// Sign in and persist the new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with the backend's message on bad credentials,
    /// a transport error, or [`Error::Store`] if persisting fails.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, Error> {
        let credentials = SignIn {
            email: email.trim().to_owned(),
            password: password.to_owned(),
        };
        let response = self.api.sign_in(&credentials).await?;
        let session = Session::signed_in(response.access_token, Some(response.user));
        self.store.save(&session).await?;
        tracing::info!("Signed in");
        Ok(session)
    }

    /// Submit a registration. No session is created: the account must be
    /// approved before it can sign in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with the backend's message if rejected.
    pub async fn register(&self, registration: &Registration) -> Result<(), Error> {
        self.api.register(registration).await
    }

    /// Confirm the address given at registration with the mailed code.
    ///
    /// Only the code's digits are sent, and there must be exactly six of
    /// them (extra digits past the sixth are dropped). No session is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank email or a short code
    /// without calling the backend, or [`Error::Api`] with the backend's
    /// message.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), Error> {
        let email = required_email(email)?;
        let code: String = code.chars().filter(char::is_ascii_digit).take(6).collect();
        if code.len() != 6 {
            return Err(Error::InvalidInput("Please enter the 6-digit code from your email."));
        }
        self.api.verify_email(email, &code).await?;
        tracing::info!("Email verified");
        Ok(())
    }

    /// Ask the backend to mail a fresh verification code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank email, or the backend
    /// error.
    pub async fn resend_verification_code(&self, email: &str) -> Result<(), Error> {
        let email = required_email(email)?;
        self.api.resend_verification_code(email).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the stored session cannot be removed.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.store.clear().await?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Deactivate the signed-in account, then drop the local session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a token, or the backend/storage
    /// error. The local session is kept if the backend call fails.
    pub async fn deactivate(&self, session: &Session) -> Result<(), Error> {
        let token = session
            .token()
            .ok_or_else(|| Error::Config("deactivate requires a signed-in session".into()))?;
        self.api.deactivate(token).await?;
        tracing::info!("Account deactivated");
        self.sign_out().await
    }
}

fn required_email(email: &str) -> Result<&str, Error> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::InvalidInput("Missing email. Please go back and register again."));
    }
    Ok(email)
}

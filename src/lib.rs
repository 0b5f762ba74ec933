#![doc = include_str!("../README.md")]

#[cfg(feature = "http")]
pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod license;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;
pub mod update;
pub mod version;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use api::{ApiClient, GRANT_HEADER, HttpGate, LicenseClient};
pub use config::{ClientConfig, DEFAULT_STORE_URL, LicenseConfig, Platform};
pub use error::Error;
pub use gate::{Destination, GateOutcome, GateStatus, StartupGate};
pub use license::{FeatureFlag, FlagOutcome, GrantHandle};
pub use session::{Revalidation, SessionManager, SessionValidator, Validation};
#[cfg(feature = "fs")]
pub use store::FileStore;
pub use store::{DismissedVersions, MemoryStore, SessionStore};
pub use traits::{
    AccountApi, AppVersionResponse, KeyValueStore, LicenseApi, LicenseResponse, VersionApi,
};
pub use types::{
    AccountStatus, ApprovalStatus, BearerToken, GrantToken, Profile, Registration, Session,
    SignIn, SignInResponse, SubSector, UserId,
};
pub use update::{VersionCheck, VersionStatus};
pub use version::AppVersion;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Backend-issued bearer credential.
///
/// The only credential presented on backend calls. `Debug` is redacted so
/// the token never lands in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BearerToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Per-request grant handed out by a successful license check.
///
/// Sent as the `X-V` header on backend calls while held.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct GrantToken(String);

impl GrantToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GrantToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for GrantToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GrantToken(..)")
    }
}

/// Backend user identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Admin review state of a resident account.
///
/// Unknown values decode as `Pending`: anything not explicitly approved
/// keeps the resident out of the main app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    #[default]
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSector {
    pub id: i64,
    pub name: String,
    pub code: String,
}

/// Resident profile as returned by `/auth/me` and cached between launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub account_status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sector_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sector: Option<SubSector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl Profile {
    /// Create a profile with only the required identity fields.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            full_name: String::new(),
            role: String::new(),
            approval_status: ApprovalStatus::default(),
            account_status: AccountStatus::default(),
            phone_country_code: None,
            phone_number: None,
            house_no: None,
            street_no: None,
            sub_sector_id: None,
            sub_sector: None,
            profile_image: None,
        }
    }

    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = name.into();
        self
    }

    #[must_use]
    pub fn with_approval_status(mut self, status: ApprovalStatus) -> Self {
        self.approval_status = status;
        self
    }

    #[must_use]
    pub fn with_account_status(mut self, status: AccountStatus) -> Self {
        self.account_status = status;
        self
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.account_status == AccountStatus::Active
    }
}

/// Bearer token plus the last known profile.
///
/// A profile is only meaningful next to a token; [`Session::profile`]
/// returns `None` whenever the token is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<BearerToken>,
    profile: Option<Profile>,
}

impl Session {
    /// Signed-out session.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(token: BearerToken, profile: Option<Profile>) -> Self {
        Self {
            token: Some(token),
            profile,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&BearerToken> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.token.as_ref().and(self.profile.as_ref())
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    /// Same token, fresh profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

/// Successful `POST /auth/login` response.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct SignInResponse {
    pub access_token: BearerToken,
    pub user: Profile,
}

/// New resident registration for `POST /auth/register`.
///
/// Registration creates no session: the account waits for admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_country_code: String,
    pub phone_number: String,
    pub house_no: String,
    pub street_no: String,
    pub sub_sector_id: i64,
    /// ID card front image as a base64 data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_card_front: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_card_back: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_decodes_backend_json() {
        let json = r#"{
            "id": 7,
            "email": "resident@example.com",
            "fullName": "A Resident",
            "role": "resident",
            "approvalStatus": "approved",
            "subSector": { "id": 3, "name": "G-13/1", "code": "G131" },
            "subSectorId": 3
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, UserId(7));
        assert_eq!(profile.full_name, "A Resident");
        assert!(profile.is_approved());
        assert!(profile.is_active());
        assert_eq!(profile.sub_sector.unwrap().code, "G131");
    }

    #[test]
    fn unknown_approval_status_is_pending() {
        let json = r#"{"id": 1, "email": "a@b.c", "approvalStatus": "under_review"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.approval_status, ApprovalStatus::Pending);
    }

    #[test]
    fn approval_status_uses_lowercase_names() {
        for (status, name) in [
            (ApprovalStatus::Pending, "\"pending\""),
            (ApprovalStatus::Approved, "\"approved\""),
            (ApprovalStatus::Rejected, "\"rejected\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), name);
            assert_eq!(serde_json::from_str::<ApprovalStatus>(name).unwrap(), status);
        }
    }

    #[test]
    fn deactivated_account_status_decodes() {
        let json = r#"{"id": 1, "email": "a@b.c", "accountStatus": "deactivated"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert!(!profile.is_active());
    }

    #[test]
    fn profile_without_token_is_hidden() {
        let session = Session {
            token: None,
            profile: Some(Profile::new(UserId(1), "a@b.c")),
        };
        assert!(!session.is_signed_in());
        assert!(session.profile().is_none());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = BearerToken::from("secret-value");
        assert_eq!(format!("{token:?}"), "BearerToken(..)");
        assert_eq!(token.as_str(), "secret-value");
    }

    #[test]
    fn registration_serializes_camel_case() {
        let reg = Registration {
            full_name: "A".into(),
            email: "a@b.c".into(),
            password: "pw".into(),
            phone_country_code: "+92".into(),
            phone_number: "3001234567".into(),
            house_no: "12".into(),
            street_no: "4".into(),
            sub_sector_id: 3,
            id_card_front: None,
            id_card_back: None,
        };
        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["fullName"], "A");
        assert_eq!(json["subSectorId"], 3);
        assert!(json.get("idCardFront").is_none());
    }
}

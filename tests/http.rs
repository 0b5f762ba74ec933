#![cfg(feature = "http")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use rsp_client::{
    AccountApi, ApiClient, AppVersion, BearerToken, ClientConfig, Destination, Error, GateStatus,
    HttpGate, LicenseApi, LicenseClient, LicenseConfig, MemoryStore, Profile, Registration,
    Revalidation, Session, SessionManager, SessionStore, SignIn, UserId, VersionApi,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Requests the fake backend has seen, by route.
#[derive(Default)]
struct Seen {
    grants: Mutex<Vec<(&'static str, Option<String>)>>,
    license_clients: Mutex<Vec<String>>,
    verifications: Mutex<Vec<Value>>,
}

impl Seen {
    fn record_grant(&self, route: &'static str, headers: &HeaderMap) {
        let grant = headers
            .get("x-v")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.grants.lock().unwrap().push((route, grant));
    }

    fn grant_for(&self, route: &str) -> Option<String> {
        self.grants
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| *r == route)
            .and_then(|(_, g)| g.clone())
    }
}

type Reply = (StatusCode, Json<Value>);

fn resident() -> Value {
    json!({
        "id": 1,
        "email": "resident@example.com",
        "fullName": "A Resident",
        "role": "resident",
        "approvalStatus": "approved",
        "accountStatus": "active"
    })
}

async fn login(
    State(seen): State<Arc<Seen>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    seen.record_grant("login", &headers);
    if body["email"] == "quiet@example.com" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body["password"] == "secret" && body["email"] == "resident@example.com" {
        (
            StatusCode::OK,
            Json(json!({ "access_token": "tok-1", "user": resident() })),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Wrong password" })),
        )
            .into_response()
    }
}

async fn verify_email(State(seen): State<Arc<Seen>>, Json(body): Json<Value>) -> Response {
    seen.verifications.lock().unwrap().push(body.clone());
    if body["code"] == "482913" {
        StatusCode::OK.into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

async fn resend_code(Json(body): Json<Value>) -> Response {
    if body["email"] == "new@example.com" {
        (StatusCode::OK, Json(json!({ "message": "Code sent" }))).into_response()
    } else {
        (StatusCode::NOT_FOUND, "no such account").into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Reply {
    if body["password"].as_str().is_some_and(|p| p.len() >= 8) {
        (StatusCode::CREATED, Json(json!({ "id": 2 })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": ["password is too short", "idCardFront is required"] })),
        )
    }
}

async fn me(headers: HeaderMap) -> Reply {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth {
        "Bearer tok-1" => (StatusCode::OK, Json(resident())),
        "Bearer banned" => (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Account deactivated" })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        ),
    }
}

async fn deactivate(headers: HeaderMap) -> StatusCode {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer tok-1") => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

async fn app_version(State(seen): State<Arc<Seen>>, headers: HeaderMap) -> Reply {
    seen.record_grant("app-version", &headers);
    (
        StatusCode::OK,
        Json(json!({
            "minimumVersion": "1.0.0",
            "latestVersion": "1.2.0",
            "storeUrlAndroid": "https://play.example/rsp",
            "storeUrlIos": "https://apps.example/rsp"
        })),
    )
}

async fn license(
    State(seen): State<Arc<Seen>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let client = query.get("client").cloned().unwrap_or_default();
    seen.license_clients.lock().unwrap().push(client.clone());
    if client == "rsp-mobile" {
        (
            StatusCode::OK,
            Json(json!({ "licensed": true, "accessToken": "grant-1" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "licensed": false })))
    }
}

struct Backend {
    base: String,
    seen: Arc<Seen>,
}

impl Backend {
    async fn start() -> Self {
        let seen = Arc::new(Seen::default());
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/verify-email", post(verify_email))
            .route("/auth/resend-verification-code", post(resend_code))
            .route("/auth/me", get(me))
            .route("/users/me/deactivate", patch(deactivate))
            .route("/app-version", get(app_version))
            .route("/license", get(license))
            .with_state(seen.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            seen,
        }
    }

    fn config(&self, app_version: &str) -> ClientConfig {
        ClientConfig::new(self.base.parse().unwrap(), AppVersion::parse(app_version))
            .with_license(self.license("rsp-mobile"))
            .with_request_timeout(Duration::from_secs(5))
            .with_min_display(Duration::ZERO)
    }

    fn license(&self, client_id: &str) -> LicenseConfig {
        LicenseConfig::new(format!("{}/license", self.base).parse().unwrap(), client_id)
    }
}

#[tokio::test]
async fn sign_in_returns_token_and_profile() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    let response = client
        .sign_in(&SignIn {
            email: "resident@example.com".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();

    assert_eq!(response.access_token, BearerToken::from("tok-1"));
    assert_eq!(response.user.full_name, "A Resident");
    assert!(response.user.is_approved());
}

#[tokio::test]
async fn bad_credentials_surface_backend_message() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    let err = client
        .sign_in(&SignIn {
            email: "resident@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("Wrong password"), "unexpected error: {err}");
}

#[tokio::test]
async fn bare_login_rejection_reads_as_bad_credentials() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    let err = client
        .sign_in(&SignIn {
            email: "quiet@example.com".into(),
            password: "anything".into(),
        })
        .await
        .unwrap_err();

    match err {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn email_verification_round_trip() {
    let backend = Backend::start().await;
    let config = backend.config("1.0.0");
    let kv = Arc::new(MemoryStore::new());
    let api = Arc::new(ApiClient::new(config.clone()));
    let sessions = SessionManager::new(api, kv.clone(), &config);

    sessions
        .verify_email(" new@example.com ", "482 913")
        .await
        .unwrap();
    assert_eq!(
        *backend.seen.verifications.lock().unwrap(),
        [json!({ "email": "new@example.com", "code": "482913" })]
    );
    assert!(kv.is_empty());

    let err = sessions
        .verify_email("new@example.com", "000000")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().ends_with("Invalid or expired code."), "{err}");

    let short = sessions.verify_email("new@example.com", "4829").await;
    assert!(matches!(short, Err(Error::InvalidInput(_))));
    assert_eq!(backend.seen.verifications.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn resend_code_reports_backend_failure() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    client.resend_verification_code("new@example.com").await.unwrap();

    let err = client
        .resend_verification_code("ghost@example.com")
        .await
        .unwrap_err();
    match err {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Could not resend code.");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn me_maps_rejections_to_status() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    let profile = client.me(&BearerToken::from("tok-1")).await.unwrap();
    assert_eq!(profile.email, "resident@example.com");

    let expired = client.me(&BearerToken::from("expired")).await.unwrap_err();
    assert_eq!(expired.status(), Some(401));
    assert!(expired.is_auth_rejection());

    let banned = client.me(&BearerToken::from("banned")).await.unwrap_err();
    assert_eq!(banned.status(), Some(403));
    assert!(banned.is_auth_rejection());
}

#[tokio::test]
async fn registration_errors_join_validation_messages() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));
    let mut registration = Registration {
        full_name: "New Resident".into(),
        email: "new@example.com".into(),
        password: "short".into(),
        phone_country_code: "+92".into(),
        phone_number: "3001234567".into(),
        house_no: "12".into(),
        street_no: "4".into(),
        sub_sector_id: 3,
        id_card_front: None,
        id_card_back: None,
    };

    let err = client.register(&registration).await.unwrap_err();
    match err {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "password is too short. idCardFront is required");
        }
        other => panic!("expected Api error, got {other:?}"),
    }

    registration.password = "long-enough".into();
    client.register(&registration).await.unwrap();
}

#[tokio::test]
async fn license_client_sends_client_id() {
    let backend = Backend::start().await;
    let config = backend.config("1.0.0");

    let allowed = LicenseClient::new(&config).fetch_license().await.unwrap();
    assert!(allowed.licensed);
    assert_eq!(allowed.access_token.as_deref(), Some("grant-1"));

    let other = config.with_license(backend.license("someone-else"));
    let denied = LicenseClient::new(&other).fetch_license().await.unwrap();
    assert!(!denied.licensed);
    assert!(denied.access_token.is_none());

    assert_eq!(
        *backend.seen.license_clients.lock().unwrap(),
        ["rsp-mobile", "someone-else"]
    );
}

#[tokio::test]
async fn license_client_without_endpoint_is_config_error() {
    let backend = Backend::start().await;
    let config = backend.config("1.0.0").with_license(LicenseConfig::default());

    let err = LicenseClient::new(&config).fetch_license().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(backend.seen.license_clients.lock().unwrap().is_empty());
}

#[tokio::test]
async fn app_version_policy_parses() {
    let backend = Backend::start().await;
    let client = ApiClient::new(backend.config("1.0.0"));

    let policy = client.fetch_app_version().await.unwrap();
    assert_eq!(policy.minimum_version, "1.0.0");
    assert_eq!(policy.latest_version.as_deref(), Some("1.2.0"));
    assert_eq!(
        policy.store_url_android.as_deref(),
        Some("https://play.example/rsp")
    );
    assert_eq!(backend.seen.grant_for("app-version"), None);
}

#[tokio::test]
async fn gate_over_http_end_to_end() {
    let backend = Backend::start().await;
    let kv = Arc::new(MemoryStore::new());
    SessionStore::new(kv.clone())
        .save(&Session::signed_in(
            BearerToken::from("tok-1"),
            Some(Profile::new(UserId(1), "resident@example.com")),
        ))
        .await
        .unwrap();

    let gate = HttpGate::over_http(&backend.config("1.1.0"), kv.clone());
    let outcome = gate.run().await;

    assert_eq!(
        outcome.status,
        GateStatus::UpdateAvailable {
            store_url: "https://play.example/rsp".into(),
            latest_version: AppVersion::parse("1.2.0"),
        }
    );
    assert!(outcome.session.is_signed_in());

    // The cached profile was never approved; the server's copy is.
    let refreshed = match outcome.revalidation.await.unwrap() {
        Revalidation::Refreshed(session) => session,
        other => panic!("expected Refreshed, got {other:?}"),
    };
    assert_eq!(gate.navigate(&outcome.session).await, Some(Destination::Pending));
    assert_eq!(gate.navigate(&refreshed).await, Some(Destination::MainApp));

    gate.dismiss_update().await.unwrap();
    assert_eq!(gate.status(), GateStatus::Ok);
    assert_eq!(
        gate.feature_flag().grant_token().map(|g| g.as_str().to_owned()),
        Some("grant-1".into())
    );

    // Backend calls made after the license check carry its grant.
    gate.sessions()
        .sign_in(" resident@example.com ", "secret")
        .await
        .unwrap();
    assert_eq!(backend.seen.grant_for("login").as_deref(), Some("grant-1"));

    // The dismissal survives a fresh gate over the same storage.
    let again = HttpGate::over_http(&backend.config("1.1.0"), kv);
    assert_eq!(again.run().await.status, GateStatus::Ok);
}

#[tokio::test]
async fn denied_license_blocks_gate() {
    let backend = Backend::start().await;
    let config = backend
        .config("1.2.0")
        .with_license(backend.license("someone-else"));
    let gate = HttpGate::over_http(&config, Arc::new(MemoryStore::new()));

    let outcome = gate.run().await;
    assert_eq!(
        outcome.status,
        GateStatus::Fail {
            message: "Please try again later.".into()
        }
    );
    assert_eq!(outcome.revalidation.await.unwrap(), Revalidation::NoSession);
    assert_eq!(gate.navigate(&outcome.session).await, None);
}

#[tokio::test]
async fn deactivate_then_sign_out() {
    let backend = Backend::start().await;
    let kv = Arc::new(MemoryStore::new());
    let gate = HttpGate::over_http(&backend.config("1.2.0"), kv.clone());

    let session = gate
        .sessions()
        .sign_in("resident@example.com", "secret")
        .await
        .unwrap();
    assert!(gate.sessions().restore().await.is_signed_in());

    gate.sessions().deactivate(&session).await.unwrap();
    assert!(!gate.sessions().restore().await.is_signed_in());
    assert!(kv.is_empty());
}

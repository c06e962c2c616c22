//! Shared end-to-end fixtures
//!
//! - [`MockServer`]: in-process authorization server and metering API
//! - [`TestApp`]: the application, served on an ephemeral port
//! - certificate helpers built with `rcgen`

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::Mutex;
use rcgen::string::Ia5String;
use rcgen::{CertificateParams, CustomExtension, KeyPair, SanType};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use perseus_cap::client_config::{ClientConfig, ClientOverrides};
use perseus_cap::config::Config;
use perseus_cap::oauth::challenge_for;
use perseus_cap::routes::create_router;
use perseus_cap::state::AppState;
use perseus_cap::tls::{CertificateOverrides, SecretStore};

pub const CLIENT_ID: &str = "https://directory.example.org/a/test-client";
pub const APP_URL: &str = "http://localhost:3000";
pub const AUTH_CODE: &str = "auth-code";
pub const ACCESS_TOKEN: &str = "mock-access-token";
pub const REQUEST_URI: &str = "urn:ietf:params:oauth:request_uri:mock";
pub const COOKIE_PASSWORD: &str = "test-cookie-password-that-is-long-enough";

// ─────────────────────────────────────────────────────────────────────────────
// Certificates
// ─────────────────────────────────────────────────────────────────────────────

/// Self-signed key and certificate PEM
pub fn self_signed(name: &str) -> (String, String) {
    let params = CertificateParams::new(vec![name.to_string()]).unwrap();
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (key.serialize_pem(), cert.pem())
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag, u8::try_from(content.len()).unwrap()];
    out.extend_from_slice(content);
    out
}

/// IB1 sender certificate PEM; `None` leaves the field out
pub fn ib1_certificate(uri: Option<&str>, member: Option<&str>, roles: Option<&[&str]>) -> String {
    let mut params = CertificateParams::new(vec!["sender.example.org".to_string()]).unwrap();
    if let Some(uri) = uri {
        params
            .subject_alt_names
            .push(SanType::URI(Ia5String::try_from(uri).unwrap()));
    }
    if let Some(member) = member {
        params.custom_extensions.push(CustomExtension::from_oid_content(
            &[1, 3, 6, 1, 4, 1, 62329, 1, 3],
            tlv(0x0c, member.as_bytes()),
        ));
    }
    if let Some(roles) = roles {
        let content: Vec<u8> = roles.iter().flat_map(|r| tlv(0x0c, r.as_bytes())).collect();
        params.custom_extensions.push(CustomExtension::from_oid_content(
            &[1, 3, 6, 1, 4, 1, 62329, 1, 1],
            tlv(0x30, &content),
        ));
    }
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().pem()
}

// ─────────────────────────────────────────────────────────────────────────────
// Secret store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory secret store
#[derive(Default)]
pub struct MemoryStore {
    secrets: HashMap<String, String>,
    pub lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn with_secret(name: &str, value: &str) -> Self {
        let mut secrets = HashMap::new();
        secrets.insert(name.to_string(), value.to_string());
        Self {
            secrets,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn secret_string(&self, name: &str) -> perseus_cap::Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.secrets.get(name).cloned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock authorization server and metering API
// ─────────────────────────────────────────────────────────────────────────────

/// How the mock servers respond
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Metadata keys to drop (also dropped from the mTLS aliases)
    pub omit: Vec<&'static str>,
    /// Discovery document status
    pub metadata_status: StatusCode,
    /// PAR endpoint status
    pub par_status: StatusCode,
    /// Include `request_uri` in the PAR response
    pub par_request_uri: bool,
    /// Token endpoint status
    pub token_status: StatusCode,
    /// Datasource listing body
    pub meters: Value,
    /// Datasource listing status
    pub listing_status: StatusCode,
    /// Meter readings status
    pub readings_status: StatusCode,
    /// `oauth.idp_logout`
    pub idp_logout: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            omit: Vec::new(),
            metadata_status: StatusCode::OK,
            par_status: StatusCode::OK,
            par_request_uri: true,
            token_status: StatusCode::OK,
            meters: json!({
                "data": [
                    { "id": "meter-1", "availableMeasures": ["import", "export"] },
                    { "id": "meter-2", "availableMeasures": ["import"] }
                ]
            }),
            listing_status: StatusCode::OK,
            readings_status: StatusCode::OK,
            idp_logout: false,
        }
    }
}

/// Requests the mock servers received
#[derive(Default)]
pub struct Calls {
    pub discovery: AtomicUsize,
    pub par: Mutex<Vec<HashMap<String, String>>>,
    pub token: Mutex<Vec<HashMap<String, String>>>,
    pub resource: Mutex<Vec<(String, Option<String>)>>,
}

impl Calls {
    pub fn discovery_count(&self) -> usize {
        self.discovery.load(Ordering::SeqCst)
    }

    pub fn last_par(&self) -> HashMap<String, String> {
        self.par.lock().last().cloned().unwrap()
    }

    pub fn last_token(&self) -> HashMap<String, String> {
        self.token.lock().last().cloned().unwrap()
    }
}

struct MockState {
    base: Url,
    behavior: Behavior,
    calls: Arc<Calls>,
}

/// Running mock servers
pub struct MockServer {
    pub base: Url,
    pub calls: Arc<Calls>,
}

impl MockServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let calls = Arc::new(Calls::default());

        let state = Arc::new(MockState {
            base: base.clone(),
            behavior,
            calls: Arc::clone(&calls),
        });

        let app = Router::new()
            .route("/.well-known/oauth-authorization-server", get(mock_metadata))
            .route("/mtls/par", post(mock_par))
            .route("/mtls/token", post(mock_token))
            .route("/datasources/", get(mock_datasources))
            .route("/datasources/{id}/{measure}", get(mock_readings))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, calls }
    }

    pub fn url(&self, path: &str) -> String {
        self.base.join(path).unwrap().to_string()
    }
}

async fn mock_metadata(State(state): State<Arc<MockState>>) -> Response {
    state.calls.discovery.fetch_add(1, Ordering::SeqCst);
    if state.behavior.metadata_status != StatusCode::OK {
        return (state.behavior.metadata_status, "metadata unavailable").into_response();
    }
    let at = |path: &str| state.base.join(path).unwrap().to_string();

    let mut metadata = json!({
        "issuer": at("/"),
        "authorization_endpoint": at("/authorize"),
        "token_endpoint": at("/token"),
        "pushed_authorization_request_endpoint": at("/par"),
        "end_session_endpoint": at("/logout"),
        "code_challenge_methods_supported": ["S256"],
        "mtls_endpoint_aliases": {
            "token_endpoint": at("/mtls/token"),
            "pushed_authorization_request_endpoint": at("/mtls/par"),
        }
    });

    for key in &state.behavior.omit {
        if let Some(map) = metadata.as_object_mut() {
            map.remove(*key);
            if let Some(Value::Object(aliases)) = map.get_mut("mtls_endpoint_aliases") {
                aliases.remove(*key);
            }
        }
    }
    Json(metadata).into_response()
}

async fn mock_par(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.calls.par.lock().push(form);
    if state.behavior.par_status != StatusCode::OK {
        return (state.behavior.par_status, "invalid_client").into_response();
    }
    if state.behavior.par_request_uri {
        Json(json!({ "request_uri": REQUEST_URI, "expires_in": 60 })).into_response()
    } else {
        Json(json!({ "expires_in": 60 })).into_response()
    }
}

async fn mock_token(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.calls.token.lock().push(form.clone());

    if state.behavior.token_status != StatusCode::OK {
        return (state.behavior.token_status, "invalid_grant").into_response();
    }

    let challenge = state
        .calls
        .par
        .lock()
        .last()
        .and_then(|par| par.get("code_challenge").cloned());
    let verifier = form.get("code_verifier").cloned().unwrap_or_default();
    let code_ok = form.get("code").map(String::as_str) == Some(AUTH_CODE);

    if !code_ok || challenge.as_deref() != Some(challenge_for(&verifier).as_str()) {
        return (StatusCode::BAD_REQUEST, "invalid_grant: PKCE mismatch").into_response();
    }

    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

async fn mock_datasources(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.calls.resource.lock().push(("/datasources/".to_string(), auth));
    if state.behavior.listing_status != StatusCode::OK {
        return (state.behavior.listing_status, "listing denied").into_response();
    }
    Json(state.behavior.meters.clone()).into_response()
}

async fn mock_readings(
    State(state): State<Arc<MockState>>,
    Path((id, measure)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state
        .calls
        .resource
        .lock()
        .push((format!("/datasources/{id}/{measure}"), auth));
    if state.behavior.readings_status != StatusCode::OK {
        return (state.behavior.readings_status, "readings unavailable").into_response();
    }
    Json(json!({
        "id": id,
        "measure": measure,
        "from": query.get("from"),
        "to": query.get("to"),
        "readings": [{ "timestamp": "2024-12-05T00:00:00Z", "value": 0.42 }],
    }))
    .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Application under test
// ─────────────────────────────────────────────────────────────────────────────

/// The application on an ephemeral port, wired to a [`MockServer`]
pub struct TestApp {
    pub base: Url,
    pub http: reqwest::Client,
    pub mock: MockServer,
}

impl TestApp {
    pub async fn spawn(behavior: Behavior) -> Self {
        let idp_logout = behavior.idp_logout;
        let mock = MockServer::start(behavior).await;

        let mut config = Config::default();
        config.oauth.client_id = CLIENT_ID.to_string();
        config.oauth.app_url = APP_URL.to_string();
        config.oauth.idp_logout = idp_logout;
        config.session.password = Some(COOKIE_PASSWORD.to_string());

        let (key, cert) = self_signed("cap.test");
        let overrides = ClientOverrides {
            certificates: CertificateOverrides {
                mtls_key: Some(key),
                mtls_bundle: Some(cert),
                ca_bundle: None,
            },
            server: Some(mock.base.clone()),
            protected_resource_url: Some(mock.base.clone()),
            ..ClientOverrides::default()
        };

        let client = ClientConfig::initialize(&config, overrides, Arc::new(MemoryStore::default()))
            .await
            .unwrap();
        let state = Arc::new(AppState::new(&config, Arc::new(client)).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self { base, http, mock }
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.http.get(self.base.join(path).unwrap());
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        request.send().await.unwrap()
    }

    /// Run login and callback; returns the logged-in session cookie
    pub async fn login(&self) -> String {
        let resp = self.get("/auth/login", None).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let cookie = session_cookie(&resp).unwrap();

        let resp = self
            .get(&format!("/auth/callback?code={AUTH_CODE}"), Some(&cookie))
            .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        session_cookie(&resp).unwrap()
    }
}

/// `cap_session=...` pair from a response's `Set-Cookie`, if any
pub fn session_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("cap_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

pub fn location(resp: &reqwest::Response) -> String {
    resp.headers()[header::LOCATION].to_str().unwrap().to_string()
}

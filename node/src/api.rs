//! # REST API
//!
//! Builds the axum router that exposes the trust services over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                             | Description                          |
//! |--------|----------------------------------|--------------------------------------|
//! | GET    | `/health`                        | Liveness check                       |
//! | POST   | `/api/v1/auth/register`          | Start onboarding: send an OTP        |
//! | POST   | `/api/v1/auth/resend-otp`        | Send a fresh OTP                     |
//! | POST   | `/api/v1/auth/verify-otp`        | Validate an OTP, mark verified       |
//! | POST   | `/api/v1/identity/check`         | Is an identifier already linked?     |
//! | POST   | `/api/v1/identity/register`      | Register a DID                       |
//! | POST   | `/api/v1/identity/challenge`     | Issue a proof-of-control challenge   |
//! | POST   | `/api/v1/identity/verify-proof`  | Verify a signed challenge            |
//! | POST   | `/api/v1/identity/backup`        | Export an encrypted backup           |
//! | POST   | `/api/v1/identity/restore`       | Restore an identity from a backup    |
//! | POST   | `/api/v1/trust-token/setup`      | Bind a device to a DID               |
//!
//! Failures are rendered as `{"error": "..."}` with the generic text from
//! [`TrustError::public_message`]. The specific cause stays in the logs.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use anchor_core::backup::BackupService;
use anchor_core::identity::{DidRegistration, IdentityService};
use anchor_core::otp::OtpManager;
use anchor_core::proof::ProofAuthenticator;
use anchor_core::TrustError;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    pub otp: Arc<OtpManager>,
    pub proof: Arc<ProofAuthenticator>,
    pub identity: Arc<IdentityService>,
    pub backup: Arc<BackupService>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    fn observe(&self, route: &str, started: Instant) {
        self.metrics
            .request_latency_seconds
            .with_label_values(&[route])
            .observe(started.elapsed().as_secs_f64());
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Constructs the axum [`Router`] with all API routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let auth = Router::new()
        .route("/register", post(register_handler))
        .route("/resend-otp", post(resend_otp_handler))
        .route("/verify-otp", post(verify_otp_handler));

    let identity = Router::new()
        .route("/check", post(check_handler))
        .route("/register", post(register_did_handler))
        .route("/challenge", post(challenge_handler))
        .route("/verify-proof", post(verify_proof_handler))
        .route("/backup", post(backup_handler))
        .route("/restore", post(restore_handler));

    let trust_token = Router::new().route("/setup", post(trust_token_setup_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1/auth", auth)
        .nest("/api/v1/identity", identity)
        .nest("/api/v1/trust-token", trust_token)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A handler failure: a status code and a message safe to show the caller.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            TrustError::Expired.public_message(),
        )
    }
}

/// Maps each error kind to its HTTP status.
pub fn status_for(err: &TrustError) -> StatusCode {
    match err {
        TrustError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        TrustError::NotFound(_) => StatusCode::NOT_FOUND,
        TrustError::Expired | TrustError::InvalidChallenge | TrustError::AuthenticationFailure => {
            StatusCode::UNAUTHORIZED
        }
        TrustError::InvalidFormat(_) | TrustError::InvalidChannel(_) | TrustError::NotVerified => {
            StatusCode::BAD_REQUEST
        }
        TrustError::AlreadyExists(_) => StatusCode::CONFLICT,
        TrustError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        TrustError::InternalCryptoError(_) | TrustError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<TrustError> for ApiError {
    fn from(err: TrustError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, "request rejected");
        }
        Self::new(status, err.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub identifier: String,
    pub channel: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpResponse {
    pub message: &'static str,
    pub expires_in: u64,
    pub otp_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub identifier: String,
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDidRequest {
    pub did: String,
    pub public_key: String,
    #[serde(default)]
    pub verified_identifier: Option<String>,
    #[serde(default)]
    pub offline_created: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterDidResponse {
    pub did: String,
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub did: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub nonce_id: String,
    pub nonce: String,
    pub ttl: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofRequest {
    pub did: String,
    pub signature: String,
    pub nonce_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyProofResponse {
    pub verified: bool,
    pub did: String,
}

#[derive(Debug, Deserialize)]
pub struct BackupRequest {
    pub did: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub encrypted_file: String,
    pub file_hash: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub encrypted_file: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Needed only for backups made with the default passphrase.
    #[serde(default)]
    pub did: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub status: &'static str,
    pub did: String,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustTokenRequest {
    pub did: String,
    /// Free-form device description. Must carry a UUID `deviceId`.
    #[serde(default)]
    pub device_info: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness check.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": state.version,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Issues a code and records the outcome. Shared by register and resend.
async fn issue_otp(state: &AppState, req: &OtpRequest, message: &'static str) -> ApiResult<OtpResponse> {
    match state.otp.generate(&req.identifier, &req.channel).await {
        Ok(issued) => {
            state.metrics.otp_issued_total.inc();
            Ok(Json(OtpResponse {
                message,
                expires_in: issued.expires_in.as_secs(),
                otp_id: issued.handle.to_string(),
            }))
        }
        Err(err) => {
            if matches!(err, TrustError::RateLimited) {
                state.metrics.otp_rate_limited_total.inc();
            }
            Err(err.into())
        }
    }
}

/// `POST /api/v1/auth/register`: refuses identifiers that already have an
/// identity, otherwise sends an OTP.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<OtpRequest>,
) -> ApiResult<OtpResponse> {
    let started = Instant::now();
    let result: ApiResult<OtpResponse> = async {
        if state.identity.check_identity(&req.identifier)?.exists {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Identity already exists. Please use restore flow.",
            ));
        }
        issue_otp(&state, &req, "OTP sent successfully").await
    }
    .await;
    state.observe("auth/register", started);
    result
}

/// `POST /api/v1/auth/resend-otp`
async fn resend_otp_handler(
    State(state): State<AppState>,
    Json(req): Json<OtpRequest>,
) -> ApiResult<OtpResponse> {
    let started = Instant::now();
    let result = issue_otp(&state, &req, "OTP resent successfully").await;
    state.observe("auth/resend-otp", started);
    result
}

/// `POST /api/v1/auth/verify-otp`: a valid code sets the verified flag that
/// DID registration consumes.
async fn verify_otp_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<StatusMessage> {
    let started = Instant::now();
    let result: ApiResult<StatusMessage> = async {
        let valid = match state.otp.validate(&req.identifier, &req.otp).await {
            Ok(valid) => valid,
            Err(TrustError::Expired) => false,
            Err(err) => return Err(err.into()),
        };
        if !valid {
            state.metrics.otp_rejected_total.inc();
            return Err(ApiError::unauthorized());
        }

        state.metrics.otp_validated_total.inc();
        state.otp.mark_verified(&req.identifier).await?;
        Ok(Json(StatusMessage {
            status: "VALID",
            message: "OTP verified successfully",
        }))
    }
    .await;
    state.observe("auth/verify-otp", started);
    result
}

/// `POST /api/v1/identity/check`
async fn check_handler(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> ApiResult<CheckResponse> {
    let started = Instant::now();
    let result = state
        .identity
        .check_identity(&req.identifier)
        .map(|check| {
            Json(CheckResponse {
                exists: check.exists,
                did: check.did,
            })
        })
        .map_err(ApiError::from);
    state.observe("identity/check", started);
    result
}

/// `POST /api/v1/identity/register`
async fn register_did_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterDidRequest>,
) -> ApiResult<RegisterDidResponse> {
    let started = Instant::now();
    let result = state
        .identity
        .register_did(DidRegistration {
            did: req.did,
            public_key: req.public_key,
            verified_identifier: req.verified_identifier,
            offline_created: req.offline_created,
        })
        .await
        .map(|record| {
            Json(RegisterDidResponse {
                status: record.sync_status.as_str(),
                timestamp: record.created_at.to_rfc3339(),
                did: record.did,
            })
        })
        .map_err(ApiError::from);
    state.observe("identity/register", started);
    result
}

/// `POST /api/v1/identity/challenge`
async fn challenge_handler(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> ApiResult<ChallengeResponse> {
    let started = Instant::now();
    let result = state
        .proof
        .generate_challenge(&req.did)
        .await
        .map(|challenge| {
            state.metrics.challenges_issued_total.inc();
            Json(ChallengeResponse {
                nonce_id: challenge.nonce_id,
                nonce: challenge.nonce,
                ttl: challenge.expires_in.as_secs(),
            })
        })
        .map_err(ApiError::from);
    state.observe("identity/challenge", started);
    result
}

/// `POST /api/v1/identity/verify-proof`: a bad signature is a 401, and the
/// challenge stays live until it expires or a correct proof consumes it.
async fn verify_proof_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyProofRequest>,
) -> ApiResult<VerifyProofResponse> {
    let started = Instant::now();
    let result = match state
        .proof
        .verify_proof(&req.did, &req.signature, &req.nonce_id)
        .await
    {
        Ok(true) => {
            state.metrics.proofs_verified_total.inc();
            Ok(Json(VerifyProofResponse {
                verified: true,
                did: req.did,
            }))
        }
        Ok(false) => {
            state.metrics.proofs_rejected_total.inc();
            Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                TrustError::AuthenticationFailure.public_message(),
            ))
        }
        Err(err) => {
            state.metrics.proofs_rejected_total.inc();
            Err(err.into())
        }
    };
    state.observe("identity/verify-proof", started);
    result
}

/// `POST /api/v1/identity/backup`
async fn backup_handler(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> ApiResult<BackupResponse> {
    let started = Instant::now();
    let result = state
        .backup
        .create_backup(&req.did, req.passphrase.as_deref())
        .await
        .map(|created| {
            state.metrics.backups_created_total.inc();
            Json(BackupResponse {
                encrypted_file: created.encrypted_file,
                file_hash: created.file_hash,
                created_at: created.created_at.to_rfc3339(),
            })
        })
        .map_err(ApiError::from);
    state.observe("identity/backup", started);
    result
}

/// `POST /api/v1/identity/restore`
async fn restore_handler(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> ApiResult<RestoreResponse> {
    let started = Instant::now();
    let result = state
        .backup
        .restore_identity(
            &req.encrypted_file,
            req.passphrase.as_deref(),
            req.did.as_deref(),
        )
        .await
        .map(|restored| {
            state.metrics.restores_total.inc();
            Json(RestoreResponse {
                status: "SUCCESS",
                did: restored.did,
                message: "Identity restored successfully",
            })
        })
        .map_err(ApiError::from);
    state.observe("identity/restore", started);
    result
}

/// `POST /api/v1/trust-token/setup`
async fn trust_token_setup_handler(
    State(state): State<AppState>,
    Json(req): Json<TrustTokenRequest>,
) -> ApiResult<StatusMessage> {
    let started = Instant::now();
    let result = state
        .identity
        .setup_trust_token(&req.did, &req.device_info)
        .map(|_| {
            state.metrics.devices_linked_total.inc();
            Json(StatusMessage {
                status: "ACTIVE",
                message: "Device linked successfully",
            })
        })
        .map_err(ApiError::from);
    state.observe("trust-token/setup", started);
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::config::{OtpConfig, ServiceConfig};
    use anchor_core::crypto::{sign_base64, IdentityKeypair};
    use anchor_core::notify::RecordingNotifier;
    use anchor_core::storage::IdentityDb;
    use anchor_core::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Creates a test AppState backed by a temporary database and an
    /// in-memory store. The notifier is returned so tests can read codes.
    fn test_app_state() -> (AppState, Arc<RecordingNotifier>) {
        let db = IdentityDb::open_temporary().expect("temp db");
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let limits = ServiceConfig::default();

        let otp = Arc::new(OtpManager::new(
            store.clone(),
            notifier.clone(),
            OtpConfig {
                pepper: b"api-test-pepper".to_vec(),
                ..OtpConfig::default()
            },
            limits,
        ));
        let state = AppState {
            version: "0.1.0-test".into(),
            proof: Arc::new(ProofAuthenticator::new(store, Arc::new(db.clone()), limits)),
            identity: Arc::new(IdentityService::new(Arc::new(db.clone()), otp.clone())),
            backup: Arc::new(BackupService::new(Arc::new(db))),
            otp,
            metrics: Arc::new(crate::metrics::NodeMetrics::new().expect("metrics")),
        };
        (state, notifier)
    }

    /// Sends a GET request and returns the (status, body_json).
    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    /// Sends a POST request with JSON body and returns (status, body_json).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Runs register + verify-otp for `identifier`.
    async fn verify_identifier(router: &Router, notifier: &RecordingNotifier, identifier: &str) {
        let (status, _) = post_json(
            router,
            "/api/v1/auth/register",
            serde_json::json!({ "identifier": identifier, "channel": "email" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let code = notifier.last_code_for(identifier).unwrap();
        let (status, body) = post_json(
            router,
            "/api/v1/auth/verify-otp",
            serde_json::json!({ "identifier": identifier, "otp": code }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "VALID");
    }

    async fn register_did(router: &Router, did: &str, keypair: &IdentityKeypair) {
        let (status, _) = post_json(
            router,
            "/api/v1/identity/register",
            serde_json::json!({ "did": did, "publicKey": keypair.public_key().to_base58() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // -- Health ---------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], "0.1.0-test");
    }

    // -- OTP ------------------------------------------------------------------

    #[tokio::test]
    async fn register_sends_otp_and_reports_handle() {
        let (state, notifier) = test_app_state();
        let router = create_router(state.clone());

        let (status, body) = post_json(
            &router,
            "/api/v1/auth/register",
            serde_json::json!({ "identifier": "a@b.com", "channel": "email" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expiresIn"], 180);
        assert_eq!(body["otpId"], "otp:a@b.com");
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(state.metrics.otp_issued_total.get(), 1);
    }

    #[tokio::test]
    async fn fourth_request_is_rate_limited() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());
        let body = serde_json::json!({ "identifier": "a@b.com", "channel": "email" });

        for _ in 0..3 {
            let (status, _) = post_json(&router, "/api/v1/auth/resend-otp", body.clone()).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, json) = post_json(&router, "/api/v1/auth/resend-otp", body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], TrustError::RateLimited.public_message());
        assert_eq!(state.metrics.otp_rate_limited_total.get(), 1);
    }

    #[tokio::test]
    async fn unknown_channel_is_bad_request() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, _) = post_json(
            &router,
            "/api/v1/auth/register",
            serde_json::json!({ "identifier": "a@b.com", "channel": "pigeon" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn consumed_code_is_unauthorized() {
        let (state, notifier) = test_app_state();
        let router = create_router(state);
        verify_identifier(&router, &notifier, "a@b.com").await;

        // The code was consumed by the first verification.
        let code = notifier.last_code_for("a@b.com").unwrap();
        let (status, body) = post_json(
            &router,
            "/api/v1/auth/verify-otp",
            serde_json::json!({ "identifier": "a@b.com", "otp": code }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid or expired");
    }

    // -- Identity -------------------------------------------------------------

    #[tokio::test]
    async fn verified_registration_links_contact() {
        let (state, notifier) = test_app_state();
        let router = create_router(state);
        let keypair = IdentityKeypair::generate();

        verify_identifier(&router, &notifier, "holder@example.com").await;
        let (status, body) = post_json(
            &router,
            "/api/v1/identity/register",
            serde_json::json!({
                "did": "did:key:z6MkHolder",
                "publicKey": keypair.public_key().to_multibase(),
                "verifiedIdentifier": "holder@example.com",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["did"], "did:key:z6MkHolder");
        assert_eq!(body["status"], "synced");

        let (_, check) = post_json(
            &router,
            "/api/v1/identity/check",
            serde_json::json!({ "identifier": "holder@example.com" }),
        )
        .await;
        assert_eq!(check["exists"], true);
        assert_eq!(check["did"], "did:key:z6MkHolder");

        // Onboarding again with the same identifier is refused.
        let (status, body) = post_json(
            &router,
            "/api/v1/auth/register",
            serde_json::json!({ "identifier": "holder@example.com", "channel": "email" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Identity already exists. Please use restore flow.");
    }

    #[tokio::test]
    async fn unverified_identifier_and_duplicates_are_refused() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let keypair = IdentityKeypair::generate();

        let (status, _) = post_json(
            &router,
            "/api/v1/identity/register",
            serde_json::json!({
                "did": "did:key:z6MkHolder",
                "publicKey": keypair.public_key().to_base58(),
                "verifiedIdentifier": "nobody@example.com",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        register_did(&router, "did:key:z6MkHolder", &keypair).await;
        let (status, _) = post_json(
            &router,
            "/api/v1/identity/register",
            serde_json::json!({
                "did": "did:key:z6MkHolder",
                "publicKey": keypair.public_key().to_base58(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_did_is_bad_request() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, body) =
            post_json(&router, "/api/v1/identity/challenge", serde_json::json!({ "did": "not-a-did" }))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid input");
    }

    // -- Proof of control -----------------------------------------------------

    #[tokio::test]
    async fn challenge_round_trip() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());
        let keypair = IdentityKeypair::generate();
        let did = "did:key:z6MkProver";
        register_did(&router, did, &keypair).await;

        let (status, challenge) =
            post_json(&router, "/api/v1/identity/challenge", serde_json::json!({ "did": did })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(challenge["ttl"], 300);
        let nonce_id = challenge["nonceId"].as_str().unwrap().to_string();
        let nonce = challenge["nonce"].as_str().unwrap();

        // A stranger's signature is refused but leaves the challenge usable.
        let stranger = IdentityKeypair::generate();
        let (status, _) = post_json(
            &router,
            "/api/v1/identity/verify-proof",
            serde_json::json!({
                "did": did,
                "signature": sign_base64(&stranger, nonce.as_bytes()),
                "nonceId": nonce_id,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let proof = serde_json::json!({
            "did": did,
            "signature": sign_base64(&keypair, nonce.as_bytes()),
            "nonceId": nonce_id,
        });
        let (status, body) = post_json(&router, "/api/v1/identity/verify-proof", proof.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);

        // Single use.
        let (status, _) = post_json(&router, "/api/v1/identity/verify-proof", proof).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.metrics.proofs_verified_total.get(), 1);
        assert_eq!(state.metrics.proofs_rejected_total.get(), 2);
    }

    #[tokio::test]
    async fn challenge_for_unknown_did_is_not_found() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, _) = post_json(
            &router,
            "/api/v1/identity/challenge",
            serde_json::json!({ "did": "did:key:z6MkNobody" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // -- Backups --------------------------------------------------------------

    #[tokio::test]
    async fn backup_and_restore() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());
        let keypair = IdentityKeypair::generate();
        let did = "did:web:holder.example";
        register_did(&router, did, &keypair).await;

        let (status, backup) = post_json(
            &router,
            "/api/v1/identity/backup",
            serde_json::json!({ "did": did, "passphrase": "hunter22" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(backup["fileHash"].as_str().unwrap().len(), 64);
        let blob = backup["encryptedFile"].clone();

        let (status, _) = post_json(
            &router,
            "/api/v1/identity/restore",
            serde_json::json!({ "encryptedFile": blob, "passphrase": "wrong" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (other, _) = test_app_state();
        let elsewhere = create_router(other);
        let (status, body) = post_json(
            &elsewhere,
            "/api/v1/identity/restore",
            serde_json::json!({ "encryptedFile": blob, "passphrase": "hunter22" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUCCESS");
        assert_eq!(body["did"], did);
        assert_eq!(state.metrics.backups_created_total.get(), 1);
    }

    #[tokio::test]
    async fn restore_without_passphrase_or_did_is_bad_request() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, _) = post_json(
            &router,
            "/api/v1/identity/restore",
            serde_json::json!({ "encryptedFile": "AAAA" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err: ApiError = TrustError::Store("sled: io error at /var/lib".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
        assert_eq!(
            status_for(&TrustError::Timeout("ephemeral store")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    // -- Trust token ----------------------------------------------------------

    #[tokio::test]
    async fn trust_token_setup_links_device() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());
        register_did(&router, "did:key:z6MkPhone", &IdentityKeypair::generate()).await;
        let body = serde_json::json!({
            "did": "did:key:z6MkPhone",
            "deviceInfo": { "deviceId": "0d5f8a3e-2b7c-4e19-9a6d-3c1b2e4f5a60", "os": "android" }
        });

        for _ in 0..2 {
            let (status, json) = post_json(&router, "/api/v1/trust-token/setup", body.clone()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["status"], "ACTIVE");
            assert_eq!(json["message"], "Device linked successfully");
        }
        assert_eq!(state.metrics.devices_linked_total.get(), 2);
    }

    #[tokio::test]
    async fn trust_token_setup_errors() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        register_did(&router, "did:key:z6MkPhone", &IdentityKeypair::generate()).await;
        let device = serde_json::json!({ "deviceId": "0d5f8a3e-2b7c-4e19-9a6d-3c1b2e4f5a60" });

        let (status, _) = post_json(
            &router,
            "/api/v1/trust-token/setup",
            serde_json::json!({ "did": "did:key:z6MkNobody", "deviceInfo": device }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post_json(
            &router,
            "/api/v1/trust-token/setup",
            serde_json::json!({ "did": "did:key:z6MkPhone" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &router,
            "/api/v1/trust-token/setup",
            serde_json::json!({ "did": "did:key:z6MkPhone", "deviceInfo": { "deviceId": "tablet" } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use onec24_client::api::HttpTransport;
use onec24_client::catalog::ConfigCode;
use onec24_client::config::{ApiConfig, ChunkEncoding};
use onec24_client::session::{FileTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use onec24_client::upload::{FileSource, MemorySource, UploadCoordinator, UploadState};
use onec24_client::{ApiClient, ClientError, VerifyOutcome};

// ============================================================================
// Fake backend
// ============================================================================

const REFRESH_LATENCY: Duration = Duration::from_millis(150);

struct AuthState {
    generation: u32,
    valid_access: String,
    valid_refresh: String,
}

#[derive(Debug, Clone)]
struct ReceivedChunk {
    index: u64,
    multipart: bool,
    field: Option<String>,
    file_name: Option<String>,
    data: Vec<u8>,
}

struct Backend {
    chunk_size: u64,
    auth: Mutex<AuthState>,
    refresh_calls: AtomicUsize,
    chunks: Mutex<Vec<ReceivedChunk>>,
    completed: AtomicUsize,
}

impl Backend {
    fn new(chunk_size: u64) -> Arc<Self> {
        Arc::new(Self {
            chunk_size,
            auth: Mutex::new(AuthState {
                generation: 1,
                valid_access: "access-1".into(),
                valid_refresh: "refresh-1".into(),
            }),
            refresh_calls: AtomicUsize::new(0),
            chunks: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        })
    }

    /// Server stops accepting the current access token
    fn expire_access(&self) {
        self.auth.lock().valid_access = "expired".into();
    }

    fn revoke_refresh(&self) {
        self.auth.lock().valid_refresh = "revoked".into();
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.auth.lock().valid_access);
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(expected.as_str())
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
        .into_response()
}

async fn send_code(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({ "sent": true, "is_new_user": false, "ttl": 300 }))
}

async fn verify_code(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Json<Value> {
    if body["code"] != "123456" {
        return Json(json!({ "verified": false, "message": "Неверный код" }));
    }
    let auth = backend.auth.lock();
    Json(json!({
        "verified": true,
        "needs_registration": false,
        "access_token": auth.valid_access,
        "refresh_token": auth.valid_refresh
    }))
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Slow enough that parallel 401s arrive while the refresh is in flight
    tokio::time::sleep(REFRESH_LATENCY).await;
    let mut auth = backend.auth.lock();
    if body["refresh_token"] != auth.valid_refresh.as_str() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid refresh token" })),
        )
            .into_response();
    }

    auth.generation += 1;
    auth.valid_access = format!("access-{}", auth.generation);
    auth.valid_refresh = format!("refresh-{}", auth.generation);
    Json(json!({
        "access_token": auth.valid_access,
        "refresh_token": auth.valid_refresh
    }))
    .into_response()
}

async fn databases(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([])).into_response()
}

async fn init_upload(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let size = body["size_bytes"].as_u64().unwrap_or(0);
    Json(json!({
        "upload_id": "4f1d2c3b-5a69-4e78-9f01-23456789abcd",
        "chunk_size": backend.chunk_size,
        "chunks_expected": size.div_ceil(backend.chunk_size),
        "db_name": format!("test_{}_1", body["config_code"].as_str().unwrap_or("custom"))
    }))
    .into_response()
}

async fn upload_chunk(
    State(backend): State<Arc<Backend>>,
    Path((_upload_id, index)): Path<(String, u64)>,
    request: Request,
) -> Response {
    if !backend.authorized(request.headers()) {
        return unauthorized();
    }

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let chunk = if is_multipart {
        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
        let field = multipart.next_field().await.unwrap().unwrap();
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        ReceivedChunk {
            index,
            multipart: true,
            field: name,
            file_name,
            data,
        }
    } else {
        let data = Bytes::from_request(request, &()).await.unwrap().to_vec();
        ReceivedChunk {
            index,
            multipart: false,
            field: None,
            file_name: None,
            data,
        }
    };

    backend.chunks.lock().push(chunk);
    Json(json!({ "message": format!("Chunk {} received", index) })).into_response()
}

async fn complete_upload(
    State(backend): State<Arc<Backend>>,
    Path(_upload_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    backend.completed.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "message": "Upload completed successfully" })).into_response()
}

async fn start_server(backend: Arc<Backend>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let api = Router::new()
        .route("/auth/send-code", post(send_code))
        .route("/auth/verify-code", post(verify_code))
        .route("/auth/refresh", post(refresh))
        .route("/me/databases", get(databases))
        .route("/uploads/init", post(init_upload))
        .route("/uploads/:id/chunk/:n", put(upload_chunk))
        .route("/uploads/:id/complete", post(complete_upload))
        .with_state(backend);
    let app = Router::new().nest("/api/v1", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    backend: Arc<Backend>,
    client: ApiClient,
    token_file: std::path::PathBuf,
    _dir: tempfile::TempDir,
    _server: tokio::task::JoinHandle<()>,
}

async fn harness(chunk_size: u64, encoding: ChunkEncoding) -> Harness {
    let backend = Backend::new(chunk_size);
    let (addr, server) = start_server(backend.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");

    let api = ApiConfig {
        url: format!("http://{}", addr),
        timeout_secs: 5,
    };
    let transport = HttpTransport::new(&api, encoding).unwrap();
    let store = FileTokenStore::open(&token_file).unwrap();
    let client = ApiClient::new(Arc::new(transport), Arc::new(store));

    Harness {
        backend,
        client,
        token_file,
        _dir: dir,
        _server: server,
    }
}

async fn log_in(client: &ApiClient) {
    client.send_code("+7 (999) 123-45-67").await.unwrap();
    let outcome = client.verify_code("+79991234567", "123456").await.unwrap();
    assert_eq!(outcome, VerifyOutcome::LoggedIn);
}

fn stored(path: &std::path::Path, key: &str) -> Option<String> {
    FileTokenStore::open(path).unwrap().get(key)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_login_persists_tokens() {
    let h = harness(1024, ChunkEncoding::Multipart).await;

    assert_eq!(
        h.client.verify_code("+79991234567", "000000").await.unwrap(),
        VerifyOutcome::InvalidCode
    );
    log_in(&h.client).await;

    assert_eq!(stored(&h.token_file, ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
    assert_eq!(stored(&h.token_file, REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_expired_token_refreshed_over_http() {
    let h = harness(1024, ChunkEncoding::Multipart).await;
    log_in(&h.client).await;
    h.backend.expire_access();

    h.client.databases().await.unwrap();

    assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stored(&h.token_file, ACCESS_TOKEN_KEY).as_deref(), Some("access-2"));
    assert_eq!(stored(&h.token_file, REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_parallel_requests_share_one_refresh() {
    let h = harness(1024, ChunkEncoding::Multipart).await;
    log_in(&h.client).await;
    h.backend.expire_access();

    let calls = (0..5).map(|_| {
        let client = h.client.clone();
        async move { client.databases().await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(h.client.session().is_authenticated());
}

#[tokio::test]
async fn test_revoked_refresh_token_ends_session() {
    let h = harness(1024, ChunkEncoding::Multipart).await;
    log_in(&h.client).await;
    h.backend.expire_access();
    h.backend.revoke_refresh();

    let result = h.client.databases().await;

    assert!(matches!(result, Err(ClientError::Unauthorized)));
    assert!(!h.client.session().is_authenticated());
    assert_eq!(stored(&h.token_file, ACCESS_TOKEN_KEY), None);
    assert_eq!(stored(&h.token_file, REFRESH_TOKEN_KEY), None);
}

#[tokio::test]
async fn test_file_upload_multipart_in_order() {
    let h = harness(1024, ChunkEncoding::Multipart).await;
    log_in(&h.client).await;

    let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.dt");
    std::fs::write(&path, &content).unwrap();
    let source = FileSource::open(&path).await.unwrap();

    let coordinator = UploadCoordinator::new(h.client.clone());
    let outcome = coordinator.upload(&source, ConfigCode::Bp30).await.unwrap();

    assert_eq!(outcome.chunks_sent, 5);
    assert_eq!(outcome.db_name, "test_bp30_1");
    assert_eq!(coordinator.state(), UploadState::Completed);
    assert_eq!(h.backend.completed.load(Ordering::SeqCst), 1);

    let chunks = h.backend.chunks.lock().clone();
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert_eq!(
        chunks.iter().map(|c| c.data.len()).collect::<Vec<_>>(),
        vec![1024, 1024, 1024, 1024, 904]
    );
    assert!(chunks.iter().all(|c| c.multipart));
    assert!(chunks.iter().all(|c| c.field.as_deref() == Some("file")));
    assert!(chunks.iter().all(|c| c.file_name.as_deref() == Some("base.dt")));

    let reassembled: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
    assert_eq!(reassembled, content);
}

#[tokio::test]
async fn test_raw_chunk_encoding() {
    let h = harness(4, ChunkEncoding::Raw).await;
    log_in(&h.client).await;

    let source = MemorySource::new("small.bak", &b"0123456789"[..]);
    let coordinator = UploadCoordinator::new(h.client.clone());
    coordinator.upload(&source, ConfigCode::Ut11).await.unwrap();

    let chunks = h.backend.chunks.lock().clone();
    assert!(chunks.iter().all(|c| !c.multipart));
    let data: Vec<&[u8]> = chunks.iter().map(|c| c.data.as_slice()).collect();
    assert_eq!(data, vec![&b"0123"[..], &b"4567"[..], &b"89"[..]]);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use adminpanel_client::{
    AdminError, AdminSession, AuthenticatedClient, ClientConfig, CredentialStore, Method,
    MemoryCredentialStore, Phase, Role, SessionEvent, UserId,
};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

const EMAIL: &str = "admin@test.com";
const PASSWORD: &str = "s3cret";
const TOKEN: &str = "issued-token";

/// Stand-in for the admin backend.
#[derive(Clone)]
struct Backend {
    users: Arc<Mutex<Vec<Value>>>,
    hits: Arc<AtomicUsize>,
}

impl Backend {
    fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(vec![
                json!({ "id": 1, "name": "Admin", "email": EMAIL, "role": "admin",
                        "created_at": "2025-01-01T00:00:00Z", "is_active": true }),
                json!({ "id": 2, "name": "Bob", "email": "bob@test.com", "role": "client",
                        "created_at": "2025-01-02T00:00:00Z", "is_active": true }),
            ])),
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn role_of(&self, id: i64) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u["id"] == id)
            .map(|u| u["role"].as_str().unwrap().to_string())
    }

    fn remove(&self, id: i64) {
        self.users.lock().unwrap().retain(|u| u["id"] != id);
    }
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RoleBody {
    role: String,
}

fn detail(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "detail": msg }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn token(State(backend): State<Backend>, Form(form): Form<LoginForm>) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    if form.username == EMAIL && form.password == PASSWORD {
        Json(json!({ "access_token": TOKEN, "token_type": "bearer" })).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Email ou mot de passe incorrect")
    }
}

async fn list_users(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    Json(Value::Array(backend.users.lock().unwrap().clone())).into_response()
}

async fn change_role(
    State(backend): State<Backend>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<RoleBody>,
) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return detail(StatusCode::FORBIDDEN, "Not enough permissions");
    }

    let mut users = backend.users.lock().unwrap();
    match users.iter_mut().find(|u| u["id"] == id) {
        Some(user) => {
            user["role"] = Value::String(body.role);
            Json(user.clone()).into_response()
        }
        None => detail(StatusCode::NOT_FOUND, "Utilisateur introuvable"),
    }
}

async fn broken(State(backend): State<Backend>) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

struct TestServer {
    base_url: String,
    backend: Backend,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let backend = Backend::new();
        let app = Router::new()
            .route("/token", post(token))
            .route("/admin/users", get(list_users))
            .route("/admin/users/:id/role", put(change_role))
            .route("/broken", get(broken))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backend,
            handle,
        }
    }

    fn client(&self, store: Arc<MemoryCredentialStore>) -> AuthenticatedClient {
        AuthenticatedClient::new(ClientConfig::new(&self.base_url), store).unwrap()
    }

    fn session(&self, store: Arc<MemoryCredentialStore>) -> AdminSession {
        AdminSession::new(ClientConfig::new(&self.base_url), store).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn login_stores_issued_token() {
    let server = TestServer::spawn().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let client = server.client(store.clone());

    let token = client.login(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(token, TOKEN);
    assert_eq!(store.read().as_deref(), Some(TOKEN));
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn rejected_login_leaves_store_unchanged() {
    let server = TestServer::spawn().await;
    let store = Arc::new(MemoryCredentialStore::with_token("previous"));
    let client = server.client(store.clone());

    let err = client.login(EMAIL, "wrong").await.unwrap_err();

    assert_eq!(err, AdminError::InvalidCredentials);
    assert_eq!(store.read().as_deref(), Some("previous"));
}

#[tokio::test]
async fn login_against_closed_port_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Arc::new(MemoryCredentialStore::new());
    let client = AuthenticatedClient::new(ClientConfig::new(format!("http://{addr}")), store.clone()).unwrap();

    let err = client.login(EMAIL, PASSWORD).await.unwrap_err();
    assert!(matches!(err, AdminError::TransportFailure { status: None, .. }));
    assert_eq!(store.read(), None);
}

#[tokio::test]
async fn request_without_credential_never_reaches_backend() {
    let server = TestServer::spawn().await;
    let client = server.client(Arc::new(MemoryCredentialStore::new()));

    let err = client.request(Method::GET, "/admin/users", None).await.unwrap_err();

    assert_eq!(err, AdminError::Unauthenticated);
    assert_eq!(server.backend.hits(), 0);
}

#[tokio::test]
async fn rejected_credential_is_reported_but_kept() {
    let server = TestServer::spawn().await;
    let store = Arc::new(MemoryCredentialStore::with_token("forged"));
    let client = server.client(store.clone());

    let err = client.request(Method::GET, "/admin/users", None).await.unwrap_err();
    assert_eq!(err, AdminError::Unauthenticated);

    let err = client
        .request(Method::PUT, "/admin/users/2/role", Some(json!({ "role": "staff" })))
        .await
        .unwrap_err();
    assert_eq!(err, AdminError::Unauthenticated);

    assert_eq!(store.read().as_deref(), Some("forged"));
}

#[tokio::test]
async fn server_error_is_transport_failure_with_status() {
    let server = TestServer::spawn().await;
    let client = server.client(Arc::new(MemoryCredentialStore::with_token(TOKEN)));

    let err = client.request(Method::GET, "/broken", None).await.unwrap_err();

    assert_eq!(
        err,
        AdminError::TransportFailure {
            status: Some(500),
            message: "internal error".to_string(),
        }
    );
}

#[tokio::test]
async fn login_then_list_and_change_role() {
    let server = TestServer::spawn().await;
    let session = server.session(Arc::new(MemoryCredentialStore::new()));

    let directory = session.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(directory.phase(), Phase::Idle);

    let users = directory.load_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].role, Role::Client);
    assert_eq!(users[1].is_active, Some(true));

    let outcome = directory.change_role(UserId::new(2), Role::Staff).await.unwrap();
    assert!(outcome.is_applied());
    assert_eq!(directory.user(UserId::new(2)).unwrap().role, Role::Staff);
    assert_eq!(server.backend.role_of(2).as_deref(), Some("staff"));

    // Reloading with no intervening change yields the same list.
    let before = directory.users();
    directory.load_users().await.unwrap();
    assert_eq!(directory.users(), before);
}

#[tokio::test]
async fn change_role_for_user_deleted_server_side_rolls_back() {
    let server = TestServer::spawn().await;
    let session = server.session(Arc::new(MemoryCredentialStore::with_token(TOKEN)));
    let directory = session.directory();
    directory.load_users().await.unwrap();

    server.backend.remove(2);
    let err = directory.change_role(UserId::new(2), Role::Admin).await.unwrap_err();

    assert_eq!(
        err,
        AdminError::TransportFailure {
            status: Some(404),
            message: "Utilisateur introuvable".to_string(),
        }
    );
    assert_eq!(directory.user(UserId::new(2)).unwrap().role, Role::Client);
    assert_eq!(directory.phase(), Phase::Ready);
}

#[tokio::test]
async fn rejected_session_clears_credential_and_requests_login() {
    let server = TestServer::spawn().await;
    let store = Arc::new(MemoryCredentialStore::with_token("expired"));
    let session = server.session(store.clone());
    let directory = session.directory();
    let mut events = directory.subscribe();

    let err = directory.load_users().await.unwrap_err();

    assert!(err.requires_login());
    assert_eq!(store.read(), None);
    assert_eq!(directory.phase(), Phase::Unauthenticated);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoginRequired);
    assert!(events.try_recv().is_err());

    // A new login gives a fresh, usable controller.
    let directory = session.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(directory.load_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn logout_clears_credential() {
    let server = TestServer::spawn().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let session = server.session(store.clone());

    session.login(EMAIL, PASSWORD).await.unwrap();
    assert!(session.is_authenticated());

    session.logout();
    assert!(!session.is_authenticated());

    let hits = server.backend.hits();
    let err = session.directory().load_users().await.unwrap_err();
    assert_eq!(err, AdminError::Unauthenticated);
    assert_eq!(server.backend.hits(), hits);
}

use axum::{
    debug_handler,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

pub use axum::http::StatusCode;

pub mod prelude {
    pub use crate::{
        CreateUserRequest, Faults, Latency, RequestCounts, ServiceState, UpdateUserRequest, User,
    };
}

pub async fn run(addr: SocketAddr, state: ServiceState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: ServiceState) -> anyhow::Result<()> {
    info!("Mock users service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/users", post(create_user).get(get_all_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/** API types **/

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("User {0} not found")]
    NotFound(Uuid),

    #[error("{0} cannot be blank")]
    Blank(&'static str),

    #[error("Injected fault")]
    Injected(StatusCode),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Blank(_) => StatusCode::BAD_REQUEST,
            ServiceError::Injected(status) => *status,
        };
        (status, self.to_string()).into_response()
    }
}

/** State **/

/// Shared state of the mock service: the user store plus test knobs.
#[derive(Clone, Default)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    next_seq: AtomicU64,
    faults: RwLock<Faults>,
    latency: Option<Latency>,
    requests: RequestCounters,
}

struct UserRecord {
    seq: u64,
    username: String,
    #[allow(unused)]
    password: String,
    email: String,
}

impl UserRecord {
    fn to_user(&self, id: Uuid) -> User {
        User {
            id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Forced responses for the mutating endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct Faults {
    pub create: Option<StatusCode>,
    pub list: Option<StatusCode>,
    pub get: Option<StatusCode>,
    pub update: Option<StatusCode>,
    pub delete: Option<StatusCode>,
    /// Answer updates with 200 and the stored user, without applying them.
    pub ignore_updates: bool,
}

/// Simulated server-side processing time, normally distributed around `mean`.
#[derive(Clone, Copy, Debug)]
pub struct Latency {
    pub mean: Duration,
    pub jitter: Duration,
}

impl Latency {
    fn sample(&self) -> Duration {
        match Normal::new(self.mean.as_secs_f64(), self.jitter.as_secs_f64()) {
            Ok(normal) => Duration::from_secs_f64(normal.sample(&mut rand::thread_rng()).max(0.)),
            Err(_) => self.mean,
        }
    }
}

#[derive(Default)]
struct RequestCounters {
    create: AtomicU64,
    list: AtomicU64,
    get: AtomicU64,
    update: AtomicU64,
    delete: AtomicU64,
}

/// Snapshot of handled requests per endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub create: u64,
    pub list: u64,
    pub get: u64,
    pub update: u64,
    pub delete: u64,
}

impl RequestCounts {
    pub fn total(&self) -> u64 {
        self.create + self.list + self.get + self.update + self.delete
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Create,
    List,
    Get,
    Update,
    Delete,
}

impl ServiceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Latency) -> Self {
        Self {
            inner: Arc::new(Inner {
                latency: Some(latency),
                ..Default::default()
            }),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        *self
            .inner
            .faults
            .write()
            .unwrap_or_else(PoisonError::into_inner) = faults;
    }

    pub fn requests(&self) -> RequestCounts {
        let r = &self.inner.requests;
        RequestCounts {
            create: r.create.load(Ordering::Relaxed),
            list: r.list.load(Ordering::Relaxed),
            get: r.get.load(Ordering::Relaxed),
            update: r.update.load(Ordering::Relaxed),
            delete: r.delete.load(Ordering::Relaxed),
        }
    }

    pub fn user_count(&self) -> usize {
        self.inner
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn enter(&self, endpoint: Endpoint) {
        let (counter, name) = match endpoint {
            Endpoint::Create => (&self.inner.requests.create, "create"),
            Endpoint::List => (&self.inner.requests.list, "list"),
            Endpoint::Get => (&self.inner.requests.get, "get"),
            Endpoint::Update => (&self.inner.requests.update, "update"),
            Endpoint::Delete => (&self.inner.requests.delete, "delete"),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counter!("mock_service.requests", "endpoint" => name).increment(1);

        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency.sample()).await;
        }
    }

    fn ignore_updates(&self) -> bool {
        self.inner
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ignore_updates
    }

    fn fault(&self, pick: impl FnOnce(&Faults) -> Option<StatusCode>) -> Result<(), ServiceError> {
        let faults = self
            .inner
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match pick(&faults) {
            Some(status) => {
                debug!("Injecting {status}");
                Err(ServiceError::Injected(status))
            }
            None => Ok(()),
        }
    }
}

/** Handlers **/

#[debug_handler]
async fn create_user(
    State(state): State<ServiceState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>, ServiceError> {
    state.enter(Endpoint::Create).await;
    state.fault(|f| f.create)?;

    let CreateUserRequest {
        username,
        password,
        email,
    } = request;
    for (field, value) in [
        ("Username", &username),
        ("Password", &password),
        ("Email", &email),
    ] {
        if value.trim().is_empty() {
            return Err(ServiceError::Blank(field));
        }
    }

    let id = Uuid::new_v4();
    let record = UserRecord {
        seq: state.inner.next_seq.fetch_add(1, Ordering::Relaxed),
        username,
        password,
        email,
    };
    let user = record.to_user(id);
    state
        .inner
        .users
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, record);

    Ok(Json(user))
}

#[debug_handler]
async fn get_all_users(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<User>>, ServiceError> {
    state.enter(Endpoint::List).await;
    state.fault(|f| f.list)?;

    let users = state
        .inner
        .users
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    let mut records: Vec<_> = users.iter().collect();
    records.sort_by_key(|(_, record)| record.seq);

    Ok(Json(
        records
            .into_iter()
            .map(|(id, record)| record.to_user(*id))
            .collect(),
    ))
}

#[debug_handler]
async fn get_user(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ServiceError> {
    state.enter(Endpoint::Get).await;
    state.fault(|f| f.get)?;

    state
        .inner
        .users
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .map(|record| Json(record.to_user(id)))
        .ok_or(ServiceError::NotFound(id))
}

#[debug_handler]
async fn update_user(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ServiceError> {
    state.enter(Endpoint::Update).await;
    state.fault(|f| f.update)?;
    let ignore = state.ignore_updates();

    let mut users = state
        .inner
        .users
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let record = users.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
    if ignore {
        debug!("Ignoring update of {id}");
        return Ok(Json(record.to_user(id)));
    }

    // Absent and blank fields leave the stored value untouched.
    let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    if let Some(username) = non_blank(request.username) {
        record.username = username;
    }
    if let Some(password) = non_blank(request.password) {
        record.password = password;
    }
    if let Some(email) = non_blank(request.email) {
        record.email = email;
    }

    Ok(Json(record.to_user(id)))
}

#[debug_handler]
async fn delete_user(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.enter(Endpoint::Delete).await;
    state.fault(|f| f.delete)?;

    let removed = state
        .inner
        .users
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    if removed.is_none() {
        debug!("Deleting unknown user {id}");
    }

    Ok(StatusCode::OK)
}

/** RPS Printer **/

pub async fn rps_measure_task(state: ServiceState) {
    let mut last = state.requests().total();
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let total = state.requests().total();
        info!("{} RPS, {} users stored", total - last, state.user_count());
        last = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn spawn(state: ServiceState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn crud_lifecycle() {
        let state = ServiceState::new();
        let base = spawn(state.clone()).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}/users"))
            .json(&json!({"username": "username", "password": "password", "email": "email"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let created: User = res.json().await.unwrap();
        assert_eq!(created.username, "username");

        let users: Vec<User> = client
            .get(format!("{base}/users"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(users, vec![created.clone()]);

        let updated: User = client
            .put(format!("{base}/users/{}", created.id))
            .json(&json!({"username": "newUsername", "email": "  "}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated.username, "newUsername");
        assert_eq!(updated.email, "email");

        let res = client
            .delete(format!("{base}/users/{}", created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);

        let res = client
            .get(format!("{base}/users/{}", created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        assert_eq!(
            state.requests(),
            RequestCounts {
                create: 1,
                list: 1,
                get: 1,
                update: 1,
                delete: 1,
            }
        );
        assert_eq!(state.user_count(), 0);
    }

    #[tokio::test]
    async fn rejects_blank_fields_and_bad_ids() {
        let base = spawn(ServiceState::new()).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}/users"))
            .json(&json!({"username": "", "password": "password", "email": "email"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        assert_eq!(res.text().await.unwrap(), "Username cannot be blank");

        let res = client
            .get(format!("{base}/users/not-a-uuid"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        let res = client
            .put(format!("{base}/users/{}", Uuid::new_v4()))
            .json(&json!({"username": "newUsername"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn injected_faults() {
        let state = ServiceState::new();
        let base = spawn(state.clone()).await;
        let client = reqwest::Client::new();

        state.set_faults(Faults {
            create: Some(StatusCode::SERVICE_UNAVAILABLE),
            ..Default::default()
        });

        let res = client
            .post(format!("{base}/users"))
            .json(&json!({"username": "username", "password": "password", "email": "email"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 503);
        assert_eq!(state.user_count(), 0);
        assert_eq!(state.requests().create, 1);
    }

    #[tokio::test]
    async fn read_faults_and_ignored_updates() {
        let state = ServiceState::new();
        let base = spawn(state.clone()).await;
        let client = reqwest::Client::new();

        let created: User = client
            .post(format!("{base}/users"))
            .json(&json!({"username": "username", "password": "password", "email": "email"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        state.set_faults(Faults {
            list: Some(StatusCode::INTERNAL_SERVER_ERROR),
            get: Some(StatusCode::BAD_GATEWAY),
            ignore_updates: true,
            ..Default::default()
        });

        let res = client.get(format!("{base}/users")).send().await.unwrap();
        assert_eq!(res.status(), 500);
        let res = client
            .get(format!("{base}/users/{}", created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 502);

        let res = client
            .put(format!("{base}/users/{}", created.id))
            .json(&json!({"username": "newUsername"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let unchanged: User = res.json().await.unwrap();
        assert_eq!(unchanged, created);
    }

    #[test]
    fn latency_samples_are_non_negative() {
        let latency = Latency {
            mean: Duration::from_millis(1),
            jitter: Duration::from_millis(5),
        };
        for _ in 0..100 {
            assert!(latency.sample() < Duration::from_secs(1));
        }
    }
}

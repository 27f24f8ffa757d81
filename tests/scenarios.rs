use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use habitat_lib::{
    cloud::CloudDispatcher,
    merge::{resolve, ResolutionMode, Side},
    models::ProjectDocument,
    session::{LoginSurface, LoginWindow, SessionConfig, SessionManager, SurfaceEvent},
    store::LocalStore,
    HabitatError,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;

/// A login surface that walks through the proxy's pages and lands on the root.
#[derive(Default)]
struct LandingSurface {
    opened: Mutex<Vec<Url>>,
}

#[async_trait]
impl LoginSurface for LandingSurface {
    async fn open(&self, address: &Url) -> habitat_lib::Result<Box<dyn LoginWindow>> {
        self.opened.lock().unwrap().push(address.clone());
        let root = address.join("./").unwrap();
        Ok(Box::new(LandingWindow {
            events: vec![
                SurfaceEvent::Navigated(address.clone()),
                SurfaceEvent::Navigated(root),
            ]
            .into_iter(),
        }))
    }
}

struct LandingWindow {
    events: std::vec::IntoIter<SurfaceEvent>,
}

#[async_trait]
impl LoginWindow for LandingWindow {
    async fn next_event(&mut self) -> Option<SurfaceEvent> {
        self.events.next()
    }

    async fn credentials(&mut self, _root: &Url) -> habitat_lib::Result<Vec<String>> {
        Ok(vec!["_oauth2_proxy=signed-in".to_string()])
    }

    async fn close(&mut self) {}
}

#[derive(Clone, Default)]
struct Traffic {
    probes: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

/// Behaves like the proxy in front of the cloud: without its cookie the probe comes back
/// empty, with it the database answers in JSON.
async fn probe(State(traffic): State<Traffic>, headers: HeaderMap) -> Response {
    traffic.probes.fetch_add(1, Ordering::SeqCst);
    let signed_in = headers
        .get("cookie")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("_oauth2_proxy=signed-in"));
    if signed_in {
        Json(json!({ "db_name": "habitat-projects", "doc_count": 0 })).into_response()
    } else {
        "".into_response()
    }
}

async fn request(State(traffic): State<Traffic>, Json(_body): Json<Value>) -> Json<Value> {
    traffic.requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "ok": true, "msg": "done" }))
}

async fn proxy() -> (Url, Traffic) {
    let traffic = Traffic::default();
    let router = Router::new()
        .route("/habitat-projects", get(probe))
        .route("/habitat-request", post(request))
        .with_state(traffic.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (Url::parse(&format!("http://{addr}/")).unwrap(), traffic)
}

fn document(data: Value) -> ProjectDocument {
    ProjectDocument {
        id: "doc1".into(),
        rev: None,
        locale: "proj-A".into(),
        owner: None,
        timestamp: Some(Utc::now()),
        data,
    }
}

#[tokio::test]
async fn proj_a_write_load_update_then_stale_write() {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::new(dir.path().to_path_buf());
    let handle = store.open("proj-A").await.unwrap();

    let created = store
        .put(&handle, document(json!({ "x": 1 })))
        .await
        .unwrap()
        .data
        .unwrap();

    let loaded = store.load_project(&handle, "doc1").await.unwrap();
    assert!(loaded.ok);
    assert_eq!(loaded.data, Some(json!({ "x": 1 })));

    let mut second = store.get(&handle, "doc1").await.unwrap();
    second.data = json!({ "x": 2 });
    let updated = store.put(&handle, second).await.unwrap().data.unwrap();
    assert_ne!(updated.rev, created.rev);

    let mut stale = document(json!({ "x": 3 }));
    stale.rev = Some(created.rev.clone());
    let err = store.put(&handle, stale).await.unwrap_err();
    assert!(matches!(err, HabitatError::StaleWrite { .. }));

    let current = store.get(&handle, "doc1").await.unwrap();
    assert_eq!(current.data, json!({ "x": 2 }));
    assert_eq!(current.rev, Some(updated.rev));
}

#[tokio::test]
async fn empty_probe_body_opens_sign_in_and_then_commands_go_through() {
    let (base, traffic) = proxy().await;
    let surface = Arc::new(LandingSurface::default());
    let sessions = Arc::new(
        SessionManager::new(SessionConfig::default(), Arc::clone(&surface) as Arc<dyn LoginSurface>)
            .unwrap(),
    );
    let cloud = CloudDispatcher::new(
        Arc::clone(&sessions),
        &base,
        base.join("habitat-projects").unwrap(),
    )
    .unwrap();

    let envelope = cloud
        .dispatch_named("listProjects", json!({ "locale": "proj-A" }))
        .await
        .unwrap();
    assert!(envelope.ok);

    assert_eq!(
        surface.opened.lock().unwrap().as_slice(),
        [base.join("sign_in").unwrap()]
    );
    assert!(sessions.is_authenticated());
    assert_eq!(traffic.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn incomplete_update_project_fails_without_network() {
    let (base, traffic) = proxy().await;
    let sessions = Arc::new(
        SessionManager::new(SessionConfig::default(), Arc::new(LandingSurface::default())).unwrap(),
    );
    let cloud = CloudDispatcher::new(sessions, &base, base.join("habitat-projects").unwrap()).unwrap();

    let err = cloud
        .dispatch_named("updateProject", json!({ "projectData": {} }))
        .await
        .unwrap_err();

    assert!(matches!(err, HabitatError::IncompleteProject { .. }));
    assert_eq!(traffic.probes.load(Ordering::SeqCst), 0);
    assert_eq!(traffic.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn destroy_refuses_network_locales_and_clears_local_ones() {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::new(dir.path().to_path_buf());

    let err = store
        .destroy("https://hd.example.com/habitat-projects")
        .await
        .unwrap_err();
    assert!(matches!(err, HabitatError::PolicyViolation(_)));

    let handle = store.open("scratch").await.unwrap();
    store
        .save_project(&handle, "doc1", json!({}), Utc::now())
        .await
        .unwrap();
    drop(handle);
    assert!(store.destroy("scratch").await.unwrap().ok);
    assert!(!dir.path().join("scratch.sqlite3").exists());
}

#[test]
fn latest_wins_prefers_local_on_ties() {
    let saved_at = Utc::now() - Duration::minutes(1);
    let mut local = document(json!({ "from": "local" }));
    let mut remote = document(json!({ "from": "remote" }));
    local.timestamp = Some(saved_at);
    remote.timestamp = Some(saved_at);

    let tie = resolve(local.clone(), remote.clone(), ResolutionMode::LatestWins);
    assert_eq!(tie.winner, Side::Local);

    remote.timestamp = Some(saved_at + Duration::seconds(1));
    let newer = resolve(local, remote, ResolutionMode::LatestWins);
    assert_eq!(newer.winner, Side::Remote);
    assert_eq!(newer.document.data, json!({ "from": "remote" }));
}

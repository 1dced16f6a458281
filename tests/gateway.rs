use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use storefront_offline::{
    cache::MemoryCacheStorage,
    infra::{
        clients::ClientRegistry,
        http::{GatewayState, build_admin_router, build_public_router},
        notifications::NotificationCenter,
    },
    worker::{
        ActionReplayer, ControllerConfig, DEFAULT_PRECACHE, FetchRequest, MemoryActionQueue,
        Network, NetworkError, OfflineAction, Registration, SyncError, WorkerContext,
    },
};
use tower::ServiceExt;
use url::Url;

/// Upstream double answering by path; unknown paths are unreachable.
#[derive(Default)]
struct FakeUpstream {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    seen: Mutex<Vec<(Method, String)>>,
}

impl FakeUpstream {
    fn route(&self, path: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(path.to_string(), (status, body.to_string()));
    }

    fn go_offline(&self, path: &str) {
        self.routes.lock().expect("routes lock").remove(path);
    }

    fn hits(&self, method: &Method, path: &str) -> usize {
        self.seen
            .lock()
            .expect("seen lock")
            .iter()
            .filter(|(m, p)| m == method && p == path)
            .count()
    }
}

#[async_trait]
impl Network for FakeUpstream {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, NetworkError> {
        let path = request.url.path().to_string();
        self.seen
            .lock()
            .expect("seen lock")
            .push((request.method.clone(), path.clone()));

        let route = self.routes.lock().expect("routes lock").get(&path).cloned();
        match route {
            Some((status, body)) => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                Ok(response)
            }
            None => Err(NetworkError::Unreachable(format!("no route for {path}"))),
        }
    }
}

#[derive(Default)]
struct CountingReplayer {
    replayed: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionReplayer for CountingReplayer {
    async fn replay(&self, action: &OfflineAction) -> Result<(), SyncError> {
        self.replayed
            .lock()
            .expect("replayed lock")
            .push(action.path.clone());
        Ok(())
    }
}

struct Gateway {
    state: GatewayState,
    upstream: Arc<FakeUpstream>,
    replayer: Arc<CountingReplayer>,
}

impl Gateway {
    async fn start() -> Self {
        let gateway = Self::unregistered();
        gateway
            .state
            .registration
            .register(Arc::clone(&gateway.state.worker_config))
            .await
            .expect("register");
        gateway
    }

    fn unregistered() -> Self {
        let upstream = Arc::new(FakeUpstream::default());
        for path in DEFAULT_PRECACHE {
            upstream.route(path, StatusCode::OK, &format!("shell {path}"));
        }
        let replayer = Arc::new(CountingReplayer::default());
        let clients = Arc::new(ClientRegistry::new());
        let notifications = Arc::new(NotificationCenter::new());

        let context = WorkerContext {
            storage: Arc::new(MemoryCacheStorage::new()),
            network: upstream.clone(),
            clients: clients.clone(),
            notifier: notifications.clone(),
            actions: Arc::new(MemoryActionQueue::new()),
            replayer: replayer.clone(),
        };
        let worker_config = ControllerConfig {
            scope: Url::parse("http://shop.test/").expect("scope"),
            ..Default::default()
        };

        let state = GatewayState {
            registration: Arc::new(Registration::new(context)),
            worker_config: Arc::new(worker_config),
            clients,
            notifications,
            max_body_bytes: 64 * 1024,
        };

        Self {
            state,
            upstream,
            replayer,
        }
    }

    fn public(&self) -> Router {
        build_public_router(self.state.clone())
    }

    fn admin(&self) -> Router {
        build_admin_router(self.state.clone())
    }

    async fn settle(&self) {
        self.state.registration.shutdown().await;
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

async fn json_body(response: Response) -> Value {
    serde_json::from_str(&text(response).await).expect("json body")
}

#[tokio::test]
async fn app_shell_is_served_from_cache() {
    let gateway = Gateway::start().await;
    gateway
        .upstream
        .route("/boutique", StatusCode::OK, "fresh boutique");

    let response = gateway.public().oneshot(get("/boutique")).await.expect("call");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "shell /boutique");
    assert_eq!(gateway.upstream.hits(&Method::GET, "/boutique"), 1);
}

#[tokio::test]
async fn api_responses_survive_going_offline() {
    let gateway = Gateway::start().await;
    gateway
        .upstream
        .route("/api/products", StatusCode::OK, r#"[{"id":1}]"#);

    let online = gateway
        .public()
        .oneshot(get("/api/products"))
        .await
        .expect("call");
    assert_eq!(text(online).await, r#"[{"id":1}]"#);
    gateway.settle().await;

    gateway.upstream.go_offline("/api/products");
    let offline = gateway
        .public()
        .oneshot(get("/api/products"))
        .await
        .expect("call");

    assert_eq!(offline.status(), StatusCode::OK);
    assert_eq!(text(offline).await, r#"[{"id":1}]"#);
}

#[tokio::test]
async fn uncached_failures_become_bad_gateway() {
    let gateway = Gateway::start().await;

    let response = gateway
        .public()
        .oneshot(get("/api/categories"))
        .await
        .expect("call");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn image_destination_is_cached_on_first_fetch() {
    let gateway = Gateway::start().await;
    gateway
        .upstream
        .route("/uploads/mirror.png", StatusCode::OK, "png");
    let image = || {
        Request::builder()
            .uri("/uploads/mirror.png")
            .header("sec-fetch-dest", "image")
            .body(Body::empty())
            .expect("request")
    };

    gateway.public().oneshot(image()).await.expect("call");
    gateway.settle().await;
    gateway.upstream.go_offline("/uploads/mirror.png");
    let cached = gateway.public().oneshot(image()).await.expect("call");

    assert_eq!(text(cached).await, "png");
    assert_eq!(gateway.upstream.hits(&Method::GET, "/uploads/mirror.png"), 1);
}

#[tokio::test]
async fn writes_pass_through_untouched() {
    let gateway = Gateway::start().await;
    gateway
        .upstream
        .route("/api/products", StatusCode::CREATED, r#"{"id":2}"#);

    let response = gateway
        .public()
        .oneshot(post_json("/api/products", json!({"name": "Curette"})))
        .await
        .expect("call");
    gateway.settle().await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(gateway.upstream.hits(&Method::POST, "/api/products"), 1);
    let storage = &gateway.state.registration.context().storage;
    assert_eq!(storage.len("dynamic-v1").await.expect("len"), 0);
}

#[tokio::test]
async fn requests_pass_through_without_a_worker() {
    let gateway = Gateway::unregistered();
    gateway.upstream.route("/contact", StatusCode::OK, "contact");

    let response = gateway.public().oneshot(get("/contact")).await.expect("call");
    gateway.settle().await;

    assert_eq!(text(response).await, "contact");
    let storage = &gateway.state.registration.context().storage;
    assert!(storage.keys().await.expect("keys").is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let gateway = Gateway::unregistered();

    let response = gateway.admin().oneshot(get("/health")).await.expect("call");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn worker_status_and_partitions() {
    let gateway = Gateway::start().await;

    let status = json_body(gateway.admin().oneshot(get("/worker")).await.expect("call")).await;
    assert_eq!(status["state"], "active");
    assert_eq!(status["static_partition"], "static-v1");
    assert_eq!(status["update_available"], false);

    let partitions =
        json_body(gateway.admin().oneshot(get("/partitions")).await.expect("call")).await;
    assert_eq!(
        partitions,
        json!([{"name": "static-v1", "entries": DEFAULT_PRECACHE.len(), "current": true}])
    );
}

#[tokio::test]
async fn push_then_explore_click() {
    let gateway = Gateway::start().await;

    let push = Request::builder()
        .method(Method::POST)
        .uri("/push")
        .body(Body::from("Nouveaux implants en stock"))
        .expect("request");
    let notification = json_body(gateway.admin().oneshot(push).await.expect("call")).await;
    assert_eq!(notification["title"], "DentalTech Pro");
    assert_eq!(notification["body"], "Nouveaux implants en stock");

    let shown = json_body(
        gateway
            .admin()
            .oneshot(get("/notifications"))
            .await
            .expect("call"),
    )
    .await;
    assert_eq!(shown.as_array().map(Vec::len), Some(1));

    let id = notification["id"].as_str().expect("id");
    let click = gateway
        .admin()
        .oneshot(post_json(
            &format!("/notifications/{id}/click"),
            json!({"action": "explore"}),
        ))
        .await
        .expect("call");
    assert_eq!(
        json_body(click).await,
        json!({"outcome": "opened", "url": "http://shop.test/"})
    );

    let shown = json_body(
        gateway
            .admin()
            .oneshot(get("/notifications"))
            .await
            .expect("call"),
    )
    .await;
    assert_eq!(shown, json!([]));
}

#[tokio::test]
async fn clicking_unknown_notification_is_not_found() {
    let gateway = Gateway::start().await;

    let response = gateway
        .admin()
        .oneshot(post_json(
            "/notifications/6f1c1d4e-8b0e-4c55-9d43-2f6f0d7c9a11/click",
            json!({"action": "close"}),
        ))
        .await
        .expect("call");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queued_actions_replay_on_sync() {
    let gateway = Gateway::start().await;

    let queued = gateway
        .admin()
        .oneshot(post_json(
            "/offline-actions",
            json!({"method": "post", "path": "/api/orders", "body": {"items": [3]}}),
        ))
        .await
        .expect("call");
    assert_eq!(queued.status(), StatusCode::CREATED);

    let foreign = gateway
        .admin()
        .oneshot(post_json("/sync", json!({"tag": "periodic"})))
        .await
        .expect("call");
    assert_eq!(json_body(foreign).await, json!({"outcome": "ignored"}));

    let sync = gateway
        .admin()
        .oneshot(post_json("/sync", json!({"tag": "background-sync"})))
        .await
        .expect("call");
    assert_eq!(
        json_body(sync).await,
        json!({"outcome": "completed", "replayed": 1})
    );
    assert_eq!(
        gateway.replayer.replayed.lock().expect("replayed lock").clone(),
        vec!["/api/orders"]
    );
}

#[tokio::test]
async fn offline_action_paths_must_be_absolute() {
    let gateway = Gateway::start().await;

    let response = gateway
        .admin()
        .oneshot(post_json(
            "/offline-actions",
            json!({"method": "POST", "path": "api/orders"}),
        ))
        .await
        .expect("call");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_update_keeps_serving_previous_version() {
    let gateway = Gateway::start().await;
    gateway.upstream.go_offline("/logo512.png");

    let update = gateway
        .admin()
        .oneshot(post_json("/update", json!({})))
        .await
        .expect("call");
    assert_eq!(update.status(), StatusCode::BAD_GATEWAY);

    let status = json_body(gateway.admin().oneshot(get("/worker")).await.expect("call")).await;
    assert_eq!(status["state"], "active");
    assert_eq!(status["update_available"], false);

    let shell = gateway.public().oneshot(get("/")).await.expect("call");
    assert_eq!(text(shell).await, "shell /");
}

#[tokio::test]
async fn successful_update_flags_update_available() {
    let gateway = Gateway::start().await;

    let update = gateway
        .admin()
        .oneshot(post_json("/update", json!({})))
        .await
        .expect("call");

    assert_eq!(update.status(), StatusCode::OK);
    let body = json_body(update).await;
    assert_eq!(body["state"], "active");
    assert_eq!(body["update_available"], true);
}

#[tokio::test]
async fn unregistered_gateway_rejects_events() {
    let gateway = Gateway::start().await;

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/worker")
        .body(Body::empty())
        .expect("request");
    let removed = gateway.admin().oneshot(request).await.expect("call");
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let push = Request::builder()
        .method(Method::POST)
        .uri("/push")
        .body(Body::empty())
        .expect("request");
    let rejected = gateway.admin().oneshot(push).await.expect("call");
    assert_eq!(rejected.status(), StatusCode::CONFLICT);
}

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use snapgram::{
    backend::{Backend, MemoryBackend},
    config::GatewayConfig,
    gateway::Gateway,
    query::Queries,
    routes,
    session::SessionContext,
    states::AppState,
};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with_rate(requests_per_second: u32) -> Router {
    let memory = Arc::new(MemoryBackend::new("test-secret").with_hash_cost(4));
    let gateway = Gateway::new(Backend::in_memory(memory), GatewayConfig::default());
    let session = Arc::new(SessionContext::new(Arc::new(Queries::new(Arc::new(gateway)))));
    let state = AppState::new(session, requests_per_second).unwrap();
    routes::router(state, 64)
}

fn app() -> Router {
    app_with_rate(10_000)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value, Option<String>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, location)
}

async fn signed_up(app: &Router) -> Value {
    let (status, body, _) = send(
        app,
        Method::POST,
        "/sign-up",
        Some(json!({
            "name": "Anna Kováčová",
            "username": "anna",
            "email": "anna@example.sk",
            "password": "password123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn post_form(caption: &str) -> Value {
    json!({
        "caption": caption,
        "tags": "výlet, hory",
        "file": [{ "name": "a.png", "contentType": "image/png", "data": STANDARD.encode([1u8, 2, 3]) }]
    })
}

#[tokio::test]
async fn health_is_public() {
    let (status, body, _) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn private_routes_redirect_to_sign_in() {
    let app = app();
    for uri in ["/", "/explore", "/saved", "/all-users", "/posts/p1", "/update-post/p1"] {
        let (status, _, location) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location.as_deref(), Some("/sign-in"));
    }
}

#[tokio::test]
async fn sign_up_navigates_home() {
    let app = app();
    let body = signed_up(&app).await;
    assert_eq!(body["redirect"], "/");
    assert_eq!(body["user"]["username"], "anna");

    let (status, home, _) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(home["posts"], json!([]));

    let (status, _, location) = send(&app, Method::GET, "/sign-in", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/"));
}

#[tokio::test]
async fn invalid_sign_up_reports_fields() {
    let (status, body, _) = send(
        &app(),
        Method::POST,
        "/sign-up",
        Some(json!({ "name": "A", "username": "anna", "email": "nope", "password": "password123" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["name"].is_array());
    assert!(body["fields"]["email"].is_array());
}

#[tokio::test]
async fn wrong_password_asks_to_retry() {
    let app = app();
    signed_up(&app).await;
    send(&app, Method::POST, "/sign-out", None).await;

    let (status, body, _) = send(
        &app,
        Method::POST,
        "/sign-in",
        Some(json!({ "email": "anna@example.sk", "password": "wrong-password" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Sign in failed. Please try again.");
}

#[tokio::test]
async fn sign_out_locks_private_routes() {
    let app = app();
    signed_up(&app).await;

    let (status, _, location) = send(&app, Method::POST, "/sign-out", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/sign-in"));

    let (status, _, _) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn post_lifecycle() {
    let app = app();
    signed_up(&app).await;

    let (status, created, _) = send(&app, Method::POST, "/create-post", Some(post_form("Dnešný výlet"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tags"], json!(["výlet", "hory"]));
    let id = created["id"].as_str().unwrap().to_string();

    let (_, home, _) = send(&app, Method::GET, "/", None).await;
    assert_eq!(home["posts"][0]["id"], id.as_str());

    let (status, liked, _) = send(&app, Method::POST, &format!("/posts/{}/like", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["likes"].as_array().unwrap().len(), 1);

    let (_, details, _) = send(&app, Method::GET, &format!("/posts/{}", id), None).await;
    assert_eq!(details["liked"], true);
    assert_eq!(details["isCreator"], true);

    let (_, unliked, _) = send(&app, Method::POST, &format!("/posts/{}/like", id), None).await;
    assert_eq!(unliked["likes"], json!([]));

    let (status, _, _) = send(&app, Method::POST, &format!("/posts/{}/save", id), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, saved, _) = send(&app, Method::GET, "/saved", None).await;
    assert_eq!(saved["posts"][0]["id"], id.as_str());

    let (status, _, _) = send(&app, Method::DELETE, &format!("/posts/{}/save", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, saved, _) = send(&app, Method::GET, "/saved", None).await;
    assert_eq!(saved["posts"], json!([]));

    let (_, edit, _) = send(&app, Method::GET, &format!("/update-post/{}", id), None).await;
    assert_eq!(edit["tags"], "výlet,hory");

    let mut update = post_form("Upravený popis");
    update["file"] = json!([]);
    let (status, updated, _) = send(&app, Method::POST, &format!("/update-post/{}", id), Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["caption"], "Upravený popis");
    assert_eq!(updated["imageId"], created["imageId"]);

    let (status, _, _) = send(&app, Method::DELETE, &format!("/posts/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, Method::GET, &format!("/posts/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn short_caption_is_rejected() {
    let app = app();
    signed_up(&app).await;

    let (status, body, _) = send(&app, Method::POST, "/create-post", Some(post_form("Ahoj"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["caption"].is_array());
}

#[tokio::test]
async fn explore_switches_between_feed_and_search() {
    let app = app();
    signed_up(&app).await;
    send(&app, Method::POST, "/create-post", Some(post_form("Výlet do hôr"))).await;

    let (_, feed, _) = send(&app, Method::GET, "/explore", None).await;
    assert_eq!(feed["mode"], "feed");
    assert_eq!(feed["feed"]["pages"][0].as_array().unwrap().len(), 1);

    let (_, found, _) = send(&app, Method::GET, "/explore?q=h%C3%B4r", None).await;
    assert_eq!(found["mode"], "search");
    assert_eq!(found["search"]["state"], "results");

    let (_, missing, _) = send(&app, Method::GET, "/explore?q=more", None).await;
    assert_eq!(missing["search"]["state"], "noResults");

    let (_, next, _) = send(&app, Method::POST, "/explore/next", None).await;
    assert_eq!(next["hasNextPage"], false);
}

#[tokio::test]
async fn exhausted_rate_limit_returns_429() {
    let app = app_with_rate(1);
    send(&app, Method::GET, "/health", None).await;

    let (status, body, _) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests");
}

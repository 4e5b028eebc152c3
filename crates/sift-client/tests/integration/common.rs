use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use serde_json::json;

use sift_core::models::{NewPattern, Page, Pattern, RuleId, Site};

pub const TEST_TOKEN: &str = "test-token";

pub const LIST_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Catalog</title></head>
<body>
  <header><nav><a href="/">Home</a><a href="/about">About</a></nav></header>
  <div id="catalog" class="list">
    <h2>Products</h2>
    <ul>
      <li><a href="/p/1"><span class="name">Lamp</span></a><em>12.00</em></li>
      <li><a href="/p/2"><span class="name">Desk</span></a><em>80.00</em></li>
      <li><a href="/p/3"><span class="name">Chair</span></a><em>45.50</em></li>
    </ul>
    <p>3 results</p><p>page 1</p>
  </div>
</body>
</html>"#;

pub const LOGIN_PAGE: &str = r#"<html><body>
  <form action="/login">
    <input name="user"><input name="password" type="password">
    <button>Sign in</button>
  </form>
</body></html>"#;

/// In-memory rule repository plus a sandbox proxy serving fixture pages.
#[derive(Default)]
pub struct Backend {
    pub rules: Vec<Pattern>,
    next_id: RuleId,
    pub pages: HashMap<String, String>,
    pub proxy_queries: Vec<HashMap<String, String>>,
    pub requests: Vec<String>,
}

pub type SharedBackend = Arc<Mutex<Backend>>;

pub struct TestServer {
    pub base_url: String,
    pub backend: SharedBackend,
}

impl TestServer {
    pub fn proxy_url(&self) -> String {
        format!("{}/fetch", self.base_url)
    }

    pub fn rules(&self) -> Vec<Pattern> {
        self.backend.lock().unwrap().rules.clone()
    }

    pub fn requests(&self) -> Vec<String> {
        self.backend.lock().unwrap().requests.clone()
    }

    pub fn seed(&self, rule: NewPattern) -> Pattern {
        let mut backend = self.backend.lock().unwrap();
        backend.next_id += 1;
        let pattern = rule.into_pattern(backend.next_id);
        backend.rules.push(pattern.clone());
        pattern
    }
}

pub fn site() -> Site {
    Site {
        id: 1,
        name: "catalog".into(),
        auth_username: Some("crawler".into()),
        auth_password: Some("pw".into()),
        cookies: Some("session=abc".into()),
        ..Default::default()
    }
}

pub fn list_page() -> Page {
    Page {
        id: 10,
        site_id: 1,
        name: "products".into(),
        url: "https://catalog.example/products".into(),
        is_login_page: false,
    }
}

pub fn login_page() -> Page {
    Page {
        id: 11,
        site_id: 1,
        name: "login".into(),
        url: "https://catalog.example/login".into(),
        is_login_page: true,
    }
}

/// Start the backend on an ephemeral port.
pub async fn spawn_server() -> TestServer {
    let mut backend = Backend::default();
    backend.pages.insert(list_page().url, LIST_PAGE.to_string());
    backend.pages.insert(login_page().url, LOGIN_PAGE.to_string());
    let backend = Arc::new(Mutex::new(backend));

    let app = Router::new()
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{id}", put(update_rule).delete(delete_rule))
        .route("/rules/{id}/extract", post(extract_rule))
        .route("/fetch", get(fetch_page))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestServer {
        base_url: format!("http://{addr}"),
        backend,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn error(status: StatusCode, field: &str, message: &str) -> Response {
    (status, Json(json!({ field: message }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

async fn list_rules(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    backend.requests.push(format!("GET /rules {query:?}"));
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "error", "unauthorized");
    }

    let parse = |key: &str| query.get(key).and_then(|v| v.parse::<i64>().ok());
    let rules: Vec<Pattern> = match (parse("sourcePage"), parse("parentPattern")) {
        (Some(page), _) => backend
            .rules
            .iter()
            .filter(|r| r.parent_pattern.is_none() && r.source_page == Some(page))
            .cloned()
            .collect(),
        (None, Some(parent)) => backend
            .rules
            .iter()
            .filter(|r| r.parent_pattern == Some(parent))
            .cloned()
            .collect(),
        (None, None) => {
            return error(StatusCode::BAD_REQUEST, "detail", "sourcePage or parentPattern required");
        }
    };
    Json(rules).into_response()
}

async fn create_rule(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(rule): Json<NewPattern>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    backend.requests.push(format!(
        "POST /rules {}",
        rule.selector.as_deref().unwrap_or_default()
    ));
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "error", "unauthorized");
    }
    if let Some(parent) = rule.parent_pattern
        && !backend.rules.iter().any(|r| r.id == parent)
    {
        return error(StatusCode::NOT_FOUND, "error", "parent rule not found");
    }

    backend.next_id += 1;
    let pattern = rule.into_pattern(backend.next_id);
    backend.rules.push(pattern.clone());
    (StatusCode::CREATED, Json(pattern)).into_response()
}

async fn update_rule(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Path(id): Path<RuleId>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    backend.requests.push(format!("PUT /rules/{id} {}", body["selector"]));
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "error", "unauthorized");
    }
    let Some(selector) = body["selector"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "detail", "selector required");
    };
    match backend.rules.iter_mut().find(|r| r.id == id) {
        Some(rule) => {
            rule.selector = selector.to_string();
            Json(rule.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "message", &format!("rule {id} not found")),
    }
}

async fn delete_rule(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Path(id): Path<RuleId>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    backend.requests.push(format!("DELETE /rules/{id}"));
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "error", "unauthorized");
    }
    if backend.rules.iter().any(|r| r.parent_pattern == Some(id)) {
        return error(StatusCode::CONFLICT, "error", "rule still has children");
    }
    match backend.rules.iter().position(|r| r.id == id) {
        Some(pos) => {
            backend.rules.remove(pos);
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(StatusCode::NOT_FOUND, "message", &format!("rule {id} not found")),
    }
}

async fn extract_rule(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Path(id): Path<RuleId>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    backend.requests.push(format!("POST /rules/{id}/extract"));
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "error", "unauthorized");
    }
    match backend.rules.iter().find(|r| r.id == id) {
        None => error(StatusCode::NOT_FOUND, "detail", "rule not found"),
        Some(rule) if rule.mapped_attribute.is_none() && rule.input_value.is_none() => {
            error(StatusCode::UNPROCESSABLE_ENTITY, "detail", "rule has no mapping")
        }
        Some(_) => "extracted 3 values".into_response(),
    }
}

async fn fetch_page(
    State(backend): State<SharedBackend>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    let page = query.get("url").and_then(|url| backend.pages.get(url)).cloned();
    backend.proxy_queries.push(query);
    match page {
        Some(html) => Html(html).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

//! Sharing workflows over HTTP.
//!
//! These tests start a real server on a random port, speak HTTP/1.1 over raw
//! TCP, and assert on observable behavior: status codes, bodies, and the
//! exact 404 messages of the intersection endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use strata::config::{Auth, Config, Database, Server as ServerConfig};
use strata::module::Module;
use strata::permissions_api::PermissionsModule;
use strata::surface::SurfacesModule;
use strata::{Router, UserId, directory, server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct TestApp {
    server: server::Server,
    db: Arc<libsql::Database>,
    auth: Auth,
    // Keeps the database file alive for the test's duration.
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    fn conn(&self) -> libsql::Connection {
        strata::db::connection(&self.db).unwrap()
    }

    fn token(&self, user: UserId) -> String {
        strata::auth::create_token(&self.auth, user).unwrap()
    }

    async fn shutdown(self) {
        self.server.shutdown().await.unwrap();
    }
}

/// Start a server with the permissions and surfaces modules on a random port,
/// backed by a file database so every request-scoped connection sees the same
/// data.
async fn start_app() -> TestApp {
    // Honors RUST_LOG; the second and later calls are no-ops.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let auth = Auth {
        jwt_secret: "test-secret-that-is-at-least-32b!".to_string(),
        token_expiry_days: 1,
    };
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: Database {
            url: db_path.to_string_lossy().into_owned(),
        },
        auth: auth.clone(),
    };

    let db = Arc::new(strata::db::connect(&config.database.url).await.unwrap());
    strata::db::init_schema(&strata::db::connection(&db).unwrap())
        .await
        .unwrap();

    let mut router = Router::new();
    PermissionsModule.routes(&mut router);
    SurfacesModule.routes(&mut router);

    let server = server::start(config, Arc::clone(&db), router.into_handle())
        .await
        .expect("failed to start test server");

    TestApp {
        server,
        db,
        auth,
        _dir: dir,
    }
}

/// Send one request and return (status, parsed JSON body or Null).
async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> (u16, Value) {
    let body_str = body.map(|b| b.to_string()).unwrap_or_default();

    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
    if let Some(token) = token {
        req.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    if !body_str.is_empty() {
        req.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body_str.len()
        ));
    }
    req.push_str("Connection: close\r\n\r\n");
    req.push_str(&body_str);

    let mut stream = TcpStream::connect(addr).await.expect("failed to connect");
    stream.write_all(req.as_bytes()).await.expect("failed to write");

    let mut buf = Vec::new();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_end(&mut buf),
    )
    .await
    .expect("response timed out")
    .expect("failed to read");

    let text = String::from_utf8_lossy(&buf);
    let status: u16 = text
        .split_whitespace()
        .nth(1)
        .expect("no status line")
        .parse()
        .expect("bad status code");
    let body = text.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
    let json = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body.trim()).unwrap_or(Value::Null)
    };
    (status, json)
}

fn error_message(body: &Value) -> &str {
    body["error"].as_str().unwrap_or("")
}

/// Create a surface as `token` and return (surface id, permission set id).
async fn create_surface(addr: SocketAddr, token: &str, name: &str) -> (i64, i64) {
    let (status, body) = request(
        addr,
        "POST",
        "/api/v1/surfaces",
        Some(token),
        Some(&json!({ "name": name })),
    )
    .await;
    assert_eq!(status, 201, "create failed: {body}");
    (
        body["id"].as_i64().unwrap(),
        body["permission_set_id"].as_i64().unwrap(),
    )
}

async fn share(addr: SocketAddr, token: &str, surface: i64, user: UserId, allow: &str) {
    let (status, body) = request(
        addr,
        "POST",
        &format!("/api/v1/surfaces/{surface}/share"),
        Some(token),
        Some(&json!({ "user": user, "allow": allow })),
    )
    .await;
    assert_eq!(status, 204, "share failed: {body}");
}

// ---------------------------------------------------------------------------
// Sharing scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn viewer_can_read_but_not_edit() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let bob = directory::create_user(&conn, "bob").await.unwrap();
    let addr = app.addr();

    let (surface, _) = create_surface(addr, &app.token(alice), "steel sample").await;
    share(addr, &app.token(alice), surface, bob, "view").await;

    let (status, body) = request(
        addr,
        "GET",
        &format!("/api/v1/surfaces/{surface}"),
        Some(&app.token(bob)),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["name"], "steel sample");

    let (status, _) = request(
        addr,
        "PATCH",
        &format!("/api/v1/surfaces/{surface}"),
        Some(&app.token(bob)),
        Some(&json!({ "description": "scratched" })),
    )
    .await;
    assert_eq!(status, 403);

    app.shutdown().await;
}

#[tokio::test]
async fn revoked_viewer_sees_404() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let bob = directory::create_user(&conn, "bob").await.unwrap();
    let addr = app.addr();

    let (surface, _) = create_surface(addr, &app.token(alice), "steel sample").await;
    share(addr, &app.token(alice), surface, bob, "view").await;

    let (status, body) = request(
        addr,
        "POST",
        &format!("/api/v1/surfaces/{surface}/unshare"),
        Some(&app.token(alice)),
        Some(&json!({ "user": bob })),
    )
    .await;
    assert_eq!(status, 204, "unshare failed: {body}");

    let (status, _) = request(
        addr,
        "GET",
        &format!("/api/v1/surfaces/{surface}"),
        Some(&app.token(bob)),
        None,
    )
    .await;
    assert_eq!(status, 404);

    app.shutdown().await;
}

#[tokio::test]
async fn hidden_and_missing_surfaces_are_indistinguishable() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let carol = directory::create_user(&conn, "carol").await.unwrap();
    let addr = app.addr();

    let (surface, _) = create_surface(addr, &app.token(alice), "private").await;

    let (hidden_status, _) = request(
        addr,
        "GET",
        &format!("/api/v1/surfaces/{surface}"),
        Some(&app.token(carol)),
        None,
    )
    .await;
    let (missing_status, _) = request(
        addr,
        "GET",
        "/api/v1/surfaces/99999",
        Some(&app.token(carol)),
        None,
    )
    .await;
    assert_eq!(hidden_status, 404);
    assert_eq!(missing_status, 404);

    app.shutdown().await;
}

#[tokio::test]
async fn published_surface_is_world_readable_but_not_writable() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let stranger = directory::create_user(&conn, "stranger").await.unwrap();
    let addr = app.addr();

    let (public, _) = create_surface(addr, &app.token(alice), "published").await;
    let (_private, _) = create_surface(addr, &app.token(alice), "private").await;

    let (status, _) = request(
        addr,
        "POST",
        &format!("/api/v1/surfaces/{public}/publish"),
        Some(&app.token(alice)),
        None,
    )
    .await;
    assert_eq!(status, 204);

    // No token at all: the anonymous principal can read the published one.
    let (status, body) = request(addr, "GET", &format!("/api/v1/surfaces/{public}"), None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["name"], "published");

    // Listing without a token shows published surfaces only.
    let (status, body) = request(addr, "GET", "/api/v1/surfaces", None, None).await;
    assert_eq!(status, 200);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["published"]);

    // Mutations still require a token...
    let (status, _) = request(
        addr,
        "PATCH",
        &format!("/api/v1/surfaces/{public}"),
        None,
        Some(&json!({ "description": "defaced" })),
    )
    .await;
    assert_eq!(status, 401);

    // ...and public visibility never grants edit to an authenticated user.
    let (status, _) = request(
        addr,
        "PATCH",
        &format!("/api/v1/surfaces/{public}"),
        Some(&app.token(stranger)),
        Some(&json!({ "description": "defaced" })),
    )
    .await;
    assert_eq!(status, 403);

    app.shutdown().await;
}

// ---------------------------------------------------------------------------
// Permission-set endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn users_listing_is_name_sorted_and_guarded() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let bob = directory::create_user(&conn, "bob").await.unwrap();
    let carol = directory::create_user(&conn, "carol").await.unwrap();
    let dave = directory::create_user(&conn, "dave").await.unwrap();
    let addr = app.addr();

    let (surface, set) = create_surface(addr, &app.token(alice), "steel sample").await;
    // Grant in non-alphabetical order to prove the sort.
    share(addr, &app.token(alice), surface, carol, "edit").await;
    share(addr, &app.token(alice), surface, bob, "view").await;

    let path = format!("/api/v1/permission-sets/{set}/users");

    let (status, body) = request(addr, "GET", &path, Some(&app.token(bob)), None).await;
    assert_eq!(status, 200);
    let entries = body.as_array().unwrap();
    let summary: Vec<(String, String)> = entries
        .iter()
        .map(|e| {
            (
                e["user"]["name"].as_str().unwrap().to_string(),
                e["allow"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("alice".to_string(), "full".to_string()),
            ("bob".to_string(), "view".to_string()),
            ("carol".to_string(), "edit".to_string()),
        ]
    );

    // Unauthenticated: 403, not 401, for these endpoints.
    let (status, _) = request(addr, "GET", &path, None, None).await;
    assert_eq!(status, 403);

    // Authenticated but without view permission: 403.
    let (status, _) = request(addr, "GET", &path, Some(&app.token(dave)), None).await;
    assert_eq!(status, 403);

    // Nonexistent set: 404.
    let (status, _) = request(
        addr,
        "GET",
        "/api/v1/permission-sets/99999/users",
        Some(&app.token(alice)),
        None,
    )
    .await;
    assert_eq!(status, 404);

    app.shutdown().await;
}

#[tokio::test]
async fn intersection_endpoint_error_contract() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let bob = directory::create_user(&conn, "bob").await.unwrap();
    let addr = app.addr();

    let (_, visible) = create_surface(addr, &app.token(alice), "mine").await;
    let (_, hidden) = create_surface(addr, &app.token(bob), "not mine").await;
    let token = app.token(alice);
    let base = "/api/v1/permission-sets/intersection";

    let (status, body) = request(addr, "GET", base, Some(&token), None).await;
    assert_eq!(status, 404);
    assert_eq!(error_message(&body), "No permission set IDs provided");

    let (status, body) = request(addr, "GET", &format!("{base}?sets=abc"), Some(&token), None).await;
    assert_eq!(status, 404);
    assert_eq!(error_message(&body), "Invalid permission set ID format");

    let (status, body) = request(
        addr,
        "GET",
        &format!("{base}?sets={hidden}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(error_message(&body), "No accessible permission sets found");

    let (status, body) = request(
        addr,
        "GET",
        &format!("{base}?sets={visible}&sets={hidden}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(
        error_message(&body),
        "Some permission sets do not exist or are inaccessible"
    );

    // Unauthenticated: 403.
    let (status, _) = request(addr, "GET", &format!("{base}?sets={visible}"), None, None).await;
    assert_eq!(status, 403);

    app.shutdown().await;
}

#[tokio::test]
async fn intersection_endpoint_reports_minimum_common_level() {
    let app = start_app().await;
    let conn = app.conn();
    let alice = directory::create_user(&conn, "alice").await.unwrap();
    let bob = directory::create_user(&conn, "bob").await.unwrap();
    let addr = app.addr();

    let (s1, set1) = create_surface(addr, &app.token(alice), "one").await;
    let (s2, set2) = create_surface(addr, &app.token(alice), "two").await;
    share(addr, &app.token(alice), s1, bob, "full").await;
    share(addr, &app.token(alice), s2, bob, "view").await;

    // Comma-separated ids are accepted as well as repeated keys.
    let (status, body) = request(
        addr,
        "GET",
        &format!("/api/v1/permission-sets/intersection?sets={set1},{set2}"),
        Some(&app.token(alice)),
        None,
    )
    .await;
    assert_eq!(status, 200);

    let entries = body.as_array().unwrap();
    let summary: Vec<(String, String)> = entries
        .iter()
        .map(|e| {
            (
                e["user"]["name"].as_str().unwrap().to_string(),
                e["level"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    // Alice holds full on both; bob's weakest link is view.
    assert_eq!(
        summary,
        vec![
            ("alice".to_string(), "full".to_string()),
            ("bob".to_string(), "view".to_string()),
        ]
    );

    app.shutdown().await;
}

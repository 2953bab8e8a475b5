//! End-to-end tests: a live gateway on a loopback port, driven by the HTTP
//! adapter exactly as a remote application would.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use strata_core::{Query, SchemaDefinition, SqlValue, Statement};
use strata_exec::adapter::wire::BOOKMARK_HEADER;
use strata_exec::{
    Adapter, AdapterFactory, AdapterKind, Bindings, Db, GatewayEndpoint, HttpAdapter,
    SqliteAdapter,
};
use strata_gateway::{gateway_router, token, GatewayState};
use tokio::net::TcpListener;

const GATEWAY_KEY: &str = "gateway-key";
const SECRET: &str = "token-secret";
const HOUR: Duration = Duration::from_secs(3600);

// =============================================================================
// Fixtures
// =============================================================================

struct Gateway {
    base_url: String,
}

impl Gateway {
    fn endpoint(&self) -> GatewayEndpoint {
        GatewayEndpoint::new(&self.base_url, GATEWAY_KEY)
    }

    fn adapter(&self, db_name: &str, db_token: &str) -> HttpAdapter {
        HttpAdapter::new(reqwest::Client::new(), &self.endpoint(), db_name, db_token)
            .expect("valid endpoint")
    }
}

async fn spawn_gateway() -> Gateway {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create pool");
    let store: Arc<dyn Adapter> = Arc::new(SqliteAdapter::new(pool));
    let created = store
        .script(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE);\
             CREATE TABLE sessions (id TEXT PRIMARY KEY, userId INTEGER NOT NULL);",
            None,
        )
        .await;
    assert!(created.success, "{:?}", created.error);

    let state = GatewayState::new(GATEWAY_KEY, SECRET)
        .unwrap()
        .with_database("main", store);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway_router(state)).await.unwrap();
    });
    Gateway {
        base_url: format!("http://{addr}"),
    }
}

fn main_token() -> String {
    token::issue("main", SECRET, HOUR).unwrap()
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn session_over_http_tracks_bookmarks() {
    let gateway = spawn_gateway().await;
    let factory = AdapterFactory::new(
        Bindings::new().gateway(gateway.endpoint().with_token("main", main_token())),
    )
    .unwrap();
    let adapter = factory.adapter_for("main").unwrap();
    assert_eq!(adapter.kind(), AdapterKind::Http);

    let schema = SchemaDefinition::new("app")
        .column("users", "id", "integer primary key")
        .column("users", "email", "text not null unique")
        .column("sessions", "id", "text primary key")
        .column("sessions", "userId", "integer not null")
        .compile()
        .unwrap();
    let db = Db::new(adapter, schema).unwrap();
    let mut session = db.session();

    let row = serde_json::from_value(json!({"email": "ada@acme.com"})).unwrap();
    let inserted = session.insert("users", &row).await.unwrap();
    assert!(inserted.success, "{:?}", inserted.error);
    assert_eq!(inserted.meta.as_ref().unwrap().last_row_id, Some(1));
    let after_insert = session.bookmark().map(str::to_string);
    assert!(after_insert.is_some());

    let row = serde_json::from_value(json!({"id": "s1", "userId": 1})).unwrap();
    session.insert("sessions", &row).await.unwrap();
    assert_ne!(session.bookmark().map(str::to_string), after_insert);

    let users = session
        .fetch(&Query::table("users").include("sessions"))
        .await
        .unwrap();
    assert!(users.success, "{:?}", users.error);
    let rows = users.data.unwrap();
    assert_eq!(rows[0]["email"], json!("ada@acme.com"));
    assert_eq!(rows[0]["sessions"], json!([{"id": "s1", "userId": 1}]));
}

#[tokio::test]
async fn raw_first_and_script_routes() {
    let gateway = spawn_gateway().await;
    let adapter = gateway.adapter("main", &main_token());

    let script = adapter
        .script(
            "INSERT INTO users (email) VALUES ('a@x.io');\
             INSERT INTO users (email) VALUES ('b@x.io');",
            None,
        )
        .await;
    assert!(script.success, "{:?}", script.error);

    let select = Statement::raw("SELECT id, email FROM users ORDER BY id");
    let raw = adapter.raw(&select, true, None).await;
    assert_eq!(
        raw.data.unwrap(),
        vec![
            vec![json!("id"), json!("email")],
            vec![json!(1), json!("a@x.io")],
            vec![json!(2), json!("b@x.io")],
        ]
    );

    let first = adapter.first(&select, Some("email"), None).await;
    assert_eq!(first.data, Some(json!("a@x.io")));

    let none = adapter
        .first(
            &Statement::new(
                "SELECT * FROM users WHERE id = ?",
                vec![SqlValue::Int(99)],
            ),
            None,
            None,
        )
        .await;
    assert!(none.success);
    assert_eq!(none.data, Some(Value::Null));
}

#[tokio::test]
async fn batch_is_atomic_over_http() {
    let gateway = spawn_gateway().await;
    let adapter = gateway.adapter("main", &main_token());

    let result = adapter
        .batch(
            &[
                Statement::raw("INSERT INTO users (email) VALUES ('dup@x.io')"),
                Statement::raw("INSERT INTO users (email) VALUES ('dup@x.io')"),
            ],
            None,
        )
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("UNIQUE"));

    let count = adapter
        .first(&Statement::raw("SELECT COUNT(*) AS n FROM users"), Some("n"), None)
        .await;
    assert_eq!(count.data, Some(json!(0)));
}

#[tokio::test]
async fn execution_errors_come_back_as_results() {
    let gateway = spawn_gateway().await;
    let adapter = gateway.adapter("main", &main_token());
    let result = adapter
        .exec(&Statement::raw("SELECT * FROM missing_table"), None)
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("missing_table"));
}

// =============================================================================
// Access control
// =============================================================================

#[tokio::test]
async fn token_rejections_carry_their_reason() {
    let gateway = spawn_gateway().await;
    let select = Statement::raw("SELECT 1");

    let two_hours_ago = chrono::Utc::now() - chrono::Duration::hours(2);
    let expired = token::issue_at("main", SECRET, HOUR, two_hours_ago).unwrap();
    let foreign = token::issue("main", "other-secret", HOUR).unwrap();
    let other_db = token::issue("audit", SECRET, HOUR).unwrap();

    let cases = [
        (expired, "expired"),
        (foreign, "bad_signature"),
        (other_db, "db_mismatch"),
        ("garbage".to_string(), "malformed"),
    ];
    for (db_token, reason) in cases {
        let result = gateway.adapter("main", &db_token).exec(&select, None).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.ends_with(&format!("({reason})")), "{error}");
    }
}

#[tokio::test]
async fn unknown_database_is_not_found() {
    let gateway = spawn_gateway().await;
    let ghost = token::issue("ghost", SECRET, HOUR).unwrap();
    let result = gateway
        .adapter("ghost", &ghost)
        .exec(&Statement::raw("SELECT 1"), None)
        .await;
    assert_eq!(result.error.as_deref(), Some("unknown database 'ghost'"));
}

#[tokio::test]
async fn gateway_key_is_required() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/run", gateway.base_url);
    let body = json!({"query": "SELECT 1", "params": []});

    let missing = client
        .post(&url)
        .header("x-db-name", "main")
        .header("x-db-token", main_token())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(
        missing.json::<Value>().await.unwrap(),
        json!({"error": "unauthorized", "reason": "missing_gateway_key"})
    );

    let wrong = client
        .post(&url)
        .bearer_auth("not-the-key")
        .header("x-db-name", "main")
        .header("x-db-token", main_token())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), reqwest::StatusCode::UNAUTHORIZED);

    let ok = client
        .post(&url)
        .bearer_auth(GATEWAY_KEY)
        .header("x-db-name", "main")
        .header("x-db-token", main_token())
        .json(&json!({"query": "INSERT INTO users (email) VALUES (?)", "params": ["c@x.io"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), reqwest::StatusCode::OK);
    assert!(ok.headers().get(BOOKMARK_HEADER).is_some());
}

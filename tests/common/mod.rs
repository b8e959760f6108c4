#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use labhub::create_app;

/// Fresh app over a temp-file sqlite db with migrations applied.
pub async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create temp dir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

/// One-shot a JSON request and return (status, parsed body).
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    payload: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match payload {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}

/// Register a user through the API, returning (user id, bearer token).
pub async fn register(app: &Router, first: &str, email: &str) -> Result<(Uuid, String)> {
    let (status, body) = call(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "first_name": first,
            "last_name": "Tester",
            "email": email,
            "password": "hunter2hunter2",
        })),
    )
    .await?;
    anyhow::ensure!(
        status == StatusCode::CREATED,
        "register failed: {status} {body}"
    );

    let user_id = Uuid::parse_str(body["user"]["id"].as_str().context("missing user id")?)?;
    let token = body["token"].as_str().context("missing token")?.to_string();
    Ok((user_id, token))
}

pub async fn create_lab(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO labs (id, name, location, status, created_at, updated_at) VALUES (?, ?, 'Building 4', 'active', ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn lab_role_id(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar("SELECT id FROM lab_roles WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

pub async fn sentinel_role_id(pool: &SqlitePool) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar("SELECT id FROM lab_roles WHERE permission_level = -1")
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// Seed a membership directly, bypassing the admission flow.
pub async fn add_member(
    pool: &SqlitePool,
    user_id: Uuid,
    lab_id: Uuid,
    role_name: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let role_id = lab_role_id(pool, role_name).await?;
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO lab_members (id, user_id, lab_id, lab_role_id, induction_done, is_pci, created_at, updated_at) VALUES (?, ?, ?, ?, FALSE, FALSE, ?, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(lab_id)
    .bind(role_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Promote a registered user to the site-wide root admin role.
pub async fn promote_root(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE users SET role_id = (SELECT id FROM roles WHERE permission_level = 100) WHERE id = ?",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn as_uuid(value: &Value) -> Result<Uuid> {
    Ok(Uuid::parse_str(value.as_str().context("expected uuid string")?)?)
}

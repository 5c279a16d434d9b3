//! Shared fixtures for imgq-server integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use imgq_common::db::init_database;
use imgq_common::{Identity, Mode, Role};
use imgq_server::services::{AccessGate, ImageCatalog};
use imgq_server::AppState;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse";

/// File-backed database in a temp folder (kept alive by the returned guard)
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("imgq.db")).await.unwrap();
    (temp_dir, pool)
}

/// Seed document with `count` local images
pub fn seed_doc(count: usize) -> Value {
    let images: Vec<Value> = (0..count)
        .map(|i| json!({"image_path": format!("img_{}.jpg", i), "caption": format!("caption {}", i)}))
        .collect();
    json!({"flickr_url": "https://flickr.example/album", "images": images})
}

pub async fn seed_images(pool: &SqlitePool, count: usize) {
    let loaded = ImageCatalog::new(pool.clone())
        .load(&seed_doc(count))
        .await
        .unwrap();
    assert_eq!(loaded, count);
}

pub async fn create_user(pool: &SqlitePool, username: &str, role: Role) -> Identity {
    let user = AccessGate::new(pool.clone())
        .create_user(username, PASSWORD, role)
        .await
        .unwrap();
    Identity {
        user_id: user.id,
        username: user.username,
        role: user.role,
    }
}

pub fn test_state(pool: SqlitePool, mode: Mode) -> AppState {
    AppState::new(pool, mode, PathBuf::from("."), 50)
}

/// `Authorization` header value for a test user
pub fn basic_auth(username: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, PASSWORD)))
}

pub fn get_as(uri: &str, username: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth(username))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json_as(uri: &str, username: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth(username))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

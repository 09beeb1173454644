//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use axum::{body::Body, http::HeaderName, response::Response};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::Sha256;
use tempfile::TempDir;

pub const SECRET: &str = "test-signing-secret";

/// Signs claims as HS256 the way the account service issues tokens.
pub fn sign_token(claims: &Value, secret: &[u8]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{header}.{payload}");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{signature}")
}

pub fn access_token() -> String {
    sign_token(
        &json!({"exp": Utc::now().timestamp() + 600, "token_type": "access", "user_id": 3}),
        SECRET.as_bytes(),
    )
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header(response: &Response<Body>, name: HeaderName) -> String {
    response
        .headers()
        .get(name)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Entries left under `dir` once workspace removal has settled. Removal
/// runs on the blocking pool, so this polls briefly before counting.
pub async fn settled_entries(dir: &Path) -> usize {
    let count = || match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    };

    for _ in 0..200 {
        if count() == 0 {
            return 0;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    count()
}

/// Executable shell script standing in for yt-dlp. `$OUT_DIR` holds the
/// directory of the `-o` template the service passed.
#[cfg(unix)]
pub fn fake_yt_dlp(body: &str) -> (TempDir, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yt-dlp");
    let script = format!(
        r#"#!/bin/sh
OUT_DIR=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then OUT_DIR=$(dirname "$arg"); fi
  prev="$arg"
done
{body}
"#
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

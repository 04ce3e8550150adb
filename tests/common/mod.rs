#![allow(dead_code)]

use std::{io::Cursor, path::Path};

use axum::{
    body::{self, Body, Bytes},
    http::header::SET_COOKIE,
    response::Response,
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use image::{ImageBuffer, ImageFormat, Rgb};
use poll_site::{
    accounts,
    config::Config,
    flash::FLASH_COOKIE,
    media::{MediaStore, Upload},
    models::{Choice, Poll, User},
    poll,
    proposal::{self, Proposal},
    routes,
    session::SESSION_COOKIE,
    state::AppState,
};
use sqlx::PgPool;

pub const PASSWORD: &str = "correct horse";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub async fn create_user(pool: &PgPool, username: &str, is_staff: bool) -> User {
    let hash = accounts::hash_password(PASSWORD).unwrap();
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, is_staff)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, email, password_hash, is_staff, date_joined
        "#,
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(hash)
    .bind(is_staff)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// A poll created at [`t0`], expiring a week later.
pub async fn create_poll(
    pool: &PgPool,
    creator: &User,
    approved: bool,
    choices: &[&str],
) -> (Poll, Vec<Choice>) {
    create_poll_at(pool, creator, approved, choices, t0()).await
}

pub async fn create_poll_at(
    pool: &PgPool,
    creator: &User,
    approved: bool,
    choices: &[&str],
    created_at: DateTime<Utc>,
) -> (Poll, Vec<Choice>) {
    let media = MediaStore::new(std::env::temp_dir().join("poll-site-tests"));
    let submission = Proposal {
        question_text: "Favourite season?".into(),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        ..Proposal::default()
    };

    let (mut poll, choices) = proposal::propose_poll(pool, &media, creator, submission, created_at)
        .await
        .unwrap();

    if approved {
        poll::set_approved(pool, &[poll.id], true).await.unwrap();
        poll.is_approved = true;
    }
    (poll, choices)
}

pub async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

/// A small, real PNG.
pub fn png(filename: &str) -> Upload {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(2, 2);
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    Upload {
        filename: filename.into(),
        bytes: Bytes::from(bytes),
    }
}

pub fn html(filename: &str) -> Upload {
    Upload {
        filename: filename.into(),
        bytes: Bytes::from_static(b"<script>fetch('/accounts/profile/delete/', {method: 'POST'})</script>"),
    }
}

/// The full router over `pool`, storing uploads under `media_root`.
pub fn app(pool: PgPool, media_root: &Path) -> (AppState, Router) {
    let root = media_root.to_string_lossy().into_owned();
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "SESSION_SECRET" => Some("test-secret".to_string()),
        "MEDIA_ROOT" => Some(root.clone()),
        _ => None,
    })
    .unwrap();

    let state = AppState::new(pool, config);
    (state.clone(), routes::create_routes(state))
}

pub fn session_cookie(state: &AppState, user: &User) -> String {
    format!("{SESSION_COOKIE}={}", state.sessions.issue(user.id).unwrap())
}

/// Message codes queued in the response's flash cookie.
pub fn flash_codes(response: &Response) -> Vec<String> {
    let prefix = format!("{FLASH_COOKIE}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split(';').next())
        .flat_map(|codes| codes.split('.'))
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub const BOUNDARY: &str = "XPOLLTESTBOUNDARY";

/// A `multipart/form-data` body of text fields plus optional files.
pub fn multipart(fields: &[(&str, &str)], files: &[(&str, &Upload)]) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    for (name, upload) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                upload.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(&upload.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

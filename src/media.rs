//! Uploaded image files (avatars and poll images) on the local filesystem.
//!
//! Rows only ever store the path relative to the media root, e.g.
//! `avatars/user_7/3f9c1a2b_me.png`.
use std::{
    io,
    path::{Component, Path, PathBuf},
};

use axum::body::Bytes;
use image::ImageFormat;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ValidationErrors;

pub const POLL_IMAGE_DIR: &str = "polls/images";

pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

pub fn avatar_dir(user_id: i64) -> String {
    format!("avatars/user_{user_id}")
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("refusing media path {0:?}")]
    InvalidPath(String),

    #[error("upload is not a supported image")]
    NotAnImage,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Bytes,
}

impl Upload {
    /// Sniffs the format from the content and decodes it fully. The client's
    /// filename and content type play no part.
    pub fn image_format(&self) -> Result<ImageFormat, MediaError> {
        let format = image::guess_format(&self.bytes).map_err(|_| MediaError::NotAnImage)?;
        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(MediaError::NotAnImage);
        }

        image::load_from_memory_with_format(&self.bytes, format).map_err(|e| {
            debug!(filename = %self.filename, "rejecting undecodable upload: {e}");
            MediaError::NotAnImage
        })?;
        Ok(format)
    }
}

/// Records the standard form error under `field` when `upload` is not an image.
pub fn check_image(errors: &mut ValidationErrors, field: &str, upload: Option<&Upload>) {
    if let Some(upload) = upload {
        if upload.image_format().is_err() {
            errors.add(field, INVALID_IMAGE);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `upload` under `dir` and returns its relative path. Only images
    /// are stored, and the extension always matches the decoded format.
    pub async fn save(&self, dir: &str, upload: &Upload) -> Result<String, MediaError> {
        let format = upload.image_format()?;
        let relative = format!(
            "{dir}/{}_{}",
            &Uuid::new_v4().simple().to_string()[..8],
            stored_name(&upload.filename, format)
        );
        let path = self.resolve(&relative)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &upload.bytes).await?;

        debug!(path = %relative, bytes = upload.bytes.len(), "stored upload");
        Ok(relative)
    }

    pub async fn remove(&self, relative: &str) -> Result<(), MediaError> {
        let path = self.resolve(relative)?;
        fs::remove_file(path).await?;
        debug!(path = %relative, "removed upload");
        Ok(())
    }

    /// Best-effort removal: failures are logged, never returned.
    pub async fn discard(&self, relative: &str) {
        if let Err(e) = self.remove(relative).await {
            warn!(path = %relative, "failed to remove media file: {e}");
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, MediaError> {
        let rel = Path::new(relative);
        let clean = !relative.is_empty()
            && rel
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if clean {
            Ok(self.root.join(rel))
        } else {
            Err(MediaError::InvalidPath(relative.to_string()))
        }
    }
}

/// Keeps only the final path segment, restricted to `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sanitized stem of the client's filename plus the extension of `format`.
fn stored_name(filename: &str, format: ImageFormat) -> String {
    let sanitized = sanitize_filename(filename);
    let stem = match Path::new(&sanitized).file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => "upload".to_string(),
    };
    let extension = format.extensions_str().first().copied().unwrap_or("bin");

    format!("{stem}.{extension}")
}

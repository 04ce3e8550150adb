// handlers/mod.rs
use std::collections::HashMap;

use axum::extract::Multipart;

use crate::{
    error::{AppError, AppResult},
    media::Upload,
};

pub mod accounts;
pub mod polls;

/// A decoded `multipart/form-data` body: text fields (repeatable) and files.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Upload>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed form data: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                    // Browsers send an empty part for an untouched file input.
                    if !filename.is_empty() && !bytes.is_empty() {
                        form.files.insert(name, Upload { filename, bytes });
                    }
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Malformed form field: {e}")))?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        }

        Ok(form)
    }

    /// First value of `name`, or empty.
    pub fn text(&self, name: &str) -> String {
        self.opt_text(name).unwrap_or_default()
    }

    pub fn opt_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(|values| values.first()).cloned()
    }

    /// Checkbox semantics: present and not `"false"`.
    pub fn checked(&self, name: &str) -> bool {
        self.opt_text(name)
            .is_some_and(|value| !value.is_empty() && !value.eq_ignore_ascii_case("false"))
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRequest,
        http::{header::CONTENT_TYPE, Request},
    };

    use super::*;

    const BOUNDARY: &str = "XPOLLBOUNDARY";

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    async fn read(parts: &[(&str, Option<&str>, &str)]) -> FormData {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        let multipart = Multipart::from_request(request, &()).await.unwrap();
        FormData::read(multipart).await.unwrap()
    }

    #[tokio::test]
    async fn collects_repeated_fields_and_files() {
        let mut form = read(&[
            ("question_text", None, "Lunch?"),
            ("choice", None, "Pizza"),
            ("choice", None, "Sushi"),
            ("image", Some("lunch.png"), "PNGDATA"),
        ])
        .await;

        assert_eq!(form.text("question_text"), "Lunch?");
        assert_eq!(form.all("choice"), ["Pizza", "Sushi"]);
        assert_eq!(form.opt_text("expire_at"), None);

        let image = form.take_file("image").unwrap();
        assert_eq!(image.filename, "lunch.png");
        assert_eq!(&image.bytes[..], b"PNGDATA");
        assert!(form.take_file("image").is_none());
    }

    #[tokio::test]
    async fn checkbox_values() {
        let form = read(&[("photo-clear", None, "on"), ("notify", None, "false")]).await;
        assert!(form.checked("photo-clear"));
        assert!(!form.checked("notify"));
        assert!(!form.checked("absent"));
    }

    #[tokio::test]
    async fn empty_file_input_is_ignored() {
        let mut form = read(&[("username", None, "alice"), ("photo", Some(""), "")]).await;
        assert_eq!(form.text("username"), "alice");
        assert!(form.take_file("photo").is_none());
        assert_eq!(form.text("missing"), "");
    }
}

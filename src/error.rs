use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{accounts::AccountError, media::MediaError, proposal::ProposalError};

pub const LOGIN_URL: &str = "/accounts/login/";

/// Field-keyed form errors, the JSON stand-in for a re-rendered form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("login required")]
    LoginRequired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("please correct the errors below")]
    Validation(ValidationErrors),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ProposalError> for AppError {
    fn from(err: ProposalError) -> Self {
        match err {
            ProposalError::Invalid(errors) => AppError::Validation(errors),
            ProposalError::Media(e) => AppError::Media(e),
            ProposalError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Invalid(errors) => AppError::Validation(errors),
            AccountError::InvalidCredentials => AppError::Validation(ValidationErrors::single(
                "__all__",
                "Please enter a correct username and password.",
            )),
            AccountError::Hash(e) => AppError::Internal(e),
            AccountError::Media(e) => AppError::Media(e),
            AccountError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::LoginRequired => return Redirect::to(LOGIN_URL).into_response(),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Media(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MEDIA_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = match self {
            AppError::Validation(fields) => ErrorResponse {
                error: kind,
                message: "Please correct the errors below.".to_string(),
                fields: Some(fields),
            },
            err if status.is_server_error() => {
                error!("{err}");
                ErrorResponse {
                    error: kind,
                    message: "An internal error occurred".to_string(),
                    fields: None,
                }
            }
            err => ErrorResponse {
                error: kind,
                message: err.to_string(),
                fields: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_collect_per_field() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("choices", "At least two choices are required.");
        errors.add("choices", "Choice text is too long.");
        errors.add("question_text", "This field is required.");

        assert_eq!(errors.get("choices").map(<[String]>::len), Some(2));
        assert_eq!(errors.get("expire_at"), None);
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn error_statuses() {
        let login = AppError::LoginRequired.into_response();
        assert_eq!(login.status(), StatusCode::SEE_OTHER);
        assert_eq!(login.headers()[axum::http::header::LOCATION], LOGIN_URL);

        let missing = AppError::NotFound("Poll not found".into()).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = AppError::Validation(ValidationErrors::single("choice", "Required."));
        assert_eq!(invalid.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let db = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(db.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Users propose polls; they stay unapproved until a moderator flips the flag.
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::{
    error::ValidationErrors,
    media::{check_image, MediaError, MediaStore, Upload, POLL_IMAGE_DIR},
    models::{Choice, Poll, User},
};

pub const DEFAULT_LIFETIME_DAYS: i64 = 7;
pub const MIN_CHOICES: usize = 2;
pub const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("invalid proposal")]
    Invalid(ValidationErrors),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Raw proposal form input.
#[derive(Debug, Clone, Default)]
pub struct Proposal {
    pub question_text: String,
    pub expire_at: Option<String>,
    pub choices: Vec<String>,
    pub image: Option<Upload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidProposal {
    pub question_text: String,
    pub expire_at: DateTime<Utc>,
    pub choices: Vec<String>,
}

pub fn default_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(DEFAULT_LIFETIME_DAYS)
}

/// Accepts RFC 3339 or the `datetime-local` form (`2025-03-08T18:30`, read as UTC).
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })
}

impl Proposal {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidProposal, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let question_text = self.question_text.trim().to_string();
        if question_text.is_empty() {
            errors.add("question_text", "This field is required.");
        } else if question_text.chars().count() > MAX_TEXT_LEN {
            errors.add(
                "question_text",
                format!("Ensure this value has at most {MAX_TEXT_LEN} characters."),
            );
        }

        let expire_at = match self.expire_at.as_deref().map(str::trim) {
            None | Some("") => Some(default_expiry(now)),
            Some(raw) => match parse_expiry(raw) {
                Some(at) if at > now => Some(at),
                Some(_) => {
                    errors.add("expire_at", "The expiry date must be in the future.");
                    None
                }
                None => {
                    errors.add("expire_at", "Enter a valid date/time.");
                    None
                }
            },
        };

        let choices: Vec<String> = self
            .choices
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if choices.len() < MIN_CHOICES {
            errors.add(
                "choices",
                format!("Please submit at least {MIN_CHOICES} choices."),
            );
        }
        if choices.iter().any(|c| c.chars().count() > MAX_TEXT_LEN) {
            errors.add(
                "choices",
                format!("Ensure each choice has at most {MAX_TEXT_LEN} characters."),
            );
        }
        check_image(&mut errors, "image", self.image.as_ref());

        errors.into_result()?;

        Ok(ValidProposal {
            question_text,
            expire_at: expire_at.unwrap_or_else(|| default_expiry(now)),
            choices,
        })
    }
}

/// Creates an unapproved poll owned by `user` together with its choices.
///
/// Validation runs before anything is written, and the poll and choice
/// inserts share one transaction, so a failure never leaves a poll behind.
pub async fn propose_poll(
    pool: &PgPool,
    media: &MediaStore,
    user: &User,
    proposal: Proposal,
    now: DateTime<Utc>,
) -> Result<(Poll, Vec<Choice>), ProposalError> {
    let valid = proposal.validate(now).map_err(ProposalError::Invalid)?;

    let image = match &proposal.image {
        Some(upload) => Some(media.save(POLL_IMAGE_DIR, upload).await?),
        None => None,
    };

    match insert_poll(pool, user, &valid, image.as_deref(), now).await {
        Ok(created) => {
            info!(
                poll_id = created.0.id,
                user_id = user.id,
                choices = created.1.len(),
                "poll proposed"
            );
            Ok(created)
        }
        Err(e) => {
            if let Some(path) = &image {
                media.discard(path).await;
            }
            Err(e.into())
        }
    }
}

async fn insert_poll(
    pool: &PgPool,
    user: &User,
    valid: &ValidProposal,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(Poll, Vec<Choice>), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let poll = sqlx::query_as::<_, Poll>(
        r#"
        INSERT INTO polls (question_text, created_at, expire_at, image, created_by, is_approved)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        RETURNING id, question_text, created_at, expire_at, image, created_by, is_approved
        "#,
    )
    .bind(&valid.question_text)
    .bind(now)
    .bind(valid.expire_at)
    .bind(image)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    let mut choices = Vec::with_capacity(valid.choices.len());
    for text in &valid.choices {
        let choice = sqlx::query_as::<_, Choice>(
            "INSERT INTO choices (poll_id, choice_text) VALUES ($1, $2) RETURNING id, poll_id, choice_text",
        )
        .bind(poll.id)
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;
        choices.push(choice);
    }

    tx.commit().await?;
    Ok((poll, choices))
}

/// The user's own proposals, newest first, approved or not.
pub async fn proposed_by(pool: &PgPool, user_id: i64) -> Result<Vec<Poll>, sqlx::Error> {
    sqlx::query_as::<_, Poll>(
        r#"
        SELECT id, question_text, created_at, expire_at, image, created_by, is_approved
        FROM polls
        WHERE created_by = $1
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

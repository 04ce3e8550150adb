//! Registration, login and profiles.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    error::ValidationErrors,
    media::{avatar_dir, check_image, MediaError, MediaStore, Upload},
    models::{Profile, User},
};

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_FULL_NAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

const USER_COLUMNS: &str = "id, username, email, password_hash, is_staff, date_joined";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid form")]
    Invalid(ValidationErrors),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::Hash(e.to_string()))
}

/// False for both a wrong password and an unparseable stored hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("stored password hash is malformed: {e}");
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
    pub photo: Option<Upload>,
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

impl Registration {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let username = self.username.trim();

        if username.is_empty() {
            errors.add("username", "This field is required.");
        } else if username.chars().count() > MAX_USERNAME_LEN {
            errors.add(
                "username",
                format!("Ensure this value has at most {MAX_USERNAME_LEN} characters."),
            );
        } else if !valid_username(username) {
            errors.add(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        if !valid_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password1",
                format!("This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."),
            );
        } else if self.password1.chars().all(|c| c.is_ascii_digit()) {
            errors.add("password1", "This password is entirely numeric.");
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }
        check_image(&mut errors, "photo", self.photo.as_ref());

        errors.into_result()
    }
}

/// Creates the account and its profile (with the optional avatar) atomically.
///
/// The user id is drawn from the sequence up front so the avatar can be
/// written before the transaction opens.
pub async fn register(
    pool: &PgPool,
    media: &MediaStore,
    registration: Registration,
) -> Result<User, AccountError> {
    registration.validate().map_err(AccountError::Invalid)?;
    let password_hash = hash_password(&registration.password1)?;

    let user_id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('users', 'id'))")
        .fetch_one(pool)
        .await?;

    let photo = match &registration.photo {
        Some(upload) => Some(media.save(&avatar_dir(user_id), upload).await?),
        None => None,
    };

    let created = insert_account(pool, user_id, &registration, &password_hash, photo.as_deref()).await;
    if !matches!(created, Ok(Some(_))) {
        if let Some(path) = &photo {
            media.discard(path).await;
        }
    }

    let Some(user) = created? else {
        return Err(AccountError::Invalid(ValidationErrors::single(
            "username",
            "A user with that username already exists.",
        )));
    };

    info!(user_id = user.id, username = %user.username, "registered user");
    Ok(user)
}

/// `None` when the username is taken.
async fn insert_account(
    pool: &PgPool,
    user_id: i64,
    registration: &Registration,
    password_hash: &str,
    photo: Option<&str>,
) -> Result<Option<User>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, username, email, password_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (username) DO NOTHING
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(registration.username.trim())
    .bind(registration.email.trim())
    .bind(password_hash)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user) = inserted else {
        return Ok(None);
    };

    sqlx::query("INSERT INTO profiles (user_id, photo) VALUES ($1, $2)")
        .bind(user.id)
        .bind(photo)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(user))
}

pub async fn find_user(pool: &PgPool, user_id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Checks a username/password pair. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> Result<User, AccountError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username.trim())
    .fetch_optional(pool)
    .await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(AccountError::InvalidCredentials),
    }
}

/// Returns the user's profile, creating an empty one on first access.
pub async fn get_or_create_profile(pool: &PgPool, user_id: i64) -> Result<Profile, sqlx::Error> {
    sqlx::query("INSERT INTO profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query_as::<_, Profile>(
        "SELECT user_id, full_name, photo, bio FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub bio: String,
    pub photo: Option<Upload>,
    /// Drop the current photo without uploading a new one.
    pub clear_photo: bool,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.full_name.trim().chars().count() > MAX_FULL_NAME_LEN {
            errors.add(
                "full_name",
                format!("Ensure this value has at most {MAX_FULL_NAME_LEN} characters."),
            );
        }
        if self.clear_photo && self.photo.is_some() {
            errors.add(
                "photo",
                "Please either submit a file or check the clear checkbox, not both.",
            );
        } else {
            check_image(&mut errors, "photo", self.photo.as_ref());
        }
        errors.into_result()
    }
}

/// Saves name and bio. A new photo replaces the old one, `clear_photo`
/// removes it; either way the old file is deleted.
pub async fn update_profile(
    pool: &PgPool,
    media: &MediaStore,
    user_id: i64,
    update: ProfileUpdate,
) -> Result<Profile, AccountError> {
    update.validate().map_err(AccountError::Invalid)?;
    let current = get_or_create_profile(pool, user_id).await?;

    let new_photo = match &update.photo {
        Some(upload) => Some(media.save(&avatar_dir(user_id), upload).await?),
        None => None,
    };

    let saved = sqlx::query_as::<_, Profile>(
        r#"
        UPDATE profiles
        SET full_name = $2,
            bio = $3,
            photo = CASE WHEN $5 THEN NULL ELSE COALESCE($4, photo) END
        WHERE user_id = $1
        RETURNING user_id, full_name, photo, bio
        "#,
    )
    .bind(user_id)
    .bind(update.full_name.trim())
    .bind(update.bio.trim())
    .bind(new_photo.as_deref())
    .bind(update.clear_photo)
    .fetch_one(pool)
    .await;

    let profile = match saved {
        Ok(profile) => profile,
        Err(e) => {
            if let Some(path) = &new_photo {
                media.discard(path).await;
            }
            return Err(e.into());
        }
    };

    if let Some(old) = &current.photo {
        if profile.photo.as_deref() != Some(old.as_str()) {
            media.discard(old).await;
        }
    }

    info!(user_id, "profile updated");
    Ok(profile)
}

/// Deletes the account. Votes cascade, proposed polls keep existing with no
/// owner, and the avatar file is removed once the rows are gone.
pub async fn delete_account(
    pool: &PgPool,
    media: &MediaStore,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Locks the profile row, so a concurrent edit can't swap the photo underneath.
    let photo = sqlx::query_scalar::<_, Option<String>>(
        "DELETE FROM profiles WHERE user_id = $1 RETURNING photo",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .flatten();

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        > 0;

    tx.commit().await?;

    if deleted {
        if let Some(path) = photo {
            media.discard(&path).await;
        }
        info!(user_id, "account deleted");
    }

    Ok(deleted)
}

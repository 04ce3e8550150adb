use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    accounts,
    error::AppError,
    models::User,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Signs and checks the HS256 session tokens kept in the `session` cookie.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now() + self.ttl).timestamp().max(0) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }

    /// The user id carried by a valid token.
    pub fn user_id(&self, token: &str) -> Option<i64> {
        match self.verify(token) {
            Ok(claims) => claims.sub.parse().ok(),
            Err(e) => {
                debug!("ignoring invalid session token: {e}");
                None
            }
        }
    }

    /// Adds a fresh session cookie for `user_id` to the jar.
    pub fn login(&self, jar: CookieJar, user_id: i64) -> Result<CookieJar, AppError> {
        let token = self
            .issue(user_id)
            .map_err(|e| AppError::Internal(format!("failed to sign session: {e}")))?;

        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();

        Ok(jar.add(cookie))
    }
}

pub fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// The logged-in user, if the session cookie is valid and the account still exists.
pub struct MaybeUser(pub Option<User>);

/// Like [`MaybeUser`] but rejects anonymous requests with a login redirect.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok(MaybeUser(None));
        };

        let Some(user_id) = state.sessions.user_id(&token) else {
            return Ok(MaybeUser(None));
        };

        let user = accounts::find_user(&state.pool, user_id).await?;
        Ok(MaybeUser(user))
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(CurrentUser(user)),
            MaybeUser(None) => Err(AppError::LoginRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let keys = SessionKeys::new("test-secret", 1);
        let token = keys.issue(42).unwrap();
        assert_eq!(keys.verify(&token).unwrap().sub, "42");
        assert_eq!(keys.user_id(&token), Some(42));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let ours = SessionKeys::new("test-secret", 1);
        let theirs = SessionKeys::new("other-secret", 1);
        let token = theirs.issue(42).unwrap();
        assert!(ours.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = SessionKeys::new("test-secret", -2);
        let token = keys.issue(42).unwrap();
        assert!(keys.verify(&token).is_err());
        assert_eq!(keys.user_id(&token), None);
    }

    #[test]
    fn login_sets_http_only_cookie() {
        let keys = SessionKeys::new("test-secret", 1);
        let jar = keys.login(CookieJar::new(), 9).unwrap();
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(keys.user_id(cookie.value()), Some(9));
        assert!(logout(jar).get(SESSION_COOKIE).is_none());
    }
}

// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: i64,
    pub question_text: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub image: Option<String>,
    pub created_by: Option<i64>,
    pub is_approved: bool,
}

impl Poll {
    /// Open for voting: `created_at <= now < expire_at`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.created_at <= now && now < self.expire_at
    }

    pub fn is_public(&self, now: DateTime<Utc>) -> bool {
        self.is_approved && self.is_active(now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i64,
    pub poll_id: i64,
    pub choice_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub choice_id: i64,
    pub poll_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.is_staff
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: i64,
    pub full_name: String,
    pub photo: Option<String>,
    pub bio: String,
}

impl Profile {
    pub fn display_name<'a>(&'a self, username: &'a str) -> &'a str {
        if self.full_name.trim().is_empty() {
            username
        } else {
            &self.full_name
        }
    }
}

/// One row of a poll's results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceResult {
    pub choice: Choice,
    pub votes: i64,
    pub percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub choice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn poll(approved: bool) -> Poll {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Poll {
            id: 1,
            question_text: "Tabs or spaces?".into(),
            created_at,
            expire_at: created_at + Duration::days(7),
            image: None,
            created_by: None,
            is_approved: approved,
        }
    }

    #[test]
    fn active_window_is_half_open() {
        let p = poll(true);
        assert!(p.is_active(p.created_at));
        assert!(p.is_active(p.expire_at - Duration::seconds(1)));
        assert!(!p.is_active(p.expire_at));
        assert!(!p.is_active(p.created_at - Duration::seconds(1)));
    }

    #[test]
    fn unapproved_poll_is_never_public() {
        let p = poll(false);
        assert!(p.is_active(p.created_at + Duration::days(1)));
        assert!(!p.is_public(p.created_at + Duration::days(1)));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut profile = Profile {
            user_id: 3,
            full_name: String::new(),
            photo: None,
            bio: String::new(),
        };
        assert_eq!(profile.display_name("alice"), "alice");

        profile.full_name = "Alice Liddell".into();
        assert_eq!(profile.display_name("alice"), "Alice Liddell");
    }
}

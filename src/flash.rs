//! One-shot notices carried to the next page view in the `flash` cookie.
//!
//! The cookie holds dot-separated message codes, so nothing user-supplied
//! ever lands in it.
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Serialize;

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    VoteRecorded,
    AlreadyVoted,
    VotingClosed,
    ChooseOption,
    ProposalSubmitted,
    Registered,
    LoggedIn,
    LoggedOut,
    ProfileUpdated,
    AccountDeleted,
}

const ALL: [Flash; 10] = [
    Flash::VoteRecorded,
    Flash::AlreadyVoted,
    Flash::VotingClosed,
    Flash::ChooseOption,
    Flash::ProposalSubmitted,
    Flash::Registered,
    Flash::LoggedIn,
    Flash::LoggedOut,
    Flash::ProfileUpdated,
    Flash::AccountDeleted,
];

impl Flash {
    pub fn code(self) -> &'static str {
        match self {
            Flash::VoteRecorded => "vote_recorded",
            Flash::AlreadyVoted => "already_voted",
            Flash::VotingClosed => "voting_closed",
            Flash::ChooseOption => "choose_option",
            Flash::ProposalSubmitted => "proposal_submitted",
            Flash::Registered => "registered",
            Flash::LoggedIn => "logged_in",
            Flash::LoggedOut => "logged_out",
            Flash::ProfileUpdated => "profile_updated",
            Flash::AccountDeleted => "account_deleted",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        ALL.into_iter().find(|flash| flash.code() == code)
    }

    pub fn level(self) -> Level {
        match self {
            Flash::VotingClosed | Flash::ChooseOption => Level::Error,
            Flash::AlreadyVoted | Flash::LoggedOut | Flash::AccountDeleted => Level::Info,
            _ => Level::Success,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Flash::VoteRecorded => "Thanks, your vote has been counted.",
            Flash::AlreadyVoted => "You have already voted in this poll.",
            Flash::VotingClosed => "Voting is closed.",
            Flash::ChooseOption => "Please choose an option.",
            Flash::ProposalSubmitted => {
                "Your poll was submitted for review. It will appear on the main page once approved."
            }
            Flash::Registered => "Registration successful!",
            Flash::LoggedIn => "Welcome back!",
            Flash::LoggedOut => "You have been logged out.",
            Flash::ProfileUpdated => "Profile updated.",
            Flash::AccountDeleted => "Your account has been deleted.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub level: Level,
    pub code: &'static str,
    pub text: &'static str,
}

impl From<Flash> for FlashMessage {
    fn from(flash: Flash) -> Self {
        Self {
            level: flash.level(),
            code: flash.code(),
            text: flash.text(),
        }
    }
}

/// Queues `flash` behind any messages not yet shown.
pub fn push(jar: CookieJar, flash: Flash) -> CookieJar {
    let value = match jar.get(FLASH_COOKIE) {
        Some(existing) if !existing.value().is_empty() => {
            format!("{}.{}", existing.value(), flash.code())
        }
        _ => flash.code().to_string(),
    };

    jar.add(Cookie::build((FLASH_COOKIE, value)).path("/").http_only(true))
}

/// Reads and clears pending messages. Unknown codes are dropped.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<FlashMessage>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, Vec::new());
    };

    let messages = cookie
        .value()
        .split('.')
        .filter_map(Flash::from_code)
        .map(FlashMessage::from)
        .collect();

    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), messages)
}

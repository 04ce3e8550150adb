// handlers/polls.rs
use axum::{
    extract::{Multipart, Path, State},
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::FormData;
use crate::{
    error::{AppError, AppResult},
    flash::{self, Flash, FlashMessage},
    models::{Choice, ChoiceResult, Poll, User, VoteForm},
    poll::{self, VoteError},
    proposal::{self, Proposal, MAX_TEXT_LEN, MIN_CHOICES},
    session::{CurrentUser, MaybeUser},
    state::AppState,
};

pub fn detail_url(poll_id: i64) -> String {
    format!("/question/{poll_id}/")
}

#[derive(Debug, Serialize)]
pub struct PollList {
    pub questions: Vec<Poll>,
    pub messages: Vec<FlashMessage>,
}

#[derive(Debug, Serialize)]
pub struct PollDetail {
    pub question: Poll,
    pub is_active: bool,
    pub user_voted: bool,
    pub user_choice: Option<Choice>,
    pub results: Vec<ChoiceResult>,
    pub total_votes: i64,
    pub messages: Vec<FlashMessage>,
}

/// Visible polls, newest first.
pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<PollList>)> {
    let questions = poll::list_visible(&state.pool, user.as_ref(), Utc::now()).await?;
    let (jar, messages) = flash::take(jar);

    Ok((jar, Json(PollList { questions, messages })))
}

/// Poll detail with results, plus the viewer's own vote if any.
pub async fn detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(poll_id): Path<i64>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<PollDetail>)> {
    let now = Utc::now();
    let question = poll::get_poll(&state.pool, poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))?;

    if !poll::is_visible_to(&question, user.as_ref(), now) {
        return Err(AppError::Forbidden(
            "This poll is not published.".to_string(),
        ));
    }

    let results = poll::results(&state.pool, poll_id).await?;
    let vote = match &user {
        Some(user) => poll::user_vote(&state.pool, user.id, poll_id).await?,
        None => None,
    };

    let user_choice = vote.and_then(|vote| {
        results
            .iter()
            .find(|r| r.choice.id == vote.choice_id)
            .map(|r| r.choice.clone())
    });
    let total_votes = results.iter().map(|r| r.votes).sum();
    let (jar, messages) = flash::take(jar);

    Ok((
        jar,
        Json(PollDetail {
            is_active: question.is_active(now),
            user_voted: user_choice.is_some(),
            question,
            user_choice,
            results,
            total_votes,
            messages,
        }),
    ))
}

/// Turns a vote outcome into the notice shown on the detail page.
fn vote_flash<T>(outcome: Result<T, VoteError>) -> AppResult<Flash> {
    match outcome {
        Ok(_) => Ok(Flash::VoteRecorded),
        Err(VoteError::AlreadyVoted) => Ok(Flash::AlreadyVoted),
        Err(VoteError::VotingClosed) => Ok(Flash::VotingClosed),
        Err(VoteError::PollNotFound(_)) => Err(AppError::NotFound("Poll not found".to_string())),
        Err(VoteError::ChoiceNotFound { .. }) => {
            Err(AppError::NotFound("Choice not found".to_string()))
        }
        Err(VoteError::Database(e)) => Err(e.into()),
    }
}

/// With no choice submitted the user still hears about a closed poll or an
/// earlier vote before being asked to pick something.
async fn missing_choice(
    state: &AppState,
    user: &User,
    poll_id: i64,
    now: DateTime<Utc>,
) -> AppResult<Flash> {
    let question = poll::get_poll(&state.pool, poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))?;

    let mut conn = state.pool.acquire().await?;
    match vote_flash(poll::ensure_can_vote(&mut conn, &question, user, now).await)? {
        Flash::VoteRecorded => Ok(Flash::ChooseOption),
        blocked => Ok(blocked),
    }
}

/// `POST /question/{id}/vote/`. Always redirects back to the poll; the
/// outcome travels as a flash message.
pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(poll_id): Path<i64>,
    jar: CookieJar,
    Form(form): Form<VoteForm>,
) -> AppResult<(CookieJar, Redirect)> {
    let now = Utc::now();
    let submitted = form
        .choice
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty());

    let notice = match submitted {
        None => missing_choice(&state, &user, poll_id, now).await?,
        Some(raw) => {
            let choice_id = raw
                .parse::<i64>()
                .map_err(|_| AppError::NotFound("Choice not found".to_string()))?;
            vote_flash(poll::cast_vote(&state.pool, &user, poll_id, choice_id, now).await)?
        }
    };

    debug!(user_id = user.id, poll_id, outcome = notice.code(), "vote submitted");
    Ok((flash::push(jar, notice), Redirect::to(&detail_url(poll_id))))
}

/// Describes the proposal form.
pub async fn propose_form(CurrentUser(_user): CurrentUser) -> Json<Value> {
    let now = Utc::now();
    Json(json!({
        "fields": {
            "question_text": { "required": true, "max_length": MAX_TEXT_LEN },
            "expire_at": { "required": false, "default": proposal::default_expiry(now) },
            "image": { "required": false, "type": "file" },
            "choice": { "repeated": true, "min_count": MIN_CHOICES, "max_length": MAX_TEXT_LEN },
        }
    }))
}

pub async fn propose(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    multipart: Multipart,
) -> AppResult<(CookieJar, Redirect)> {
    let mut form = FormData::read(multipart).await?;
    let submission = Proposal {
        question_text: form.text("question_text"),
        expire_at: form.opt_text("expire_at"),
        choices: form.all("choice"),
        image: form.take_file("image"),
    };

    proposal::propose_poll(&state.pool, &state.media, &user, submission, Utc::now()).await?;

    Ok((
        flash::push(jar, Flash::ProposalSubmitted),
        Redirect::to("/proposed/"),
    ))
}

/// The current user's proposals.
pub async fn proposed_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<PollList>)> {
    let questions = proposal::proposed_by(&state.pool, user.id).await?;
    let (jar, messages) = flash::take(jar);

    Ok((jar, Json(PollList { questions, messages })))
}

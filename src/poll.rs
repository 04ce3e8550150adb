// src/poll.rs
//! Voting, results and the visibility rules for polls.
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Choice, ChoiceResult, Poll, User, Vote};

const POLL_COLUMNS: &str =
    "id, question_text, created_at, expire_at, image, created_by, is_approved";

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("voting is closed")]
    VotingClosed,

    #[error("already voted in this poll")]
    AlreadyVoted,

    #[error("poll {0} not found")]
    PollNotFound(i64),

    #[error("choice {choice_id} is not part of poll {poll_id}")]
    ChoiceNotFound { poll_id: i64, choice_id: i64 },

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for VoteError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());

        if unique_violation {
            VoteError::AlreadyVoted
        } else {
            VoteError::Database(err)
        }
    }
}

/// Moderators see everything; everyone else only public polls.
pub fn is_visible_to(poll: &Poll, viewer: Option<&User>, now: DateTime<Utc>) -> bool {
    poll.is_public(now) || viewer.is_some_and(User::is_moderator)
}

/// The time-window and approval checks, in that order.
pub fn check_open(poll: &Poll, user: &User, now: DateTime<Utc>) -> Result<(), VoteError> {
    if !poll.is_active(now) {
        return Err(VoteError::VotingClosed);
    }
    if !poll.is_approved && !user.is_moderator() {
        return Err(VoteError::VotingClosed);
    }
    Ok(())
}

/// Polls inside their time window, newest first. Unapproved ones are
/// included only for moderators.
pub async fn list_visible(
    pool: &PgPool,
    viewer: Option<&User>,
    now: DateTime<Utc>,
) -> Result<Vec<Poll>, sqlx::Error> {
    let include_unapproved = viewer.is_some_and(User::is_moderator);

    sqlx::query_as::<_, Poll>(&format!(
        r#"
        SELECT {POLL_COLUMNS}
        FROM polls
        WHERE (is_approved OR $2)
          AND created_at <= $1
          AND expire_at > $1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(now)
    .bind(include_unapproved)
    .fetch_all(pool)
    .await
}

pub async fn get_poll(pool: &PgPool, poll_id: i64) -> Result<Option<Poll>, sqlx::Error> {
    sqlx::query_as::<_, Poll>(&format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1"))
        .bind(poll_id)
        .fetch_optional(pool)
        .await
}

/// Choices in creation order.
pub async fn choices(pool: &PgPool, poll_id: i64) -> Result<Vec<Choice>, sqlx::Error> {
    sqlx::query_as::<_, Choice>(
        "SELECT id, poll_id, choice_text FROM choices WHERE poll_id = $1 ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}

pub async fn user_vote(
    pool: &PgPool,
    user_id: i64,
    poll_id: i64,
) -> Result<Option<Vote>, sqlx::Error> {
    sqlx::query_as::<_, Vote>(
        r#"
        SELECT id, user_id, choice_id, poll_id, created_at
        FROM votes
        WHERE user_id = $1 AND poll_id = $2
        "#,
    )
    .bind(user_id)
    .bind(poll_id)
    .fetch_optional(pool)
    .await
}

/// Runs every precondition of [`cast_vote`] except choice membership.
pub async fn ensure_can_vote(
    conn: &mut PgConnection,
    poll: &Poll,
    user: &User,
    now: DateTime<Utc>,
) -> Result<(), VoteError> {
    check_open(poll, user, now)?;

    let voted: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM votes WHERE user_id = $1 AND poll_id = $2)")
            .bind(user.id)
            .bind(poll.id)
            .fetch_one(&mut *conn)
            .await?;

    if voted {
        return Err(VoteError::AlreadyVoted);
    }
    Ok(())
}

/// Records `user`'s vote for `choice_id` in `poll_id`.
///
/// The insert relies on the `(user_id, poll_id)` unique constraint, so two
/// concurrent submissions from the same user cannot both land; the loser
/// gets [`VoteError::AlreadyVoted`].
pub async fn cast_vote(
    pool: &PgPool,
    user: &User,
    poll_id: i64,
    choice_id: i64,
    now: DateTime<Utc>,
) -> Result<Vote, VoteError> {
    let mut tx = pool.begin().await?;

    let poll = sqlx::query_as::<_, Poll>(&format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1"))
        .bind(poll_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(VoteError::PollNotFound(poll_id))?;

    ensure_can_vote(&mut tx, &poll, user, now).await?;

    let vote = sqlx::query_as::<_, Vote>(
        r#"
        INSERT INTO votes (user_id, choice_id, poll_id, created_at)
        SELECT $1, c.id, c.poll_id, $4
        FROM choices c
        WHERE c.id = $2 AND c.poll_id = $3
        ON CONFLICT (user_id, poll_id) DO NOTHING
        RETURNING id, user_id, choice_id, poll_id, created_at
        "#,
    )
    .bind(user.id)
    .bind(choice_id)
    .bind(poll_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(vote) = vote else {
        // Nothing inserted: either the choice is foreign or a concurrent vote won.
        let belongs: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM choices WHERE id = $1 AND poll_id = $2)")
                .bind(choice_id)
                .bind(poll_id)
                .fetch_one(&mut *tx)
                .await?;
        tx.rollback().await?;

        return Err(if belongs {
            VoteError::AlreadyVoted
        } else {
            VoteError::ChoiceNotFound { poll_id, choice_id }
        });
    };

    tx.commit().await?;

    info!(user_id = user.id, poll_id, choice_id, "vote recorded");
    Ok(vote)
}

/// Rounds to two decimals, ties to even; zero when nobody has voted.
pub fn percent(votes: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (votes as f64 / total as f64 * 100.0 * 100.0).round_ties_even() / 100.0
}

pub fn tally(counts: Vec<(Choice, i64)>) -> Vec<ChoiceResult> {
    let total: i64 = counts.iter().map(|(_, votes)| votes).sum();

    counts
        .into_iter()
        .map(|(choice, votes)| ChoiceResult {
            choice,
            votes,
            percent: percent(votes, total),
        })
        .collect()
}

/// Per-choice vote counts and percentages, in choice creation order.
pub async fn results(pool: &PgPool, poll_id: i64) -> Result<Vec<ChoiceResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, i64, String, i64)>(
        r#"
        SELECT c.id, c.poll_id, c.choice_text, COUNT(v.id) AS votes
        FROM choices c
        LEFT JOIN votes v ON v.choice_id = c.id
        WHERE c.poll_id = $1
        GROUP BY c.id, c.poll_id, c.choice_text
        ORDER BY c.id
        "#,
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    debug!(poll_id, choices = rows.len(), "tallied results");

    Ok(tally(
        rows.into_iter()
            .map(|(id, poll_id, choice_text, votes)| {
                (
                    Choice {
                        id,
                        poll_id,
                        choice_text,
                    },
                    votes,
                )
            })
            .collect(),
    ))
}

/// Bulk approve/unapprove, as the moderation actions do. Returns rows changed.
pub async fn set_approved(
    pool: &PgPool,
    poll_ids: &[i64],
    approved: bool,
) -> Result<u64, sqlx::Error> {
    let updated = sqlx::query("UPDATE polls SET is_approved = $1 WHERE id = ANY($2)")
        .bind(approved)
        .bind(poll_ids)
        .execute(pool)
        .await?
        .rows_affected();

    info!(updated, approved, "changed poll approval");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn poll(approved: bool) -> Poll {
        Poll {
            id: 10,
            question_text: "Best editor?".into(),
            created_at: t0(),
            expire_at: t0() + Duration::days(7),
            image: None,
            created_by: Some(1),
            is_approved: approved,
        }
    }

    fn user(is_staff: bool) -> User {
        User {
            id: 2,
            username: if is_staff { "mod".into() } else { "bob".into() },
            email: "bob@example.com".into(),
            password_hash: String::new(),
            is_staff,
            date_joined: t0(),
        }
    }

    fn choice(id: i64) -> Choice {
        Choice {
            id,
            poll_id: 10,
            choice_text: format!("choice {id}"),
        }
    }

    #[rstest]
    #[case(true, false, 1, true)]
    #[case(true, false, 8, false)]
    #[case(false, false, 1, false)]
    #[case(false, true, 1, true)]
    #[case(true, true, 8, false)]
    #[case(true, false, -1, false)]
    fn voting_window(
        #[case] approved: bool,
        #[case] staff: bool,
        #[case] day: i64,
        #[case] open: bool,
    ) {
        let result = check_open(&poll(approved), &user(staff), t0() + Duration::days(day));
        assert_eq!(result.is_ok(), open);
        if !open {
            assert!(matches!(result, Err(VoteError::VotingClosed)));
        }
    }

    #[rstest]
    #[case(true, None, 1, true)]
    #[case(false, None, 1, false)]
    #[case(false, Some(false), 1, false)]
    #[case(false, Some(true), 1, true)]
    #[case(true, Some(false), 9, false)]
    #[case(true, Some(true), 9, true)]
    fn visibility(
        #[case] approved: bool,
        #[case] viewer_staff: Option<bool>,
        #[case] day: i64,
        #[case] visible: bool,
    ) {
        let viewer = viewer_staff.map(user);
        assert_eq!(
            is_visible_to(&poll(approved), viewer.as_ref(), t0() + Duration::days(day)),
            visible
        );
    }

    #[test]
    fn tally_without_votes_is_all_zero() {
        let results = tally(vec![(choice(1), 0), (choice(2), 0)]);
        assert!(results.iter().all(|r| r.votes == 0 && r.percent == 0.0));
    }

    #[test]
    fn tally_keeps_order_and_rounds() {
        let results = tally(vec![(choice(3), 1), (choice(1), 1), (choice(2), 1)]);
        let ids: Vec<_> = results.iter().map(|r| r.choice.id).collect();
        assert_eq!(ids, [3, 1, 2]);
        assert!(results.iter().all(|r| r.percent == 33.33));
    }

    #[rstest]
    #[case(&[1, 1, 1])]
    #[case(&[2, 1])]
    #[case(&[7, 0, 3, 5])]
    #[case(&[1, 2, 3, 4, 5, 6])]
    fn percentages_sum_to_hundred(#[case] votes: &[i64]) {
        let counts = votes
            .iter()
            .enumerate()
            .map(|(i, v)| (choice(i as i64), *v))
            .collect();
        let sum: f64 = tally(counts).iter().map(|r| r.percent).sum();
        assert!((sum - 100.0).abs() <= 0.01 * votes.len() as f64, "sum was {sum}");
    }

    #[rstest]
    #[case(2, 3, 66.67)]
    #[case(1, 3, 33.33)]
    #[case(1, 8, 12.5)]
    #[case(1, 32, 3.12)]
    #[case(5, 32, 15.62)]
    #[case(3, 32, 9.38)]
    #[case(0, 0, 0.0)]
    fn percent_rounds_half_to_even(#[case] votes: i64, #[case] total: i64, #[case] expected: f64) {
        assert_eq!(percent(votes, total), expected);
    }
}

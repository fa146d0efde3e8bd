use super::users::User;
use super::Db;
use crate::error::err;
use crate::prelude::*;
use crate::{Result, UserError};
use chrono::prelude::*;

pub(crate) const FEEDBACK_MAX_LEN: usize = 2000;

/// Triage state of a feedback entry. Unlike confessions, feedback may move
/// between states freely, admins use it as a lightweight kanban.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum FeedbackStatus {
    Pending,
    Reviewed,
    Resolved,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Feedback {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) text: String,
    pub(crate) status: FeedbackStatus,
    #[allow(dead_code)]
    pub(crate) reviewed_by: Option<i64>,
    #[allow(dead_code)]
    pub(crate) reviewed_at: Option<DateTime<Utc>>,
    pub(crate) admin_notes: String,
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
}

const SELECT_FEEDBACK: &str = "SELECT id, user_id, text, status, reviewed_by, reviewed_at, \
    admin_notes, created_at \
    FROM feedback";

#[derive(Clone)]
pub(crate) struct FeedbackRepo {
    db: Db,
}

impl FeedbackRepo {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(skip(self, author, text), fields(author = author.tg_id))]
    pub(crate) async fn submit(&self, author: &User, text: &str) -> Result<Feedback> {
        let actual_len = text.chars().count();
        if actual_len > FEEDBACK_MAX_LEN {
            return Err(err!(UserError::FeedbackTooLong {
                actual_len,
                max_len: FEEDBACK_MAX_LEN,
            }));
        }

        let feedback_id = sqlx::query(
            "INSERT INTO feedback (user_id, text, created_at) VALUES ($1, $2, $3)",
        )
        .bind(author.id)
        .bind(text)
        .bind(Utc::now())
        .execute(self.db.write())
        .await?
        .last_insert_rowid();

        self.get(feedback_id).await
    }

    pub(crate) async fn get(&self, feedback_id: i64) -> Result<Feedback> {
        sqlx::query_as::<_, Feedback>(&format!("{SELECT_FEEDBACK} WHERE id = $1"))
            .bind(feedback_id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or_else(|| err!(UserError::FeedbackNotFound { feedback_id }))
    }

    /// Oldest-first triage queue of entries still waiting for an admin.
    pub(crate) async fn list_pending(&self) -> Result<Vec<Feedback>> {
        sqlx::query_as::<_, Feedback>(&format!(
            "{SELECT_FEEDBACK} WHERE status = 'pending' ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.db.read())
        .await
        .map_err(Into::into)
    }

    /// Moves an entry to the given status and stamps the reviewer. Passing
    /// `notes` appends to the running admin notes, `None` leaves them as-is.
    #[instrument(skip(self, admin, notes), fields(admin = admin.tg_id))]
    pub(crate) async fn set_status(
        &self,
        feedback_id: i64,
        status: FeedbackStatus,
        admin: &User,
        notes: Option<&str>,
    ) -> Result<Feedback> {
        let appended_notes = notes.map(|notes| format!("[{}] {notes}\n", admin.full_name));

        let affected = sqlx::query(
            "UPDATE feedback
            SET status = $1,
                reviewed_by = $2,
                reviewed_at = $3,
                admin_notes = admin_notes || $4
            WHERE id = $5",
        )
        .bind(status)
        .bind(admin.id)
        .bind(Utc::now())
        .bind(appended_notes.as_deref().unwrap_or(""))
        .bind(feedback_id)
        .execute(self.db.write())
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(err!(UserError::FeedbackNotFound { feedback_id }));
        }

        self.get(feedback_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_repo;
    use crate::ErrorKind;
    use assert_matches::assert_matches;

    #[test_log::test(tokio::test)]
    async fn submission_starts_pending() {
        let repo = test_repo().await;
        let user = repo.users.register(1, "Ana", None).await.unwrap();

        let feedback = repo.feedback.submit(&user, "the bot is great").await.unwrap();
        assert_eq!(feedback.status, FeedbackStatus::Pending);
        assert_eq!(feedback.admin_notes, "");
        assert!(feedback.reviewed_by.is_none());

        let queue = repo.feedback.list_pending().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, feedback.id);
    }

    #[test_log::test(tokio::test)]
    async fn submission_caps_text_length() {
        let repo = test_repo().await;
        let user = repo.users.register(1, "Ana", None).await.unwrap();

        let err = repo
            .feedback
            .submit(&user, &"x".repeat(FEEDBACK_MAX_LEN + 1))
            .await
            .unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::User {
                source: UserError::FeedbackTooLong { .. }
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn triage_moves_entries_out_of_the_queue_and_back() {
        let repo = test_repo().await;
        let user = repo.users.register(1, "Ana", None).await.unwrap();
        let admin = repo.users.register(2, "Mod", None).await.unwrap();

        let feedback = repo.feedback.submit(&user, "found a bug").await.unwrap();

        let feedback = repo
            .feedback
            .set_status(feedback.id, FeedbackStatus::Reviewed, &admin, Some("repro confirmed"))
            .await
            .unwrap();
        assert_eq!(feedback.status, FeedbackStatus::Reviewed);
        assert_eq!(feedback.reviewed_by, Some(admin.id));
        assert_eq!(feedback.admin_notes, "[Mod] repro confirmed\n");
        assert!(repo.feedback.list_pending().await.unwrap().is_empty());

        // Notes accumulate across status changes
        let feedback = repo
            .feedback
            .set_status(feedback.id, FeedbackStatus::Resolved, &admin, Some("fixed"))
            .await
            .unwrap();
        assert_eq!(feedback.admin_notes, "[Mod] repro confirmed\n[Mod] fixed\n");

        // And a status change without notes keeps them intact
        let feedback = repo
            .feedback
            .set_status(feedback.id, FeedbackStatus::Pending, &admin, None)
            .await
            .unwrap();
        assert_eq!(feedback.admin_notes, "[Mod] repro confirmed\n[Mod] fixed\n");
        assert_eq!(repo.feedback.list_pending().await.unwrap().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn triage_of_missing_entry_is_not_found() {
        let repo = test_repo().await;
        let admin = repo.users.register(2, "Mod", None).await.unwrap();

        let err = repo
            .feedback
            .set_status(42, FeedbackStatus::Reviewed, &admin, None)
            .await
            .unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::User {
                source: UserError::FeedbackNotFound { feedback_id: 42 }
            }
        );
    }
}

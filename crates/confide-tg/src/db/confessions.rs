use super::users::User;
use super::Db;
use crate::error::err;
use crate::prelude::*;
use crate::{Result, UserError};
use chrono::prelude::*;

pub(crate) const CONFESSION_MAX_LEN: usize = 4096;

/// Moderation disposition of a confession. Transitions only
/// `pending -> approved` or `pending -> rejected`, each at most once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ConfessionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Confession {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) text: String,
    pub(crate) is_anonymous: bool,
    pub(crate) status: ConfessionStatus,
    pub(crate) channel_message_id: Option<i64>,
    pub(crate) reviewed_by: Option<i64>,
    #[allow(dead_code)]
    pub(crate) reviewed_at: Option<DateTime<Utc>>,
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
}

const SELECT_CONFESSION: &str = "SELECT id, user_id, text, is_anonymous, status, \
    channel_message_id, reviewed_by, reviewed_at, created_at \
    FROM confessions";

#[derive(Clone)]
pub(crate) struct ConfessionsRepo {
    db: Db,
}

impl ConfessionsRepo {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Creates a pending confession. The anonymity flag is snapshotted from
    /// the author's current preference in the same transaction, so a later
    /// `/settings` change never alters already-submitted confessions.
    #[instrument(skip(self, author, text), fields(author = author.tg_id))]
    pub(crate) async fn create(&self, author: &User, text: &str) -> Result<Confession> {
        let actual_len = text.chars().count();
        if actual_len > CONFESSION_MAX_LEN {
            return Err(err!(UserError::ConfessionTooLong {
                actual_len,
                max_len: CONFESSION_MAX_LEN,
            }));
        }

        let mut tx = self.db.begin_write().await?;

        let is_anonymous: bool =
            sqlx::query_scalar("SELECT is_anonymous_mode FROM users WHERE id = $1")
                .bind(author.id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| err!(UserError::UserNotFound { tg_id: author.tg_id }))?;

        let confession_id = sqlx::query(
            "INSERT INTO confessions (user_id, text, is_anonymous, status, created_at)
            VALUES ($1, $2, $3, 'pending', $4)",
        )
        .bind(author.id)
        .bind(text)
        .bind(is_anonymous)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let confession = sqlx::query_as::<_, Confession>(&format!(
            "{SELECT_CONFESSION} WHERE id = $1"
        ))
        .bind(confession_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(confession)
    }

    pub(crate) async fn get(&self, confession_id: i64) -> Result<Confession> {
        sqlx::query_as::<_, Confession>(&format!("{SELECT_CONFESSION} WHERE id = $1"))
            .bind(confession_id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or_else(|| err!(UserError::ConfessionNotFound { confession_id }))
    }

    /// FIFO moderation queue: all pending confessions, oldest first.
    pub(crate) async fn list_pending(&self) -> Result<Vec<Confession>> {
        sqlx::query_as::<_, Confession>(&format!(
            "{SELECT_CONFESSION} WHERE status = 'pending' ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.db.read())
        .await
        .map_err(Into::into)
    }

    /// `pending -> approved`. Also bumps the author's confession counter in
    /// the same transaction. Channel publication deliberately happens
    /// outside of this method: the moderation decision is authoritative
    /// even if the downstream publish fails.
    #[instrument(skip(self, admin), fields(admin = admin.tg_id))]
    pub(crate) async fn approve(&self, confession_id: i64, admin: &User) -> Result<Confession> {
        self.review(confession_id, admin, ConfessionStatus::Approved)
            .await
    }

    /// `pending -> rejected`. No channel interaction, no counter bump.
    #[instrument(skip(self, admin), fields(admin = admin.tg_id))]
    pub(crate) async fn reject(&self, confession_id: i64, admin: &User) -> Result<Confession> {
        self.review(confession_id, admin, ConfessionStatus::Rejected)
            .await
    }

    async fn review(
        &self,
        confession_id: i64,
        admin: &User,
        verdict: ConfessionStatus,
    ) -> Result<Confession> {
        let mut tx = self.db.begin_write().await?;

        // The status guard lives in the WHERE clause: a second reviewer
        // racing us matches zero rows instead of overwriting the verdict.
        let affected = sqlx::query(
            "UPDATE confessions
            SET status = $1, reviewed_by = $2, reviewed_at = $3
            WHERE id = $4 AND status = 'pending'",
        )
        .bind(verdict)
        .bind(admin.id)
        .bind(Utc::now())
        .bind(confession_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            let existing = sqlx::query_as::<_, Confession>(&format!(
                "{SELECT_CONFESSION} WHERE id = $1"
            ))
            .bind(confession_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| err!(UserError::ConfessionNotFound { confession_id }))?;

            let reviewed_by: Option<String> =
                sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
                    .bind(existing.reviewed_by)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(err!(UserError::AlreadyReviewed {
                confession_id,
                status: existing.status,
                reviewed_by: reviewed_by.unwrap_or_else(|| "another admin".to_owned()),
            }));
        }

        if verdict == ConfessionStatus::Approved {
            sqlx::query(
                "UPDATE users SET total_confessions = total_confessions + 1
                WHERE id = (SELECT user_id FROM confessions WHERE id = $1)",
            )
            .bind(confession_id)
            .execute(&mut *tx)
            .await?;
        }

        let confession = sqlx::query_as::<_, Confession>(&format!(
            "{SELECT_CONFESSION} WHERE id = $1"
        ))
        .bind(confession_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(confession)
    }

    /// Records the channel message reference after a successful publication.
    pub(crate) async fn set_channel_message(
        &self,
        confession_id: i64,
        channel_message_id: i64,
    ) -> Result {
        sqlx::query("UPDATE confessions SET channel_message_id = $1 WHERE id = $2")
            .bind(channel_message_id)
            .bind(confession_id)
            .execute(self.db.write())
            .await?;

        Ok(())
    }

    /// Removes a confession and, via cascade, all of its comments and their
    /// reactions. Removing the published channel message is the caller's
    /// best-effort concern.
    #[instrument(skip(self))]
    pub(crate) async fn delete(&self, confession_id: i64) -> Result {
        let affected = sqlx::query("DELETE FROM confessions WHERE id = $1")
            .bind(confession_id)
            .execute(self.db.write())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(err!(UserError::ConfessionNotFound { confession_id }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_repo;
    use crate::db::Repo;
    use crate::ErrorKind;
    use assert_matches::assert_matches;

    async fn submitted(repo: &Repo, author_tg_id: i64, text: &str) -> (User, Confession) {
        let author = repo
            .users
            .register(author_tg_id, "Author", None)
            .await
            .unwrap();
        let confession = repo.confessions.create(&author, text).await.unwrap();
        (author, confession)
    }

    #[test_log::test(tokio::test)]
    async fn create_caps_text_length_inclusively() {
        let repo = test_repo().await;
        let author = repo.users.register(1, "Ana", None).await.unwrap();

        let at_cap = "x".repeat(CONFESSION_MAX_LEN);
        let confession = repo.confessions.create(&author, &at_cap).await.unwrap();
        assert_eq!(confession.status, ConfessionStatus::Pending);

        let over_cap = "x".repeat(CONFESSION_MAX_LEN + 1);
        let err = repo.confessions.create(&author, &over_cap).await.unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::User {
                source: UserError::ConfessionTooLong { .. }
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn anonymity_is_snapshotted_at_creation() {
        let repo = test_repo().await;
        let author = repo.users.register(1, "Ana", None).await.unwrap();

        let anonymous = repo.confessions.create(&author, "first").await.unwrap();
        assert!(anonymous.is_anonymous);

        repo.users.set_anonymity(1, false).await.unwrap();
        let attributed = repo.confessions.create(&author, "second").await.unwrap();
        assert!(!attributed.is_anonymous);

        // Flipping the preference back does not rewrite history
        repo.users.set_anonymity(1, true).await.unwrap();
        assert!(!repo.confessions.get(attributed.id).await.unwrap().is_anonymous);
    }

    #[test_log::test(tokio::test)]
    async fn review_is_monotonic() {
        let repo = test_repo().await;
        let (_, confession) = submitted(&repo, 1, "hello").await;
        let admin = repo.users.register(100, "Mod", None).await.unwrap();
        let other_admin = repo.users.register(101, "Mod Two", None).await.unwrap();

        let approved = repo.confessions.approve(confession.id, &admin).await.unwrap();
        assert_eq!(approved.status, ConfessionStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(admin.id));
        assert!(approved.reviewed_at.is_some());

        // Second disposition fails and reports who already handled it
        let err = repo
            .confessions
            .reject(confession.id, &other_admin)
            .await
            .unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::User {
                source: UserError::AlreadyReviewed {
                    status: ConfessionStatus::Approved,
                    reviewed_by,
                    ..
                }
            } if reviewed_by == "Mod"
        );

        // And leaves the original review untouched
        let unchanged = repo.confessions.get(confession.id).await.unwrap();
        assert_eq!(unchanged.reviewed_by, Some(admin.id));
        assert_eq!(unchanged.reviewed_at, approved.reviewed_at);
    }

    #[test_log::test(tokio::test)]
    async fn approval_bumps_author_counter_rejection_does_not() {
        let repo = test_repo().await;
        let (author, first) = submitted(&repo, 1, "first").await;
        let second = repo.confessions.create(&author, "second").await.unwrap();
        let admin = repo.users.register(100, "Mod", None).await.unwrap();

        repo.confessions.approve(first.id, &admin).await.unwrap();
        repo.confessions.reject(second.id, &admin).await.unwrap();

        let author = repo.users.get_by_tg_id(1).await.unwrap();
        assert_eq!(author.total_confessions, 1);
    }

    #[test_log::test(tokio::test)]
    async fn pending_queue_is_oldest_first() {
        let repo = test_repo().await;
        let (author, first) = submitted(&repo, 1, "first").await;
        let second = repo.confessions.create(&author, "second").await.unwrap();
        let admin = repo.users.register(100, "Mod", None).await.unwrap();

        let third = repo.confessions.create(&author, "third").await.unwrap();
        repo.confessions.approve(second.id, &admin).await.unwrap();

        let pending: Vec<_> = repo
            .confessions
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|confession| confession.id)
            .collect();
        assert_eq!(pending, vec![first.id, third.id]);
    }

    #[test_log::test(tokio::test)]
    async fn review_of_missing_confession_is_not_found() {
        let repo = test_repo().await;
        let admin = repo.users.register(100, "Mod", None).await.unwrap();

        let err = repo.confessions.approve(9000, &admin).await.unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::User {
                source: UserError::ConfessionNotFound { confession_id: 9000 }
            }
        );
    }
}

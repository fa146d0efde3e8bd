use super::Db;
use crate::error::err;
use crate::prelude::*;
use crate::{Result, UserError};
use chrono::prelude::*;

/// A person that has talked to the bot at least once. Created lazily on
/// first contact and never deleted in normal operation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct User {
    pub(crate) id: i64,
    pub(crate) tg_id: i64,
    pub(crate) full_name: String,
    #[allow(dead_code)]
    pub(crate) username: Option<String>,
    pub(crate) is_anonymous_mode: bool,
    pub(crate) is_admin: bool,
    pub(crate) total_confessions: i64,
    pub(crate) total_comments: i64,
    pub(crate) impact_points: i64,
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct UserStats {
    pub(crate) approved_confessions: i64,
    pub(crate) total_comments: i64,
    pub(crate) impact_points: i64,
    /// Share of likes among all reactions received on the user's comments,
    /// in percent. Zero when the user received no reactions at all.
    pub(crate) acceptance_score: f64,
}

const SELECT_USER: &str = "SELECT id, tg_id, full_name, username, is_anonymous_mode, is_admin, \
    total_confessions, total_comments, impact_points, created_at \
    FROM users";

#[derive(Clone)]
pub(crate) struct UsersRepo {
    db: Db,
}

impl UsersRepo {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get-or-create keyed by the external Telegram id. Duplicate
    /// registration is a non-event: concurrent creations race on the
    /// unique index and both callers end up observing the same row.
    #[instrument(skip(self))]
    pub(crate) async fn register(
        &self,
        tg_id: i64,
        full_name: &str,
        username: Option<&str>,
    ) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (tg_id, full_name, username, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tg_id) DO NOTHING",
        )
        .bind(tg_id)
        .bind(full_name)
        .bind(username)
        .bind(Utc::now())
        .execute(self.db.write())
        .await?;

        self.get_by_tg_id(tg_id).await
    }

    /// Lookup by the internal primary key. Callers hold a foreign key to
    /// the row, so a miss is a database-level anomaly, not a user error.
    pub(crate) async fn get(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_one(self.db.read())
            .await
            .map_err(Into::into)
    }

    pub(crate) async fn get_by_tg_id(&self, tg_id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE tg_id = $1"))
            .bind(tg_id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or_else(|| err!(UserError::UserNotFound { tg_id }))
    }

    #[instrument(skip(self))]
    pub(crate) async fn set_anonymity(&self, tg_id: i64, enabled: bool) -> Result<User> {
        let affected = sqlx::query("UPDATE users SET is_anonymous_mode = $1 WHERE tg_id = $2")
            .bind(enabled)
            .bind(tg_id)
            .execute(self.db.write())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(err!(UserError::UserNotFound { tg_id }));
        }

        self.get_by_tg_id(tg_id).await
    }

    #[instrument(skip(self))]
    pub(crate) async fn set_admin(&self, tg_id: i64, enabled: bool) -> Result {
        let affected = sqlx::query("UPDATE users SET is_admin = $1 WHERE tg_id = $2")
            .bind(enabled)
            .bind(tg_id)
            .execute(self.db.write())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(err!(UserError::UserNotFound { tg_id }));
        }

        Ok(())
    }

    /// Telegram ids of all users carrying the admin flag, for notification
    /// fan-out.
    pub(crate) async fn admin_tg_ids(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT tg_id FROM users WHERE is_admin = TRUE")
            .fetch_all(self.db.read())
            .await
            .map_err(Into::into)
    }

    /// Derived statistics for the profile screen.
    ///
    /// `impact_points = approved confessions + comments + likes received`.
    /// The computed value is also written back to the cached column on the
    /// user row, like every other mutation path does for its counter.
    #[instrument(skip(self))]
    pub(crate) async fn stats(&self, tg_id: i64) -> Result<UserStats> {
        let user = self.get_by_tg_id(tg_id).await?;

        let approved_confessions: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM confessions WHERE user_id = $1 AND status = 'approved'",
        )
        .bind(user.id)
        .fetch_one(self.db.read())
        .await?;

        let total_comments: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE user_id = $1")
                .bind(user.id)
                .fetch_one(self.db.read())
                .await?;

        let likes_received: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reactions r
            JOIN comments c ON c.id = r.comment_id
            WHERE c.user_id = $1 AND r.reaction_type = 'like'",
        )
        .bind(user.id)
        .fetch_one(self.db.read())
        .await?;

        let reactions_received: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reactions r
            JOIN comments c ON c.id = r.comment_id
            WHERE c.user_id = $1",
        )
        .bind(user.id)
        .fetch_one(self.db.read())
        .await?;

        let impact_points = approved_confessions + total_comments + likes_received;

        sqlx::query("UPDATE users SET impact_points = $1 WHERE id = $2")
            .bind(impact_points)
            .bind(user.id)
            .execute(self.db.write())
            .await?;

        let acceptance_score = if reactions_received == 0 {
            0.0
        } else {
            likes_received as f64 / reactions_received as f64 * 100.0
        };

        Ok(UserStats {
            approved_confessions,
            total_comments,
            impact_points,
            acceptance_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::tests::test_repo;

    #[test_log::test(tokio::test)]
    async fn registration_is_idempotent() {
        let repo = test_repo().await;

        let first = repo.users.register(42, "Ana", Some("ana")).await.unwrap();
        let second = repo.users.register(42, "Ana", Some("ana")).await.unwrap();
        let third = repo.users.register(42, "Renamed", None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        // The original registration data wins, later attempts are no-ops
        assert_eq!(third.full_name, "Ana");

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tg_id = 42")
            .fetch_one(repo.users.db.read())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test_log::test(tokio::test)]
    async fn new_users_default_to_anonymous() {
        let repo = test_repo().await;

        let user = repo.users.register(7, "Bea", None).await.unwrap();
        assert!(user.is_anonymous_mode);
        assert!(!user.is_admin);
        assert_eq!(user.total_confessions, 0);
        assert_eq!(user.total_comments, 0);

        let user = repo.users.set_anonymity(7, false).await.unwrap();
        assert!(!user.is_anonymous_mode);
    }

    #[test_log::test(tokio::test)]
    async fn stats_of_a_fresh_user_do_not_divide_by_zero() {
        let repo = test_repo().await;

        repo.users.register(7, "Bea", None).await.unwrap();
        let stats = repo.users.stats(7).await.unwrap();

        assert_eq!(stats.approved_confessions, 0);
        assert_eq!(stats.total_comments, 0);
        assert_eq!(stats.impact_points, 0);
        assert_eq!(stats.acceptance_score, 0.0);
    }
}

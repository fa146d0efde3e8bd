use super::Db;
use crate::Result;
use chrono::prelude::*;

/// Append-only activity log used for engagement analytics. Rows reference
/// the Telegram id directly, so activity survives even if the user row is
/// ever removed.
#[derive(Clone)]
pub(crate) struct InteractionsRepo {
    db: Db,
}

impl InteractionsRepo {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &sqlx::SqlitePool {
        self.db.write()
    }

    pub(crate) async fn record(&self, tg_id: i64, kind: &str, at: DateTime<Utc>) -> Result {
        sqlx::query("INSERT INTO user_interactions (tg_id, kind, created_at) VALUES ($1, $2, $3)")
            .bind(tg_id)
            .bind(kind)
            .bind(at)
            .execute(self.db.write())
            .await?;
        Ok(())
    }

    /// Distinct users with at least one interaction in the 30 days before
    /// `now`, each user counted once regardless of activity volume.
    pub(crate) async fn monthly_active_users(&self, now: DateTime<Utc>) -> Result<i64> {
        let since = now - chrono::Duration::days(30);

        sqlx::query_scalar(
            "SELECT COUNT(DISTINCT tg_id) FROM user_interactions WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_one(self.db.read())
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_repo;

    #[test_log::test(tokio::test)]
    async fn mau_deduplicates_users_and_honors_the_window() {
        let repo = test_repo().await;
        let now = Utc::now();

        // Three interactions, two distinct users, all within the window
        repo.interactions.record(1, "command", now).await.unwrap();
        repo.interactions
            .record(1, "callback", now - chrono::Duration::days(3))
            .await
            .unwrap();
        repo.interactions
            .record(2, "message", now - chrono::Duration::days(29))
            .await
            .unwrap();

        // And one user active only outside of it
        repo.interactions
            .record(3, "command", now - chrono::Duration::days(31))
            .await
            .unwrap();

        assert_eq!(repo.interactions.monthly_active_users(now).await.unwrap(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn mau_of_an_empty_log_is_zero() {
        let repo = test_repo().await;
        assert_eq!(
            repo.interactions.monthly_active_users(Utc::now()).await.unwrap(),
            0
        );
    }
}

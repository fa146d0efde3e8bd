use crate::db::Repo;
use crate::prelude::*;
use crate::Result;
use chrono::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The MAU query scans the whole interaction log, so its result is cached
/// for this long before being recomputed.
const MAU_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Engagement analytics on top of the interaction log.
///
/// Recording is fire-and-forget: analytics must never break the user-facing
/// flow, so failures are logged and swallowed.
pub(crate) struct AnalyticsService {
    db: Arc<Repo>,
    mau_cache: Mutex<Option<CachedCount>>,
}

#[derive(Clone, Copy)]
struct CachedCount {
    value: i64,
    computed_at: Instant,
}

impl AnalyticsService {
    pub(crate) fn new(db: Arc<Repo>) -> Self {
        Self {
            db,
            mau_cache: Mutex::new(None),
        }
    }

    pub(crate) async fn record(&self, tg_id: i64, kind: &str) {
        if let Err(err) = self.db.interactions.record(tg_id, kind, Utc::now()).await {
            warn!(err = tracing_err(&err), "Failed to record a user interaction");
        }
    }

    pub(crate) async fn monthly_active_users(&self) -> Result<i64> {
        self.monthly_active_users_at(Utc::now(), Instant::now()).await
    }

    async fn monthly_active_users_at(&self, now: DateTime<Utc>, clock: Instant) -> Result<i64> {
        let cached = *self.mau_cache.lock();

        if let Some(cached) = cached {
            if clock.duration_since(cached.computed_at) < MAU_CACHE_TTL {
                return Ok(cached.value);
            }
        }

        match self.db.interactions.monthly_active_users(now).await {
            Ok(value) => {
                *self.mau_cache.lock() = Some(CachedCount {
                    value,
                    computed_at: clock,
                });
                Ok(value)
            }
            Err(err) => {
                // An expired cache entry still beats an error message
                if let Some(cached) = cached {
                    warn!(
                        err = tracing_err(&err),
                        "MAU recomputation failed, serving the stale value"
                    );
                    return Ok(cached.value);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_repo;

    #[test_log::test(tokio::test)]
    async fn mau_is_cached_within_the_ttl() {
        let analytics = AnalyticsService::new(Arc::new(test_repo().await));
        let now = Utc::now();
        let clock = Instant::now();

        analytics.record(1, "command").await;
        assert_eq!(analytics.monthly_active_users_at(now, clock).await.unwrap(), 1);

        // New activity is invisible until the TTL passes
        analytics.record(2, "command").await;
        assert_eq!(analytics.monthly_active_users_at(now, clock).await.unwrap(), 1);

        let later = clock + MAU_CACHE_TTL;
        assert_eq!(analytics.monthly_active_users_at(now, later).await.unwrap(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn recording_swallows_failures() {
        let repo = test_repo().await;
        sqlx::query("DROP TABLE user_interactions")
            .execute(repo.interactions.pool())
            .await
            .unwrap();

        // Must not panic or propagate
        AnalyticsService::new(Arc::new(repo)).record(1, "command").await;
    }
}

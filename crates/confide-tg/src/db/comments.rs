use super::confessions::ConfessionStatus;
use super::users::User;
use super::Db;
use crate::error::err;
use crate::prelude::*;
use crate::{Result, UserError};
use chrono::prelude::*;

pub(crate) const COMMENT_MAX_LEN: usize = 1000;

/// Number of reports on a single comment that triggers a moderation alert.
pub(crate) const REPORT_ALERT_THRESHOLD: i64 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ReactionKind {
    Like,
    Dislike,
    Report,
}

impl ReactionKind {
    /// The reaction this one is mutually exclusive with. Reports live in
    /// their own group and exclude nothing.
    pub(crate) fn opposite(self) -> Option<Self> {
        match self {
            Self::Like => Some(Self::Dislike),
            Self::Dislike => Some(Self::Like),
            Self::Report => None,
        }
    }

    fn counter_column(self) -> &'static str {
        match self {
            Self::Like => "like_count",
            Self::Dislike => "dislike_count",
            Self::Report => "report_count",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Comment {
    pub(crate) id: i64,
    pub(crate) confession_id: i64,
    #[allow(dead_code)]
    pub(crate) user_id: i64,
    pub(crate) parent_comment_id: Option<i64>,
    pub(crate) text: String,
    pub(crate) like_count: i64,
    pub(crate) dislike_count: i64,
    pub(crate) report_count: i64,
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct ReactionCounts {
    pub(crate) like_count: i64,
    pub(crate) dislike_count: i64,
    pub(crate) report_count: i64,
}

impl Comment {
    pub(crate) fn counts(&self) -> ReactionCounts {
        ReactionCounts {
            like_count: self.like_count,
            dislike_count: self.dislike_count,
            report_count: self.report_count,
        }
    }
}

/// What a single `add_reaction` call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionOutcome {
    /// A fresh reaction row was created.
    Added(ReactionKind),
    /// The user switched between like and dislike: the old row is gone,
    /// both counters were adjusted in the same transaction.
    Switched {
        from: ReactionKind,
        to: ReactionKind,
    },
    /// The user already held this exact reaction, nothing changed.
    Unchanged(ReactionKind),
}

#[derive(Debug)]
pub(crate) struct ReactionUpdate {
    pub(crate) outcome: ReactionOutcome,
    pub(crate) counts: ReactionCounts,
    /// Set when this very call pushed the report counter over
    /// [`REPORT_ALERT_THRESHOLD`]. The caller owes the admins an alert.
    pub(crate) report_alert: bool,
}

/// One page of top-level comments. Replies are attached to their parent,
/// never flattened into the page itself.
#[derive(Debug)]
pub(crate) struct CommentPage {
    pub(crate) items: Vec<Comment>,
    pub(crate) current_page: i64,
    pub(crate) total_pages: i64,
    pub(crate) has_next: bool,
    pub(crate) has_previous: bool,
}

const SELECT_COMMENT: &str = "SELECT id, confession_id, user_id, parent_comment_id, text, \
    like_count, dislike_count, report_count, created_at \
    FROM comments";

#[derive(Clone)]
pub(crate) struct CommentsRepo {
    db: Db,
}

impl CommentsRepo {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Creates a comment (or a reply, when `parent_comment_id` is given) on
    /// an approved confession. The approval requirement and the
    /// parent-belongs-to-the-same-confession rule are enforced here, not
    /// left to the callers.
    #[instrument(skip(self, author, text), fields(author = author.tg_id))]
    pub(crate) async fn create(
        &self,
        author: &User,
        confession_id: i64,
        text: &str,
        parent_comment_id: Option<i64>,
    ) -> Result<Comment> {
        let actual_len = text.chars().count();
        if actual_len > COMMENT_MAX_LEN {
            return Err(err!(UserError::CommentTooLong {
                actual_len,
                max_len: COMMENT_MAX_LEN,
            }));
        }

        let mut tx = self.db.begin_write().await?;

        let status: ConfessionStatus =
            sqlx::query_scalar("SELECT status FROM confessions WHERE id = $1")
                .bind(confession_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| err!(UserError::ConfessionNotFound { confession_id }))?;

        if status != ConfessionStatus::Approved {
            return Err(err!(UserError::ConfessionNotApproved { confession_id }));
        }

        if let Some(parent_id) = parent_comment_id {
            let parent_confession: i64 =
                sqlx::query_scalar("SELECT confession_id FROM comments WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| err!(UserError::CommentNotFound { comment_id: parent_id }))?;

            if parent_confession != confession_id {
                return Err(err!(UserError::ParentCommentMismatch {
                    parent_comment_id: parent_id,
                    confession_id,
                }));
            }
        }

        let comment_id = sqlx::query(
            "INSERT INTO comments (confession_id, user_id, parent_comment_id, text, created_at)
            VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(confession_id)
        .bind(author.id)
        .bind(parent_comment_id)
        .bind(text)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE users SET total_comments = total_comments + 1 WHERE id = $1")
            .bind(author.id)
            .execute(&mut *tx)
            .await?;

        let comment = sqlx::query_as::<_, Comment>(&format!("{SELECT_COMMENT} WHERE id = $1"))
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(comment)
    }

    pub(crate) async fn get(&self, comment_id: i64) -> Result<Comment> {
        sqlx::query_as::<_, Comment>(&format!("{SELECT_COMMENT} WHERE id = $1"))
            .bind(comment_id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or_else(|| err!(UserError::CommentNotFound { comment_id }))
    }

    /// Adds or toggles a reaction as one atomic unit.
    ///
    /// Within the {like, dislike} group a user holds at most one reaction:
    /// adding one removes the other and adjusts both counters in the same
    /// transaction. Reports are independent of that group and idempotent
    /// per user. All counter mutations are relative SQL increments, so
    /// concurrent calls from different users never lose an update.
    #[instrument(skip(self, user), fields(user = user.tg_id))]
    pub(crate) async fn add_reaction(
        &self,
        user: &User,
        comment_id: i64,
        kind: ReactionKind,
    ) -> Result<ReactionUpdate> {
        let mut tx = self.db.begin_write().await?;

        // Existence check doubles as the anchor row for the transaction
        sqlx::query_scalar::<_, i64>("SELECT id FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| err!(UserError::CommentNotFound { comment_id }))?;

        let held: Vec<ReactionKind> = sqlx::query_scalar(
            "SELECT reaction_type FROM reactions WHERE comment_id = $1 AND user_id = $2",
        )
        .bind(comment_id)
        .bind(user.id)
        .fetch_all(&mut *tx)
        .await?;

        let outcome = if held.contains(&kind) {
            ReactionOutcome::Unchanged(kind)
        } else {
            match kind.opposite() {
                Some(opposite) if held.contains(&opposite) => {
                    sqlx::query(
                        "DELETE FROM reactions
                        WHERE comment_id = $1 AND user_id = $2 AND reaction_type = $3",
                    )
                    .bind(comment_id)
                    .bind(user.id)
                    .bind(opposite)
                    .execute(&mut *tx)
                    .await?;

                    decrement_counter(&mut tx, comment_id, opposite).await?;
                    insert_reaction(&mut tx, comment_id, user.id, kind).await?;

                    ReactionOutcome::Switched {
                        from: opposite,
                        to: kind,
                    }
                }
                _ => {
                    insert_reaction(&mut tx, comment_id, user.id, kind).await?;
                    ReactionOutcome::Added(kind)
                }
            }
        };

        let counts = sqlx::query_as::<_, ReactionCounts>(
            "SELECT like_count, dislike_count, report_count FROM comments WHERE id = $1",
        )
        .bind(comment_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let report_alert = kind == ReactionKind::Report
            && matches!(outcome, ReactionOutcome::Added(_))
            && counts.report_count == REPORT_ALERT_THRESHOLD;

        Ok(ReactionUpdate {
            outcome,
            counts,
            report_alert,
        })
    }

    /// Pure read of the three denormalized counters. Must always match the
    /// reactions table, which the tests below verify.
    #[allow(dead_code)]
    pub(crate) async fn reaction_snapshot(&self, comment_id: i64) -> Result<ReactionCounts> {
        sqlx::query_as::<_, ReactionCounts>(
            "SELECT like_count, dislike_count, report_count FROM comments WHERE id = $1",
        )
        .bind(comment_id)
        .fetch_optional(self.db.read())
        .await?
        .ok_or_else(|| err!(UserError::CommentNotFound { comment_id }))
    }

    /// One page of top-level comments, newest first with the id as a stable
    /// tiebreaker. Pages are 1-based; out-of-range requests clamp to the
    /// nearest valid page instead of erroring.
    #[instrument(skip(self))]
    pub(crate) async fn get_page(
        &self,
        confession_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<CommentPage> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM confessions WHERE id = $1")
            .bind(confession_id)
            .fetch_optional(self.db.read())
            .await?
            .ok_or_else(|| err!(UserError::ConfessionNotFound { confession_id }))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments
            WHERE confession_id = $1 AND parent_comment_id IS NULL",
        )
        .bind(confession_id)
        .fetch_one(self.db.read())
        .await?;

        let (current_page, total_pages) = clamp_page(page, total, page_size);

        let items = sqlx::query_as::<_, Comment>(&format!(
            "{SELECT_COMMENT}
            WHERE confession_id = $1 AND parent_comment_id IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3"
        ))
        .bind(confession_id)
        .bind(page_size)
        .bind((current_page - 1) * page_size)
        .fetch_all(self.db.read())
        .await?;

        Ok(CommentPage {
            items,
            current_page,
            total_pages,
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
        })
    }

    /// All comments of a confession, replies included.
    pub(crate) async fn count(&self, confession_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE confession_id = $1")
            .bind(confession_id)
            .fetch_one(self.db.read())
            .await
            .map_err(Into::into)
    }

    /// Direct replies to a comment, oldest first.
    pub(crate) async fn replies(&self, parent_comment_id: i64) -> Result<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "{SELECT_COMMENT} WHERE parent_comment_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(parent_comment_id)
        .fetch_all(self.db.read())
        .await
        .map_err(Into::into)
    }
}

async fn insert_reaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    comment_id: i64,
    user_id: i64,
    kind: ReactionKind,
) -> Result {
    sqlx::query(
        "INSERT INTO reactions (comment_id, user_id, reaction_type, created_at)
        VALUES ($1, $2, $3, $4)",
    )
    .bind(comment_id)
    .bind(user_id)
    .bind(kind)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    adjust_counter(tx, comment_id, kind, 1).await
}

async fn decrement_counter(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    comment_id: i64,
    kind: ReactionKind,
) -> Result {
    adjust_counter(tx, comment_id, kind, -1).await
}

async fn adjust_counter(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    comment_id: i64,
    kind: ReactionKind,
    delta: i64,
) -> Result {
    let column = kind.counter_column();

    sqlx::query(&format!(
        "UPDATE comments SET {column} = {column} + $1 WHERE id = $2"
    ))
    .bind(delta)
    .bind(comment_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// 1-based pagination with Django-paginator clamping: there is always at
/// least one page, and out-of-range page numbers land on the nearest valid
/// page.
fn clamp_page(page: i64, total_items: i64, page_size: i64) -> (i64, i64) {
    let total_pages = (total_items + page_size - 1) / page_size;
    let total_pages = total_pages.max(1);
    (page.clamp(1, total_pages), total_pages)
}

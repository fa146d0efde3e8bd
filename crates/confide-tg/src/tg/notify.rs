use super::{render, Bot};
use crate::db::{Comment, Confession, ConfessionStatus, User};
use crate::prelude::*;
use teloxide::payloads::SendMessageSetters as _;
use teloxide::requests::Requester;
use teloxide::types::ChatId;

/// Pushes proactive PMs: review requests to admins, verdicts to authors and
/// report alerts. Per-recipient failures (a user blocked the bot, an admin
/// never started a PM) are logged and skipped, one broken recipient must
/// not starve the rest.
pub(crate) struct Notifier {
    bot: Bot,
}

impl Notifier {
    pub(crate) fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Fans the review card out to every admin.
    #[instrument(skip_all, fields(confession_id = confession.id))]
    pub(crate) async fn confession_submitted(
        &self,
        admin_tg_ids: &[i64],
        confession: &Confession,
        author: &User,
    ) {
        for &tg_id in admin_tg_ids {
            let result = self
                .bot
                .send_message(ChatId(tg_id), render::review_card(confession, author))
                .reply_markup(render::review_keyboard(confession.id))
                .await;

            if let Err(err) = result {
                warn!(
                    err = tracing_err(&err),
                    admin = tg_id,
                    "Failed to notify an admin about a new confession"
                );
            }
        }
    }

    /// Tells the author how the review went.
    #[instrument(skip_all, fields(confession_id = confession.id))]
    pub(crate) async fn confession_reviewed(&self, author_tg_id: i64, confession: &Confession) {
        let text = match confession.status {
            ConfessionStatus::Approved => format!(
                "Good news! Your confession #{} was approved and published \
                to the channel.",
                confession.id
            ),
            ConfessionStatus::Rejected => format!(
                "Your confession #{} was rejected by the moderators. \
                You can always submit another one with /confess.",
                confession.id
            ),
            ConfessionStatus::Pending => return,
        };

        if let Err(err) = self.bot.send_message(ChatId(author_tg_id), text).await {
            warn!(
                err = tracing_err(&err),
                author = author_tg_id,
                "Failed to notify the author about the verdict"
            );
        }
    }

    /// Fired once per comment, when its report counter reaches the alert
    /// threshold.
    #[instrument(skip_all, fields(comment_id = comment.id))]
    pub(crate) async fn report_threshold_reached(&self, admin_tg_ids: &[i64], comment: &Comment) {
        let text = format!(
            "Comment #{} on confession #{} has been reported {} times:\n\n{}",
            comment.id,
            comment.confession_id,
            comment.report_count,
            teloxide::utils::html::escape(&comment.text),
        );

        for &tg_id in admin_tg_ids {
            if let Err(err) = self.bot.send_message(ChatId(tg_id), text.clone()).await {
                warn!(
                    err = tracing_err(&err),
                    admin = tg_id,
                    "Failed to deliver a report alert"
                );
            }
        }
    }
}

use super::regular::parse_id;
use crate::error::err;
use crate::prelude::*;
use crate::{tg, Result, UserError};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::macros::BotCommands;
use teloxide::payloads::SendMessageSetters as _;
use teloxide::prelude::*;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "These commands are supported for admins:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    AdminHelp,

    #[command(description = "list confessions waiting for review")]
    Pending,

    #[command(description = "delete a confession and its channel post: <confession id>")]
    DeleteConfession(String),

    #[command(description = "list feedback waiting for triage")]
    FeedbackQueue,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        ctx.sender(msg).await?;

        match self {
            Cmd::AdminHelp => {
                ctx.bot.reply_help_html_escaped::<Cmd>(msg).await?;
            }
            Cmd::Pending => {
                let queue = ctx.db.confessions.list_pending().await?;
                if queue.is_empty() {
                    ctx.bot.reply_to(msg, "No confessions to review, well done!").await?;
                    return Ok(());
                }

                // One card per confession so each gets its own verdict buttons
                for confession in queue {
                    let author = ctx.db.users.get(confession.user_id).await?;
                    ctx.bot
                        .send_message(msg.chat.id, tg::render::review_card(&confession, &author))
                        .reply_markup(tg::render::review_keyboard(confession.id))
                        .await?;
                }
            }
            Cmd::DeleteConfession(arg) => {
                let confession_id =
                    parse_id(&arg).ok_or_else(|| err!(UserError::InvalidIdArgument))?;

                let confession = ctx.db.confessions.get(confession_id).await?;
                ctx.db.confessions.delete(confession_id).await?;

                // The database row is already gone, so a failed take-down
                // only leaves an orphaned channel post to clean up by hand
                if let Some(channel_message_id) = confession.channel_message_id {
                    if let Err(err) = ctx.channel.take_down(channel_message_id).await {
                        warn!(
                            err = tracing_err(&err),
                            channel_message_id, "Failed to take down the channel post"
                        );
                    }
                }

                ctx.bot
                    .reply_to(msg, format!("Confession #{confession_id} is gone."))
                    .await?;
            }
            Cmd::FeedbackQueue => {
                let queue = ctx.db.feedback.list_pending().await?;
                if queue.is_empty() {
                    ctx.bot.reply_to(msg, "No feedback to triage.").await?;
                    return Ok(());
                }

                for feedback in queue {
                    let author = ctx.db.users.get(feedback.user_id).await?;
                    ctx.bot
                        .send_message(msg.chat.id, tg::render::feedback_card(&feedback, &author))
                        .reply_markup(tg::render::feedback_keyboard(feedback.id))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Admins are regular users with the `is_admin` flag plus the maintainer.
/// The filter is best-effort: a database hiccup denies access rather than
/// failing the update pipeline.
pub(crate) async fn is_admin(ctx: Arc<tg::Ctx>, msg: Message) -> bool {
    let Some(sender) = msg.from() else {
        return false;
    };

    if sender.id == ctx.cfg.bot_maintainer {
        return true;
    }

    match ctx.db.users.get_by_tg_id(sender.id.0 as i64).await {
        Ok(user) => user.is_admin,
        Err(err) => {
            if !err.is_user_error() {
                warn!(err = tracing_err(&err), "Failed to check admin rights");
            }
            false
        }
    }
}

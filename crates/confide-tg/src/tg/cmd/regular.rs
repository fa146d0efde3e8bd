use crate::error::err;
use crate::prelude::*;
use crate::{tg, Result, UserError};
use async_trait::async_trait;
use teloxide::macros::BotCommands;
use teloxide::payloads::SendMessageSetters as _;
use teloxide::prelude::*;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "These commands are supported:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    Help,

    #[command(description = "submit a confession")]
    Confess,

    #[command(description = "browse comments of a confession: <confession id>")]
    Comments(String),

    #[command(description = "configure how your confessions are published")]
    Settings,

    #[command(description = "show your personal statistics")]
    Stats,

    #[command(description = "send feedback to the bot developers")]
    Feedback,

    #[command(description = "abort the current operation")]
    Cancel,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let sender = ctx.sender(msg).await?;
        let user_id = msg.from().map(|from| from.id);

        match self {
            Cmd::Help => {
                ctx.bot.reply_help_html_escaped::<Cmd>(msg).await?;
            }
            Cmd::Confess => {
                if let Some(user_id) = user_id {
                    ctx.sessions
                        .set(user_id, tg::session::SessionState::AwaitingConfession);
                }
                ctx.bot.reply_to(msg, tg::render::confession_prompt()).await?;
            }
            Cmd::Comments(arg) => {
                let confession_id =
                    parse_id(&arg).ok_or_else(|| err!(UserError::InvalidIdArgument))?;
                tg::flow::send_comments_page(ctx, msg.chat.id, confession_id, 1).await?;
            }
            Cmd::Settings => {
                ctx.bot
                    .reply_to(msg, tg::render::settings(&sender))
                    .reply_markup(tg::render::settings_keyboard(&sender))
                    .await?;
            }
            Cmd::Stats => {
                let stats = ctx.db.users.stats(sender.tg_id).await?;
                ctx.bot.reply_to(msg, tg::render::stats(&stats)).await?;
            }
            Cmd::Feedback => {
                if let Some(user_id) = user_id {
                    ctx.sessions
                        .set(user_id, tg::session::SessionState::AwaitingFeedback);
                }
                ctx.bot.reply_to(msg, tg::render::feedback_prompt()).await?;
            }
            Cmd::Cancel => {
                let had_session = user_id.is_some_and(|user_id| ctx.sessions.clear(user_id));
                let reply = if had_session {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                ctx.bot.reply_to(msg, reply).await?;
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_id(arg: &str) -> Option<i64> {
    arg.trim().trim_start_matches('#').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_argument_tolerates_the_hash_prefix() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(parse_id(" #42 "), Some(42));
        assert_eq!(parse_id("forty-two"), None);
        assert_eq!(parse_id(""), None);
    }
}

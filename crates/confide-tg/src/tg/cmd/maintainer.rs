use super::regular::parse_id;
use crate::error::err;
use crate::prelude::*;
use crate::{tg, Result, UserError};
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use teloxide::macros::BotCommands;
use teloxide::prelude::*;

#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "snake_case",
    description = "These commands are supported for the bot maintainer:"
)]
pub(crate) enum Cmd {
    #[command(description = "display this text")]
    MaintainerHelp,

    #[command(description = "grant admin rights: <telegram user id>")]
    MakeAdmin(String),

    #[command(description = "revoke admin rights: <telegram user id>")]
    RevokeAdmin(String),

    #[command(description = "show monthly active users")]
    Mau,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        ctx.sender(msg).await?;

        match self {
            Cmd::MaintainerHelp => {
                ctx.bot.reply_help_html_escaped::<Cmd>(msg).await?;
            }
            Cmd::MakeAdmin(arg) => {
                let tg_id = parse_id(&arg).ok_or_else(|| err!(UserError::InvalidIdArgument))?;
                ctx.db.users.set_admin(tg_id, true).await?;

                let admins = ctx.db.users.admin_tg_ids().await?;
                ctx.bot
                    .reply_to(
                        msg,
                        format!(
                            "User {tg_id} is now an admin. Current roster: {}",
                            admins.iter().join(", ")
                        ),
                    )
                    .await?;
            }
            Cmd::RevokeAdmin(arg) => {
                let tg_id = parse_id(&arg).ok_or_else(|| err!(UserError::InvalidIdArgument))?;
                ctx.db.users.set_admin(tg_id, false).await?;
                ctx.bot
                    .reply_to(msg, format!("User {tg_id} is no longer an admin."))
                    .await?;
            }
            Cmd::Mau => {
                let mau = ctx.analytics.monthly_active_users().await?;
                ctx.bot
                    .reply_to(msg, format!("Active users in the last 30 days: {mau}"))
                    .await?;
            }
        }
        Ok(())
    }
}

pub(crate) fn is_maintainer(ctx: Arc<tg::Ctx>, msg: Message) -> bool {
    matches!(msg.from(), Some(sender) if sender.id == ctx.cfg.bot_maintainer)
}

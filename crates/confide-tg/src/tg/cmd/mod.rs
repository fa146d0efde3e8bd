pub(crate) mod admin;
pub(crate) mod maintainer;
pub(crate) mod regular;

use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use teloxide::macros::BotCommands;
use teloxide::types::Message;
use teloxide::utils::html;

#[async_trait]
pub(crate) trait Command: fmt::Debug + Send + Sync + 'static {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result;
}

pub(crate) fn handle<'a, C: Command>(
) -> impl Fn(Arc<tg::Ctx>, Message, C) -> BoxFuture<'a, DynResult> {
    move |ctx, msg, cmd| {
        let info = info_span!(
            "handle_command",
            sender = msg.from().map(|from| from.debug_id()).as_deref(),
            chat = msg.chat.id.0,
            cmd = format_args!("{cmd:#?}")
        );

        let fut = async move {
            debug!("Processing command");

            let result = cmd.handle(&ctx, &msg).await;
            if let Err(err) = &result {
                let span = warn_span!("err", err = tracing_err(err), id = err.id());
                async {
                    reply_with_error(&ctx, &msg, err).await;
                }
                .instrument(span)
                .await;
            }
            result.map_err(Into::into)
        };

        Box::pin(fut.instrument(info))
    }
}

/// User errors are rendered back verbatim, anything internal reveals only
/// the error id that we can later look up in the logs.
pub(crate) async fn reply_with_error(ctx: &tg::Ctx, msg: &Message, err: &crate::Error) {
    let reply_msg = if err.is_user_error() {
        html::escape(&err.kind().to_string())
    } else {
        warn!(
            chain = %err.display_chain(),
            "Command handler returned an internal error"
        );
        format!(
            "Something went wrong on our side, sorry. Error id: {}",
            html::code_inline(err.id())
        )
    };

    if let Err(err) = ctx.bot.reply_to(msg, reply_msg).await {
        warn!(
            err = tracing_err(&err),
            "Failed to reply with the error message to the user"
        );
    }
}

/// Special case for the `/start` command in PM with the bot.
///
/// We don't want this command to appear in the help message, so we handle
/// it separately.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case")]
pub(crate) enum StartCommand {
    Start,
}

#[async_trait]
impl Command for StartCommand {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        // Registration happens here, everything else registers lazily too
        ctx.sender(msg).await?;
        ctx.bot.reply_to(msg, tg::render::welcome()).await?;
        Ok(())
    }
}

pub(crate) fn filter_pm_with_bot(msg: Message) -> bool {
    msg.chat.is_private()
}

//! Message and callback routing that doesn't go through bot commands:
//! session-driven PM dialogs and inline keyboard presses.

use super::callback::CallbackData;
use super::session::SessionState;
use super::{cmd, render, Ctx};
use crate::db::{Confession, ConfessionStatus, ReactionKind, ReactionOutcome, User};
use crate::error::err;
use crate::prelude::*;
use crate::util::DynResult;
use crate::{Result, UserError};
use std::sync::Arc;
use teloxide::payloads::{
    AnswerCallbackQuerySetters as _, EditMessageReplyMarkupSetters as _,
    EditMessageTextSetters as _, SendMessageSetters as _,
};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, InlineKeyboardMarkup, Message, UserId};

/// How many top-level comments fit on one page.
const COMMENTS_PAGE_SIZE: i64 = 5;

/// Plain messages in PM are meaningful only while a session is active,
/// everything else is ignored.
pub(crate) async fn handle_message(ctx: Arc<Ctx>, msg: Message) -> DynResult {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    if !msg.chat.is_private() {
        return Ok(());
    }

    let Some(state) = ctx.sessions.take(from.id) else {
        return Ok(());
    };

    let span = info_span!(
        "handle_session_message",
        sender = %from.debug_id(),
        state = format_args!("{state:?}")
    );

    async {
        if let Err(err) = dispatch_session(&ctx, &msg, state).await {
            cmd::reply_with_error(&ctx, &msg, &err).await;
        }
        Ok(())
    }
    .instrument(span)
    .await
}

async fn dispatch_session(ctx: &Ctx, msg: &Message, state: SessionState) -> Result {
    let sender = ctx.sender(msg).await?;
    let from_id = msg.from().map(|from| from.id);

    let Some(text) = msg.text() else {
        if let Some(from_id) = from_id {
            // Give the user another shot instead of dropping the dialog
            ctx.sessions.set(from_id, state);
        }
        ctx.bot
            .reply_to(msg, "I only understand plain text here, try again.")
            .await?;
        return Ok(());
    };

    // Commands that fell through the command branches (e.g. admin commands
    // from a non-admin) must not end up recorded as content
    if text.starts_with('/') {
        if let Some(from_id) = from_id {
            ctx.sessions.set(from_id, state);
        }
        ctx.bot
            .reply_to(msg, "Send the text as a plain message, or /cancel to back out.")
            .await?;
        return Ok(());
    }

    match apply_session_input(ctx, &sender, state, text).await? {
        SessionReply::Text(reply) => {
            ctx.bot.reply_to(msg, reply).await?;
        }
        SessionReply::Keyboard(reply, markup) => {
            ctx.bot.reply_to(msg, reply).reply_markup(markup).await?;
        }
    }

    Ok(())
}

/// What the bot should answer with after consuming a session message.
#[derive(Debug)]
enum SessionReply {
    Text(String),
    Keyboard(String, InlineKeyboardMarkup),
}

/// Records the content of a session-driven message. On a user error the
/// session is restored first, so the user can just send a corrected message
/// instead of starting the dialog over.
async fn apply_session_input(
    ctx: &Ctx,
    sender: &User,
    state: SessionState,
    text: &str,
) -> Result<SessionReply> {
    let user_id = UserId(sender.tg_id as u64);

    match state {
        SessionState::AwaitingConfession | SessionState::ConfirmingConfession { .. } => {
            // A fresh message while a draft is pending replaces the draft
            let actual_len = text.chars().count();
            if actual_len > crate::db::CONFESSION_MAX_LEN {
                ctx.sessions.set(user_id, SessionState::AwaitingConfession);
                return Err(err!(UserError::ConfessionTooLong {
                    actual_len,
                    max_len: crate::db::CONFESSION_MAX_LEN,
                }));
            }

            ctx.sessions.set(
                user_id,
                SessionState::ConfirmingConfession {
                    text: text.to_owned(),
                },
            );

            Ok(SessionReply::Keyboard(
                render::confession_preview(text, sender.is_anonymous_mode),
                render::confirm_keyboard(),
            ))
        }
        SessionState::AwaitingComment {
            confession_id,
            parent_comment_id,
        } => {
            let result = ctx
                .db
                .comments
                .create(sender, confession_id, text, parent_comment_id)
                .await;

            match result {
                Ok(_) => {
                    refresh_channel_keyboard(ctx, confession_id).await;
                    Ok(SessionReply::Text("Your comment is up!".to_owned()))
                }
                Err(err) => {
                    if err.is_user_error() {
                        ctx.sessions.set(
                            user_id,
                            SessionState::AwaitingComment {
                                confession_id,
                                parent_comment_id,
                            },
                        );
                    }
                    Err(err)
                }
            }
        }
        SessionState::AwaitingFeedback => match ctx.db.feedback.submit(sender, text).await {
            Ok(_) => Ok(SessionReply::Text(
                "Thank you! The developers will take a look.".to_owned(),
            )),
            Err(err) => {
                if err.is_user_error() {
                    ctx.sessions.set(user_id, SessionState::AwaitingFeedback);
                }
                Err(err)
            }
        },
    }
}

pub(crate) async fn handle_callback(ctx: Arc<Ctx>, query: CallbackQuery) -> DynResult {
    let span = info_span!(
        "handle_callback",
        sender = %query.from.debug_id(),
        data = query.data.as_deref()
    );

    async {
        let Some(data) = query.data.as_deref().and_then(CallbackData::decode) else {
            // A button from a previous bot version, just dismiss it
            ctx.bot.answer_callback_query(&query.id).await?;
            return Ok(());
        };

        if let Err(err) = dispatch_callback(&ctx, &query, data).await {
            let toast = if err.is_user_error() {
                err.kind().to_string()
            } else {
                warn!(
                    err = tracing_err(&err),
                    id = err.id(),
                    "Callback handler returned an internal error"
                );
                format!("Something went wrong on our side. Error id: {}", err.id())
            };

            let answer_result = ctx
                .bot
                .answer_callback_query(&query.id)
                .text(toast)
                .show_alert(true)
                .await;

            if let Err(err) = answer_result {
                warn!(err = tracing_err(&err), "Failed to answer the callback query");
            }
        }
        Ok(())
    }
    .instrument(span)
    .await
}

async fn dispatch_callback(ctx: &Ctx, query: &CallbackQuery, data: CallbackData) -> Result {
    let sender = ctx.callback_sender(query).await?;

    match data {
        CallbackData::Approve { confession_id } => {
            require_admin(ctx, query, &sender)?;
            review(ctx, query, &sender, confession_id, ConfessionStatus::Approved).await?;
        }
        CallbackData::Reject { confession_id } => {
            require_admin(ctx, query, &sender)?;
            review(ctx, query, &sender, confession_id, ConfessionStatus::Rejected).await?;
        }
        CallbackData::ConfirmConfession => {
            confirm_confession(ctx, query, &sender).await?;
        }
        CallbackData::DiscardConfession => {
            ctx.sessions.clear(query.from.id);
            edit_card(ctx, query, "Draft discarded.".to_owned()).await?;
            ctx.bot.answer_callback_query(&query.id).await?;
        }
        CallbackData::ViewComments { confession_id } => {
            // The button lives on the channel post, so the listing goes to PM
            let pm = ChatId(query.from.id.0 as i64);
            match send_comments_page(ctx, pm, confession_id, 1).await {
                Ok(()) => {
                    ctx.bot.answer_callback_query(&query.id).await?;
                }
                Err(err) if !err.is_user_error() => {
                    // Most likely the user has never started a PM with the bot
                    ctx.bot
                        .answer_callback_query(&query.id)
                        .text("Start a private chat with me first, then try again.")
                        .show_alert(true)
                        .await?;
                }
                Err(err) => return Err(err),
            }
        }
        CallbackData::CommentsPage {
            confession_id,
            page,
        } => {
            let pm = ChatId(query.from.id.0 as i64);
            send_comments_page(ctx, pm, confession_id, page).await?;
            ctx.bot.answer_callback_query(&query.id).await?;
        }
        CallbackData::AddComment { confession_id } => {
            prompt_comment(ctx, query, confession_id, None).await?;
        }
        CallbackData::ReplyTo { comment_id } => {
            let comment = ctx.db.comments.get(comment_id).await?;
            prompt_comment(ctx, query, comment.confession_id, Some(comment_id)).await?;
        }
        CallbackData::React { comment_id, kind } => {
            react(ctx, query, &sender, comment_id, kind).await?;
        }
        CallbackData::ToggleAnonymity => {
            let updated = ctx
                .db
                .users
                .set_anonymity(sender.tg_id, !sender.is_anonymous_mode)
                .await?;

            if let Some(msg) = &query.message {
                ctx.bot
                    .edit_message_text(msg.chat.id, msg.id, render::settings(&updated))
                    .reply_markup(render::settings_keyboard(&updated))
                    .await?;
            }
            ctx.bot.answer_callback_query(&query.id).await?;
        }
        CallbackData::SetFeedbackStatus {
            feedback_id,
            status,
        } => {
            require_admin(ctx, query, &sender)?;

            let feedback = ctx
                .db
                .feedback
                .set_status(feedback_id, status, &sender, None)
                .await?;
            let author = ctx.db.users.get(feedback.user_id).await?;

            if let Some(msg) = &query.message {
                ctx.bot
                    .edit_message_text(msg.chat.id, msg.id, render::feedback_card(&feedback, &author))
                    .reply_markup(render::feedback_keyboard(feedback.id))
                    .await?;
            }
            ctx.bot.answer_callback_query(&query.id).await?;
        }
    }

    Ok(())
}

fn require_admin(ctx: &Ctx, query: &CallbackQuery, sender: &User) -> Result {
    let is_maintainer = query.from.id == ctx.cfg.bot_maintainer;
    if sender.is_admin || is_maintainer {
        return Ok(());
    }
    Err(err!(UserError::AccessDenied))
}

/// The moderation verdict. The review itself commits first, Telegram calls
/// come after, so a crash mid-way never leaves an approved-but-unpublished
/// state marked as published.
async fn review(
    ctx: &Ctx,
    query: &CallbackQuery,
    admin: &User,
    confession_id: i64,
    verdict: ConfessionStatus,
) -> Result {
    let confession = match verdict {
        ConfessionStatus::Approved => ctx.db.confessions.approve(confession_id, admin).await?,
        ConfessionStatus::Rejected => ctx.db.confessions.reject(confession_id, admin).await?,
        ConfessionStatus::Pending => return Ok(()),
    };

    let author = ctx.db.users.get(confession.user_id).await?;

    let published = match verdict {
        ConfessionStatus::Approved => publish_approved(ctx, &confession, &author).await,
        _ => true,
    };

    ctx.notify
        .confession_reviewed(author.tg_id, &confession)
        .await;

    let verdict_line = match verdict {
        ConfessionStatus::Approved if published => format!("✅ Approved by {}", admin.full_name),
        ConfessionStatus::Approved => format!(
            "✅ Approved by {}, but publishing to the channel failed",
            admin.full_name
        ),
        ConfessionStatus::Rejected => format!("❌ Rejected by {}", admin.full_name),
        ConfessionStatus::Pending => unreachable!(),
    };
    let card = format!(
        "{}\n\n{verdict_line}",
        render::review_card(&confession, &author)
    );
    edit_card(ctx, query, card).await?;

    let answer = ctx.bot.answer_callback_query(&query.id);
    if published {
        answer.await?;
    } else {
        answer
            .text("Approved, but publishing to the channel failed. Check the logs.")
            .show_alert(true)
            .await?;
    }
    Ok(())
}

/// Publishes an approved confession and records where it landed. The
/// moderation verdict is already committed at this point, so a channel
/// failure is logged and reported, never propagated.
async fn publish_approved(ctx: &Ctx, confession: &Confession, author: &User) -> bool {
    let public_author = (!confession.is_anonymous).then_some(author);

    let message_id = match ctx.channel.publish(confession, public_author).await {
        Ok(message_id) => message_id,
        Err(err) => {
            warn!(
                err = tracing_err(&err),
                confession_id = confession.id,
                "Failed to publish the approved confession"
            );
            return false;
        }
    };

    if let Err(err) = ctx
        .db
        .confessions
        .set_channel_message(confession.id, message_id.0 as i64)
        .await
    {
        warn!(
            err = tracing_err(&err),
            confession_id = confession.id,
            "Failed to record the channel message id"
        );
    }

    true
}

async fn confirm_confession(ctx: &Ctx, query: &CallbackQuery, sender: &User) -> Result {
    let Some(SessionState::ConfirmingConfession { text }) = ctx.sessions.take(query.from.id)
    else {
        // The draft expired while the keyboard was still on screen
        ctx.bot
            .answer_callback_query(&query.id)
            .text("This draft has expired, start over with /confess.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    let confession = ctx.db.confessions.create(sender, &text).await?;

    metrics::counter!("confessions_submitted_total", 1);

    let admins = ctx.db.users.admin_tg_ids().await?;
    ctx.notify
        .confession_submitted(&admins, &confession, sender)
        .await;

    edit_card(
        ctx,
        query,
        format!(
            "Confession #{} is submitted and waiting for moderation. \
            I'll message you once it's reviewed.",
            confession.id
        ),
    )
    .await?;
    ctx.bot.answer_callback_query(&query.id).await?;
    Ok(())
}

async fn react(
    ctx: &Ctx,
    query: &CallbackQuery,
    sender: &User,
    comment_id: i64,
    kind: ReactionKind,
) -> Result {
    let update = ctx.db.comments.add_reaction(sender, comment_id, kind).await?;

    metrics::counter!("reactions_total", 1);

    if update.report_alert {
        let comment = ctx.db.comments.get(comment_id).await?;
        let admins = ctx.db.users.admin_tg_ids().await?;
        ctx.notify.report_threshold_reached(&admins, &comment).await;
    }

    // Refresh the counters on the card the user pressed
    if let Some(msg) = &query.message {
        let edit_result = ctx
            .bot
            .edit_message_reply_markup(msg.chat.id, msg.id)
            .reply_markup(render::comment_keyboard(comment_id, &update.counts))
            .await;

        // "message is not modified" arrives when nothing changed, fine
        if let Err(err) = edit_result {
            debug!(err = tracing_err(&err), "Skipped a no-op keyboard refresh");
        }
    }

    let toast = match update.outcome {
        ReactionOutcome::Added(ReactionKind::Like) => "Liked!",
        ReactionOutcome::Added(ReactionKind::Dislike) => "Disliked.",
        ReactionOutcome::Added(ReactionKind::Report) => "Reported, the moderators will check it.",
        ReactionOutcome::Switched { .. } => "Changed your mind, got it.",
        ReactionOutcome::Unchanged(ReactionKind::Report) => "You already reported this comment.",
        ReactionOutcome::Unchanged(_) => "Already counted.",
    };
    ctx.bot.answer_callback_query(&query.id).text(toast).await?;
    Ok(())
}

async fn prompt_comment(
    ctx: &Ctx,
    query: &CallbackQuery,
    confession_id: i64,
    parent_comment_id: Option<i64>,
) -> Result {
    ctx.sessions.set(
        query.from.id,
        SessionState::AwaitingComment {
            confession_id,
            parent_comment_id,
        },
    );

    let pm = ChatId(query.from.id.0 as i64);
    let prompt_result = ctx
        .bot
        .send_message(pm, render::comment_prompt(parent_comment_id.is_some()))
        .await;

    match prompt_result {
        Ok(_) => {
            ctx.bot.answer_callback_query(&query.id).await?;
        }
        Err(_) => {
            ctx.sessions.clear(query.from.id);
            ctx.bot
                .answer_callback_query(&query.id)
                .text("Start a private chat with me first, then try again.")
                .show_alert(true)
                .await?;
        }
    }
    Ok(())
}

/// Sends the header plus one card per comment of the requested page.
pub(crate) async fn send_comments_page(
    ctx: &Ctx,
    chat_id: ChatId,
    confession_id: i64,
    page: i64,
) -> Result {
    let confession = ctx.db.confessions.get(confession_id).await?;
    if confession.status != ConfessionStatus::Approved {
        return Err(err!(UserError::ConfessionNotApproved { confession_id }));
    }

    let comments_page = ctx
        .db
        .comments
        .get_page(confession_id, page, COMMENTS_PAGE_SIZE)
        .await?;

    ctx.bot
        .send_message(chat_id, render::comments_header(&confession, &comments_page))
        .reply_markup(render::comments_nav_keyboard(confession_id, &comments_page))
        .await?;

    for comment in &comments_page.items {
        let replies = ctx.db.comments.replies(comment.id).await?;
        ctx.bot
            .send_message(chat_id, render::comment_card(comment, &replies))
            .reply_markup(render::comment_keyboard(comment.id, &comment.counts()))
            .await?;
    }

    Ok(())
}

/// Keeps the comment-count label on the channel post current. Best-effort:
/// the comment itself is already committed.
async fn refresh_channel_keyboard(ctx: &Ctx, confession_id: i64) {
    let result: Result = async {
        let confession = ctx.db.confessions.get(confession_id).await?;
        let Some(channel_message_id) = confession.channel_message_id else {
            return Ok(());
        };

        let count = ctx.db.comments.count(confession_id).await?;
        ctx.channel
            .update_buttons(
                channel_message_id,
                render::channel_keyboard(confession_id, count),
            )
            .await
    }
    .await;

    if let Err(err) = result {
        warn!(
            err = tracing_err(&err),
            confession_id, "Failed to refresh the channel post keyboard"
        );
    }
}

async fn edit_card(ctx: &Ctx, query: &CallbackQuery, text: String) -> Result {
    if let Some(msg) = &query.message {
        ctx.bot.edit_message_text(msg.chat.id, msg.id, text).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::AnalyticsService;
    use crate::db::tests::test_repo;
    use crate::db::FEEDBACK_MAX_LEN;
    use crate::tg::channel::ChannelPublisher;
    use crate::tg::notify::Notifier;
    use crate::tg::session::SessionStore;
    use crate::tg::Config;
    use teloxide::adaptors::trace::Settings;
    use teloxide::types::ParseMode;

    /// A bot whose API endpoint nothing listens on: every send fails fast.
    fn unreachable_bot() -> super::super::Bot {
        teloxide::Bot::new("0:unreachable")
            .set_api_url(url::Url::parse("http://127.0.0.1:9/").unwrap())
            .throttle(Default::default())
            .parse_mode(ParseMode::Html)
            .cache_me()
            .trace(Settings::all())
    }

    async fn test_ctx() -> Arc<Ctx> {
        let bot = unreachable_bot();
        let db = Arc::new(test_repo().await);
        Arc::new(Ctx {
            channel: ChannelPublisher::new(bot.clone(), ChatId(-1000)),
            notify: Notifier::new(bot.clone()),
            analytics: AnalyticsService::new(db.clone()),
            sessions: SessionStore::default(),
            cfg: Config {
                bot_token: String::new(),
                bot_maintainer: UserId(1),
                channel_chat_id: ChatId(-1000),
            },
            bot,
            db,
        })
    }

    #[test_log::test(tokio::test)]
    async fn publish_failure_does_not_revert_the_approval() {
        let ctx = test_ctx().await;

        let author = ctx.db.users.register(1, "Ana", None).await.unwrap();
        let admin = ctx.db.users.register(100, "Mod", None).await.unwrap();
        let confession = ctx.db.confessions.create(&author, "hello").await.unwrap();
        let confession = ctx
            .db
            .confessions
            .approve(confession.id, &admin)
            .await
            .unwrap();

        // The channel is unreachable, the verdict must stand anyway
        let published = publish_approved(&ctx, &confession, &author).await;
        assert!(!published);

        let confession = ctx.db.confessions.get(confession.id).await.unwrap();
        assert_eq!(confession.status, ConfessionStatus::Approved);
        assert_eq!(confession.channel_message_id, None);
    }

    #[test_log::test(tokio::test)]
    async fn rejected_feedback_keeps_the_session_armed() {
        let ctx = test_ctx().await;
        let sender = ctx.db.users.register(1, "Ana", None).await.unwrap();

        ctx.sessions.set(UserId(1), SessionState::AwaitingFeedback);
        let state = ctx.sessions.take(UserId(1)).unwrap();

        let err = apply_session_input(&ctx, &sender, state, &"x".repeat(FEEDBACK_MAX_LEN + 1))
            .await
            .unwrap_err();
        assert!(err.is_user_error());

        // The dialog survives the rejection, a corrected message still counts
        assert_eq!(
            ctx.sessions.take(UserId(1)),
            Some(SessionState::AwaitingFeedback)
        );

        // While a successful submission ends it for good
        let reply = apply_session_input(
            &ctx,
            &sender,
            SessionState::AwaitingFeedback,
            "short and sweet",
        )
        .await;
        assert!(reply.is_ok());
        assert_eq!(ctx.sessions.take(UserId(1)), None);
    }
}

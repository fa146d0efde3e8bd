use super::{render, Bot};
use crate::db::{Confession, User};
use crate::prelude::*;
use crate::Result;
use teloxide::payloads::{EditMessageReplyMarkupSetters as _, SendMessageSetters as _};
use teloxide::requests::Requester;
use teloxide::types::{ChatId, MessageId};

/// Posts approved confessions to the public channel and takes them down
/// again when an admin deletes the confession.
pub(crate) struct ChannelPublisher {
    bot: Bot,
    chat_id: ChatId,
}

impl ChannelPublisher {
    pub(crate) fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    /// `author` is `Some` only when the confession is not anonymous.
    #[instrument(skip_all, fields(confession_id = confession.id))]
    pub(crate) async fn publish(
        &self,
        confession: &Confession,
        author: Option<&User>,
    ) -> Result<MessageId> {
        let msg = self
            .bot
            .send_message(self.chat_id, render::channel_post(confession, author))
            .reply_markup(render::channel_keyboard(confession.id, 0))
            .await?;

        info!(message_id = msg.id.0, "Published a confession to the channel");

        Ok(msg.id)
    }

    /// Replaces the inline keyboard of a published post, used to keep the
    /// comment-count label fresh.
    pub(crate) async fn update_buttons(
        &self,
        channel_message_id: i64,
        markup: teloxide::types::InlineKeyboardMarkup,
    ) -> Result {
        self.bot
            .edit_message_reply_markup(self.chat_id, MessageId(channel_message_id as i32))
            .reply_markup(markup)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub(crate) async fn take_down(&self, channel_message_id: i64) -> Result {
        self.bot
            .delete_message(self.chat_id, MessageId(channel_message_id as i32))
            .await?;
        Ok(())
    }
}

use serde::Deserialize;
use teloxide::types::{ChatId, UserId};

#[derive(Deserialize, Clone)]
pub struct Config {
    pub(crate) bot_token: String,

    /// ID of the user who owns the bot and thus has full access to it,
    /// including managing the admin roster.
    pub(crate) bot_maintainer: UserId,

    /// The channel approved confessions are published to. The bot must be
    /// an admin of it with the permission to post and delete messages.
    pub(crate) channel_chat_id: ChatId,
}

//! Telegram bot root module: the update dispatch tree and shared context.

mod callback;
mod channel;
mod cmd;
mod config;
mod flow;
mod notify;
mod render;
mod session;

pub use config::Config;

use crate::analytics::AnalyticsService;
use crate::db::Repo;
use crate::error::fatal;
use crate::prelude::*;
use crate::Result;
use channel::ChannelPublisher;
use notify::Notifier;
use session::SessionStore;
use std::sync::Arc;
use teloxide::adaptors::trace::Settings;
use teloxide::adaptors::{CacheMe, DefaultParseMode, Throttle, Trace};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

type Bot = Trace<CacheMe<DefaultParseMode<Throttle<teloxide::Bot>>>>;

pub(crate) struct Ctx {
    bot: Bot,
    cfg: Config,
    db: Arc<Repo>,
    sessions: SessionStore,
    channel: ChannelPublisher,
    notify: Notifier,
    analytics: AnalyticsService,
}

impl Ctx {
    /// The registered user behind a message. Registration is lazy and
    /// idempotent, so every handler entry point funnels through here, which
    /// also feeds the activity log.
    pub(crate) async fn sender(&self, msg: &Message) -> Result<crate::db::User> {
        let from = msg
            .from()
            .ok_or_else(|| fatal!("Received a message without a sender"))?;
        self.register(from).await
    }

    pub(crate) async fn callback_sender(
        &self,
        query: &CallbackQuery,
    ) -> Result<crate::db::User> {
        self.register(&query.from).await
    }

    async fn register(&self, from: &teloxide::types::User) -> Result<crate::db::User> {
        let user = self
            .db
            .users
            .register(
                from.id.0 as i64,
                &from.full_name(),
                from.username.as_deref(),
            )
            .await?;

        self.analytics.record(user.tg_id, "update").await;

        Ok(user)
    }
}

pub(crate) struct RunBotOptions {
    pub(crate) tg_cfg: Config,
    pub(crate) db: Repo,
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let cfg = opts.tg_cfg;

    let bot: Bot = teloxide::Bot::new(cfg.bot_token.clone())
        .throttle(Default::default())
        .parse_mode(ParseMode::Html)
        .cache_me()
        .trace(Settings::all());

    let db = Arc::new(opts.db);

    let ctx = Arc::new(Ctx {
        bot: bot.clone(),
        channel: ChannelPublisher::new(bot.clone(), cfg.channel_chat_id),
        notify: Notifier::new(bot.clone()),
        analytics: AnalyticsService::new(db.clone()),
        sessions: SessionStore::default(),
        db,
        cfg,
    });

    info!("Starting bot...");

    bot.set_my_commands(cmd::regular::Cmd::bot_commands()).await?;

    let handler = dptree::entry()
        .inspect(|_: Update| {
            metrics::counter!("tg_updates_total", 1);
        })
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::admin::Cmd>()
                .chain(dptree::filter_async(cmd::admin::is_admin))
                .endpoint(cmd::handle::<cmd::admin::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::maintainer::Cmd>()
                .chain(dptree::filter(cmd::maintainer::is_maintainer))
                .endpoint(cmd::handle::<cmd::maintainer::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::StartCommand>()
                .chain(dptree::filter(cmd::filter_pm_with_bot))
                .endpoint(cmd::handle::<cmd::StartCommand>()),
        )
        .branch(Update::filter_callback_query().endpoint(flow::handle_callback))
        .branch(Update::filter_message().endpoint(flow::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        // We don't handle all possible updates that users send,
        // so to suppress the warning about that we have
        // a noop default handler here
        .default_handler(|_| {
            metrics::counter!("tg_updates_skipped_total", 1);
            std::future::ready(())
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");

    Ok(())
}

use crate::bot;
use crate::bot::handlers::Command;
use crate::bot::TelegramMembership;
use crate::config::BotSettings;
use std::sync::Arc;
use subgate_core::admission::{
    CachedSubscriptionChecker, ClockSource, MembershipChecker, RateLimiter, SubscriptionChecker,
    SystemClock,
};
use subgate_core::config::GateSettings;
use subgate_core::services::Services;
use subgate_core::RequestGate;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let bot = Bot::new(settings.telegram.telegram_token.clone());

    let gate = init_gate(&bot, &settings.gate);
    let services = init_services(&settings);
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);

    let cancel = CancellationToken::new();
    let sweeper = gate.rate_limiter().clone().spawn_sweeper(
        clock.clone(),
        settings.gate.sweep_interval(),
        cancel.clone(),
    );

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![gate, services, settings, clock])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        error!("Rate limit sweeper ended abnormally: {e}");
    }
    info!("Bot stopped.");
}

fn init_gate(bot: &Bot, settings: &GateSettings) -> Arc<RequestGate> {
    let requirement = match settings.requirement() {
        Ok(requirement) => requirement,
        Err(e) => {
            error!("Invalid admission settings: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Initializing RequestGate (cooldown: {:?}, channels: {}, query timeout: {:?}, mode: {:?}, busy policy: {:?})",
        settings.cooldown(),
        requirement.len(),
        settings.query_timeout(),
        settings.query_mode(),
        settings.busy_policy
    );

    let membership = MembershipChecker::new(
        TelegramMembership::new(bot.clone()),
        requirement,
        settings.query_timeout(),
        settings.query_mode(),
    );
    let checker: Arc<dyn SubscriptionChecker> = match settings.subscription_cache_ttl() {
        Some(ttl) => {
            info!(
                "Caching positive subscription checks (ttl: {:?}, max_size: {})",
                ttl, settings.subscription_cache_max_size
            );
            Arc::new(CachedSubscriptionChecker::new(
                membership,
                ttl,
                settings.subscription_cache_max_size,
            ))
        }
        None => Arc::new(membership),
    };

    let rate_limiter = Arc::new(RateLimiter::new(
        settings.cooldown(),
        settings.rate_limit_idle_ttl(),
    ));

    Arc::new(RequestGate::new(rate_limiter, checker, settings.busy_policy))
}

fn init_services(settings: &BotSettings) -> Arc<Services> {
    match Services::from_settings(&settings.services) {
        Ok(services) => {
            info!(
                "Services initialized (vision: {}, speech: {}).",
                services.detector.is_some(),
                services.transcriber.is_some()
            );
            Arc::new(services)
        }
        Err(e) => {
            error!("Failed to initialize services: {e}");
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text_message),
        )
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo_message),
        )
        .branch(
            dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(handle_voice_message),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    gate: Arc<RequestGate>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let notifier = bot.clone();
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg, gate).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, gate, settings).await,
    };
    if let Err(e) = res {
        bot::handlers::report_failure(&notifier, chat_id, "Command", &e).await;
    }
    respond(())
}

async fn handle_text_message(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let notifier = bot.clone();
    if let Err(e) =
        bot::handlers::handle_text(bot, msg, gate, services, settings, clock).await
    {
        bot::handlers::report_failure(&notifier, chat_id, "Text handler", &e).await;
    }
    respond(())
}

async fn handle_photo_message(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let notifier = bot.clone();
    if let Err(e) =
        bot::handlers::handle_photo(bot, msg, gate, services, settings, clock).await
    {
        bot::handlers::report_failure(&notifier, chat_id, "Photo handler", &e).await;
    }
    respond(())
}

async fn handle_voice_message(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let notifier = bot.clone();
    if let Err(e) =
        bot::handlers::handle_voice(bot, msg, gate, services, settings, clock).await
    {
        bot::handlers::report_failure(&notifier, chat_id, "Voice handler", &e).await;
    }
    respond(())
}

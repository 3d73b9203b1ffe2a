use crate::bot::media::TempMedia;
use crate::bot::resilient::{send_html_resilient, send_long_html};
use crate::bot::views::{self, OptionalService, RequestKind};
use crate::config::BotSettings;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use subgate_core::admission::{AdmitResult, ClockSource, ProcessingGuard, UserId};
use subgate_core::services::{ServiceError, Services};
use subgate_core::RequestGate;
use teloxide::{
    prelude::*,
    types::{ChatAction, ChatId},
    utils::command::BotCommands,
};
use tracing::{error, info, warn};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn gate_user(msg: &Message) -> Option<UserId> {
    msg.from.as_ref().map(|u| UserId::from(u.id.0))
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Check subscriptions and show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show help
    #[command(description = "Show this message.")]
    Help,
    /// Show admission statistics
    #[command(description = "Show bot statistics.")]
    Stats,
}

/// Reply to `/start`: list missing channels or welcome the user.
///
/// Does not count against the cooldown.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(bot: Bot, msg: Message, gate: Arc<RequestGate>) -> Result<()> {
    let Some(user) = gate_user(&msg) else {
        return Ok(());
    };

    let missing = gate.subscription_status(&user).await;
    let text = if missing.is_empty() {
        info!("User {user} started the bot");
        views::welcome().to_string()
    } else {
        views::subscription_required_start(&missing)
    };
    send_html_resilient(&bot, msg.chat.id, text).await
}

/// Reply to `/help`. Never gated.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    send_html_resilient(&bot, msg.chat.id, views::help()).await
}

/// Reply to `/stats` for admins.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn stats(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if !settings.telegram.admin_users().contains(&user_id) {
        info!("⛔️ Non-admin user {user_id} requested /stats");
        return send_html_resilient(&bot, msg.chat.id, "⛔️ Access denied").await;
    }
    send_html_resilient(&bot, msg.chat.id, views::stats(&gate.stats())).await
}

/// Run admission for `user`, replying with the denial if there is one.
async fn admit(
    bot: &Bot,
    msg: &Message,
    gate: &RequestGate,
    clock: &dyn ClockSource,
    user: &UserId,
) -> Result<Option<ProcessingGuard>> {
    let denial = match gate.admit(user, clock.now()).await {
        AdmitResult::Allowed(guard) => return Ok(Some(guard)),
        AdmitResult::DeniedRateLimit { retry_after } => views::rate_limited(retry_after),
        AdmitResult::DeniedSubscription { missing } => views::subscription_required(&missing),
        AdmitResult::DeniedBusy => views::busy().to_string(),
    };
    send_html_resilient(bot, msg.chat.id, denial).await?;
    Ok(None)
}

async fn send_action(bot: &Bot, msg: &Message, action: ChatAction) {
    if let Err(e) = bot.send_chat_action(msg.chat.id, action).await {
        warn!("Failed to send chat action: {e}");
    }
}

fn is_network_failure(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ServiceError>()
        .is_some_and(ServiceError::is_network)
}

/// Reply text for admitted work run under the handler deadline.
///
/// Failures and timeouts are logged and turned into a generic reply.
async fn admitted_reply<F>(kind: RequestKind, deadline: Duration, user: &UserId, work: F) -> String
where
    F: Future<Output = Result<String>>,
{
    match tokio::time::timeout(deadline, work).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) if is_network_failure(&e) => {
            error!("{kind:?} request for user {user} failed: {e:#}");
            views::network_error().to_string()
        }
        Ok(Err(e)) => {
            error!("{kind:?} request for user {user} failed: {e:#}");
            views::failed(kind).to_string()
        }
        Err(_) => {
            warn!("{kind:?} request for user {user} timed out after {deadline:?}");
            views::timed_out(kind).to_string()
        }
    }
}

/// Run admitted work and send its reply. The guard is released once the
/// reply has been attempted.
async fn run_admitted<F>(
    bot: &Bot,
    chat_id: ChatId,
    kind: RequestKind,
    deadline: Duration,
    guard: ProcessingGuard,
    work: F,
) -> Result<()>
where
    F: Future<Output = Result<String>>,
{
    let reply = admitted_reply(kind, deadline, guard.user_id(), work).await;
    let sent = send_long_html(bot, chat_id, &reply).await;
    guard.complete();
    sent
}

/// Log a handler failure and send the user a generic apology.
///
/// The apology is sent once, without retries; a failure to send it is
/// only logged.
pub async fn report_failure(bot: &Bot, chat_id: ChatId, context: &str, e: &anyhow::Error) {
    error!("{context} error: {e:#}");
    if let Err(send_err) = bot.send_message(chat_id, views::generic_failure()).await {
        warn!("Failed to send failure notice to chat {chat_id}: {send_err}");
    }
}

/// Handle a plain text question.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<()> {
    let Some(user) = gate_user(&msg) else {
        return Ok(());
    };
    let Some(guard) = admit(&bot, &msg, &gate, clock.as_ref(), &user).await? else {
        return Ok(());
    };

    send_action(&bot, &msg, ChatAction::Typing).await;

    let prompt = msg.text().unwrap_or_default().trim().to_string();
    if prompt.is_empty() {
        return send_html_resilient(&bot, msg.chat.id, views::empty_message()).await;
    }

    info!("User {user} asked a question ({} chars)", prompt.chars().count());
    let inference = services.inference.clone();
    run_admitted(
        &bot,
        msg.chat.id,
        RequestKind::Text,
        settings.services.handler_timeout(),
        guard,
        async move {
            let answer = inference.complete(&prompt).await?;
            Ok(views::answer(answer.as_deref()))
        },
    )
    .await
}

/// Handle a photo: run object detection on the largest size.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<()> {
    let Some(user) = gate_user(&msg) else {
        return Ok(());
    };
    let Some(detector) = services.detector.clone() else {
        return send_html_resilient(&bot, msg.chat.id, views::unavailable(OptionalService::Vision))
            .await;
    };
    let Some(photo) = msg
        .photo()
        .and_then(|sizes| sizes.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height)))
        .cloned()
    else {
        return Ok(());
    };
    let Some(guard) = admit(&bot, &msg, &gate, clock.as_ref(), &user).await? else {
        return Ok(());
    };

    send_action(&bot, &msg, ChatAction::UploadPhoto).await;

    let downloader = bot.clone();
    run_admitted(
        &bot,
        msg.chat.id,
        RequestKind::Image,
        settings.services.handler_timeout(),
        guard,
        async move {
            let media = TempMedia::download(&downloader, &photo.file.id, "jpg").await?;
            let detections = detector.detect(media.read().await?).await?;
            info!("Detected {} object(s) for user {user}", detections.len());
            Ok(views::detections(&detections))
        },
    )
    .await
}

/// Handle a voice note: transcribe it.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_voice(
    bot: Bot,
    msg: Message,
    gate: Arc<RequestGate>,
    services: Arc<Services>,
    settings: Arc<BotSettings>,
    clock: Arc<dyn ClockSource>,
) -> Result<()> {
    let Some(user) = gate_user(&msg) else {
        return Ok(());
    };
    let Some(transcriber) = services.transcriber.clone() else {
        return send_html_resilient(&bot, msg.chat.id, views::unavailable(OptionalService::Speech))
            .await;
    };
    let Some(voice) = msg.voice().cloned() else {
        return Ok(());
    };
    let Some(guard) = admit(&bot, &msg, &gate, clock.as_ref(), &user).await? else {
        return Ok(());
    };

    send_action(&bot, &msg, ChatAction::Typing).await;

    let mime_type = voice
        .mime_type
        .as_ref()
        .map_or_else(|| "audio/ogg".to_string(), ToString::to_string);
    let downloader = bot.clone();
    run_admitted(
        &bot,
        msg.chat.id,
        RequestKind::Voice,
        settings.services.handler_timeout(),
        guard,
        async move {
            let media = TempMedia::download(&downloader, &voice.file.id, "ogg").await?;
            let text = transcriber
                .transcribe(media.read().await?, &mime_type)
                .await?;
            info!("Transcribed {}s voice note for user {user}", voice.duration.seconds());
            Ok(views::transcription(&text))
        },
    )
    .await
}

//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Bot API requests are retried with exponential backoff and jitter only
//! when the failure is transient (network, I/O, flood control). Other API
//! errors, such as a 400 for a bad chat id, surface on the first attempt.

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use anyhow::Result;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::{Retry, RetryIf};
use tracing::warn;

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES)
}

/// Whether a Bot API failure may go away on its own.
#[must_use]
pub const fn is_transient(e: &RequestError) -> bool {
    matches!(
        e,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    )
}

/// Retry a Bot API request while it fails with a transient error.
///
/// # Errors
///
/// Returns the first permanent error, or the last transient one once all
/// retries are exhausted.
pub async fn retry_telegram_request<F, Fut, T>(operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RequestError>>,
{
    RetryIf::spawn(retry_strategy(), operation, is_transient)
        .await
        .map_err(|e| {
            warn!("Telegram API request failed: {e}");
            e
        })
}

/// Retry a multi-step Telegram operation with exponential backoff.
///
/// Every error is retried, so use it only for steps whose failures are
/// not classified, such as a download streamed into a local file.
///
/// # Errors
///
/// Returns the last error once all retries are exhausted.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    Retry::spawn(retry_strategy(), operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Send an HTML message with automatic retry on transient failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_html_resilient(bot: &Bot, chat_id: ChatId, text: impl Into<String>) -> Result<()> {
    let text = text.into();
    retry_telegram_request(|| async {
        bot.send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html)
            .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))?;
    Ok(())
}

/// Send a reply split into as many messages as Telegram's length limit requires.
///
/// # Errors
///
/// Returns an error if any part fails to send.
pub async fn send_long_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for part in super::views::split_message(text, super::views::TELEGRAM_MESSAGE_LIMIT) {
        send_html_resilient(bot, chat_id, part).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() -> Result<()> {
        let attempts = AtomicUsize::new(0);
        let value = retry_telegram_operation(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("connection reset"))
            } else {
                Ok(7)
            }
        })
        .await?;
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_api_error_is_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), RequestError> = retry_telegram_request(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::Api(teloxide::ApiError::BotBlocked))
        })
        .await;
        assert!(matches!(
            result,
            Err(RequestError::Api(teloxide::ApiError::BotBlocked))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_control_is_retried() -> Result<(), RequestError> {
        let attempts = AtomicUsize::new(0);
        let value = retry_telegram_request(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(1)))
            } else {
                Ok("sent")
            }
        })
        .await?;
        assert_eq!(value, "sent");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_telegram_operation(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("still down"))
        })
        .await;
        assert!(result.is_err());
        // First attempt plus one per backoff step
        assert_eq!(attempts.load(Ordering::SeqCst), TELEGRAM_API_MAX_RETRIES + 1);
    }
}

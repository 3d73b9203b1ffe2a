//! Reply texts.
//!
//! Everything here is pure string building so it can be tested without a
//! bot. User-supplied and collaborator-supplied text is HTML-escaped since
//! replies are sent with `ParseMode::Html`.

use std::fmt::Write as _;
use std::time::Duration;
use subgate_core::admission::{ChannelId, GateStats};
use subgate_core::services::Detection;

/// Maximum length of a single Telegram message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Which kind of request a generic reply refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Plain text question
    Text,
    /// Photo for object detection
    Image,
    /// Voice note for transcription
    Voice,
}

/// Whole seconds to wait, rounded up so the user never retries too early.
#[must_use]
pub fn wait_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

/// Cooldown denial.
#[must_use]
pub fn rate_limited(retry_after: Duration) -> String {
    format!(
        "⏳ Please wait {}s before sending a new request",
        wait_seconds(retry_after)
    )
}

fn channel_list(missing: &[ChannelId]) -> String {
    let mut text = String::from("📢 Please subscribe to:\n");
    for channel in missing {
        let _ = writeln!(text, "- {}", html_escape::encode_text(channel.as_str()));
    }
    text.truncate(text.trim_end().len());
    text
}

/// Subscription denial listing the channels still to join.
#[must_use]
pub fn subscription_required(missing: &[ChannelId]) -> String {
    channel_list(missing)
}

/// Variant used by `/start`, which asks the user to come back afterwards.
#[must_use]
pub fn subscription_required_start(missing: &[ChannelId]) -> String {
    format!("{}\n\nThen send /start again", channel_list(missing))
}

/// Denial while a previous request is still running.
#[must_use]
pub const fn busy() -> &'static str {
    "⌛ I'm still working on your previous request, please wait for it to finish"
}

/// Reply to `/start` once every channel is joined.
#[must_use]
pub const fn welcome() -> &'static str {
    "🤖 Welcome!\n\
     Send me:\n\
     - Text for an answer\n\
     - A photo for analysis\n\
     - A voice note for transcription"
}

/// Reply to `/help`.
#[must_use]
pub const fn help() -> &'static str {
    "🛠️ Help:\n\
     /start - Start the bot\n\
     /help - Show this message\n\n\
     Features:\n\
     - Answers to questions\n\
     - Image analysis\n\
     - Voice transcription"
}

/// Reply to `/stats`.
#[must_use]
pub fn stats(stats: &GateStats) -> String {
    format!(
        "📊 <b>Gate statistics</b>\n\
         Admitted: {}\n\
         Rate limited: {}\n\
         Missing subscriptions: {}\n\
         Busy rejections: {}\n\
         Failed checks: {}\n\
         Busy users: {}\n\
         Tracked users: {}",
        stats.admitted,
        stats.rate_limited,
        stats.subscription_denied,
        stats.busy_denied,
        stats.check_failures,
        stats.busy_users,
        stats.tracked_users,
    )
}

/// Reply to a text message with nothing but whitespace.
#[must_use]
pub const fn empty_message() -> &'static str {
    "ℹ️ Empty message"
}

/// Reply when a collaborator could not be reached.
#[must_use]
pub const fn network_error() -> &'static str {
    "🌐 Network error, please try again later"
}

/// Text inference reply.
#[must_use]
pub fn answer(answer: Option<&str>) -> String {
    let body = answer.map_or_else(
        || "No answer available".to_string(),
        |text| html_escape::encode_text(text).into_owned(),
    );
    format!("💡 Answer:\n{body}")
}

/// Object detection reply with one `name (xx.x%)` line per object.
#[must_use]
pub fn detections(found: &[Detection]) -> String {
    if found.is_empty() {
        return "🔍 No objects detected".to_string();
    }
    let mut text = String::from("🖼️ Detected objects:");
    for detection in found {
        let _ = write!(
            text,
            "\n- {} ({:.1}%)",
            html_escape::encode_text(&detection.name),
            f64::from(detection.confidence) * 100.0
        );
    }
    text
}

/// Transcription reply.
#[must_use]
pub fn transcription(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "🔇 No transcription available".to_string();
    }
    format!("🎤 Transcription:\n{}", html_escape::encode_text(text))
}

/// Generic apology when a collaborator fails.
#[must_use]
pub const fn failed(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Text => "❌ Processing error, please try again",
        RequestKind::Image => "❌ Image analysis failed",
        RequestKind::Voice => "❌ Transcription failed",
    }
}

/// Reply when the handler ran past its deadline.
#[must_use]
pub const fn timed_out(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Text => "⏱️ The answer took too long, please try again",
        RequestKind::Image => "⏱️ Image analysis took too long, please try again",
        RequestKind::Voice => "⏱️ Transcription took too long, please try again",
    }
}

/// Collaborators that may be left unconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalService {
    /// Object detection for photos
    Vision,
    /// Transcription for voice notes
    Speech,
}

/// Reply when `service` has no endpoint configured.
#[must_use]
pub const fn unavailable(service: OptionalService) -> &'static str {
    match service {
        OptionalService::Vision => "🚧 Image analysis is currently unavailable",
        OptionalService::Speech => "🚧 Voice transcription is currently unavailable",
    }
}

/// Reply sent by the dispatcher when a handler fails outright.
#[must_use]
pub const fn generic_failure() -> &'static str {
    "❌ Something went wrong, please try again later"
}

/// Length of the HTML entity (`&lt;`, `&#39;`) starting `s`, if any.
fn entity_len(s: &str) -> Option<usize> {
    let rest = s.strip_prefix('&')?;
    let end = rest
        .char_indices()
        .take(10)
        .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '#'))?;
    (end.1 == ';' && end.0 > 0).then_some(end.0 + 2)
}

/// Smallest pieces a message may be cut between: single characters, with
/// HTML entities kept whole.
fn atoms(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = line;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let len = entity_len(rest).unwrap_or_else(|| first.len_utf8());
        let (atom, tail) = rest.split_at(len);
        rest = tail;
        Some(atom)
    })
}

/// Split text into chunks of at most `limit` characters, preferring line
/// breaks. HTML entities are never cut in two.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            for atom in atoms(line) {
                let atom_len = atom.chars().count();
                if current_len + atom_len > limit && !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push_str(atom);
                current_len += atom_len;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

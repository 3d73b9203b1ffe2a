/// Command and message handlers
pub mod handlers;
/// Temporary files for downloaded voice notes and photos
pub mod media;
/// Channel membership lookups through the Bot API
pub mod membership;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Reply texts
pub mod views;

pub use membership::TelegramMembership;

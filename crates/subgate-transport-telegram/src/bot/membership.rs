use async_trait::async_trait;
use subgate_core::admission::{
    ChannelId, ChannelMembership, MemberStatus, PlatformQueryError, UserId,
};
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind, Recipient};
use teloxide::RequestError;

/// Answers membership queries with `getChatMember`.
///
/// The bot must be an administrator of every required channel, otherwise
/// Telegram refuses the lookup and the channel is treated as not joined.
#[derive(Clone)]
pub struct TelegramMembership {
    bot: Bot,
}

impl TelegramMembership {
    /// Wrap a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Numeric ids address a chat directly, anything else is a public `@username`.
pub fn recipient_for(channel: &ChannelId) -> Recipient {
    match channel.as_str().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = channel.as_str();
            if name.starts_with('@') {
                Recipient::ChannelUsername(name.to_string())
            } else {
                Recipient::ChannelUsername(format!("@{name}"))
            }
        }
    }
}

pub(crate) fn status_of(kind: &ChatMemberKind) -> MemberStatus {
    if kind.is_owner() {
        MemberStatus::Owner
    } else if kind.is_administrator() {
        MemberStatus::Administrator
    } else if kind.is_restricted() {
        MemberStatus::Restricted
    } else if kind.is_left() {
        MemberStatus::Left
    } else if kind.is_banned() {
        MemberStatus::Banned
    } else {
        MemberStatus::Member
    }
}

fn map_request_error(e: RequestError) -> PlatformQueryError {
    match e {
        RequestError::Network(e) => PlatformQueryError::Network(e.to_string()),
        RequestError::Io(e) => PlatformQueryError::Network(e.to_string()),
        RequestError::InvalidJson { source, .. } => PlatformQueryError::Malformed(source.to_string()),
        other => PlatformQueryError::Api(other.to_string()),
    }
}

#[async_trait]
impl ChannelMembership for TelegramMembership {
    async fn member_status(
        &self,
        channel: &ChannelId,
        user_id: &UserId,
    ) -> Result<MemberStatus, PlatformQueryError> {
        let telegram_user = user_id.as_str().parse::<u64>().map_err(|_| {
            PlatformQueryError::Malformed(format!("not a Telegram user id: {user_id}"))
        })?;

        let member = self
            .bot
            .get_chat_member(recipient_for(channel), teloxide::types::UserId(telegram_user))
            .await
            .map_err(map_request_error)?;

        Ok(status_of(&member.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_for_numeric_and_username() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(
            recipient_for(&ChannelId::new("-1001234567890")?),
            Recipient::Id(ChatId(-1_001_234_567_890))
        );
        assert_eq!(
            recipient_for(&ChannelId::new("@news")?),
            Recipient::ChannelUsername("@news".to_string())
        );
        assert_eq!(
            recipient_for(&ChannelId::new("news")?),
            Recipient::ChannelUsername("@news".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_left_member_is_not_joined() {
        assert!(!status_of(&ChatMemberKind::Left).is_joined());
    }

    #[tokio::test]
    async fn test_non_numeric_user_is_malformed() -> Result<(), Box<dyn std::error::Error>> {
        let membership = TelegramMembership::new(Bot::new("123:dummy"));
        let result = membership
            .member_status(&ChannelId::new("@news")?, &UserId::new("alice")?)
            .await;
        assert!(matches!(result, Err(PlatformQueryError::Malformed(_))));
        Ok(())
    }
}

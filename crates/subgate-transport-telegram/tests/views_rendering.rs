use std::time::Duration;
use subgate_core::admission::{ChannelId, GateStats};
use subgate_core::services::Detection;
use subgate_transport_telegram::bot::views::{self, OptionalService, RequestKind};

#[test]
fn rate_limit_reply_rounds_wait_up() {
    assert_eq!(
        views::rate_limited(Duration::from_millis(2_001)),
        "⏳ Please wait 3s before sending a new request"
    );
}

#[test]
fn subscription_reply_lists_channels_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let missing = vec![ChannelId::new("@b")?, ChannelId::new("@a")?];
    assert_eq!(
        views::subscription_required(&missing),
        "📢 Please subscribe to:\n- @b\n- @a"
    );
    assert!(views::subscription_required_start(&missing).ends_with("Then send /start again"));
    Ok(())
}

#[test]
fn detections_are_formatted_with_one_decimal() {
    let found = vec![
        Detection {
            name: "cat".into(),
            confidence: 0.912,
        },
        Detection {
            name: "<dog>".into(),
            confidence: 0.5,
        },
    ];
    assert_eq!(
        views::detections(&found),
        "🖼️ Detected objects:\n- cat (91.2%)\n- &lt;dog&gt; (50.0%)"
    );
    assert_eq!(views::detections(&[]), "🔍 No objects detected");
}

#[test]
fn transcription_falls_back_when_blank() {
    assert_eq!(views::transcription("  hello "), "🎤 Transcription:\nhello");
    assert_eq!(views::transcription("   "), "🔇 No transcription available");
}

#[test]
fn stats_reply_includes_every_counter() {
    let stats = GateStats {
        admitted: 10,
        rate_limited: 4,
        subscription_denied: 3,
        busy_denied: 0,
        check_failures: 1,
        busy_users: 2,
        tracked_users: 7,
    };
    let text = views::stats(&stats);
    for expected in [
        "Admitted: 10",
        "Rate limited: 4",
        "Missing subscriptions: 3",
        "Failed checks: 1",
        "Busy users: 2",
        "Tracked users: 7",
    ] {
        assert!(text.contains(expected), "missing {expected:?} in {text}");
    }
}

#[test]
fn generic_replies_differ_per_kind() {
    let kinds = [RequestKind::Text, RequestKind::Image, RequestKind::Voice];
    for kind in kinds {
        assert!(views::failed(kind).starts_with('❌'));
        assert!(views::timed_out(kind).starts_with('⏱'));
    }
    assert_ne!(
        views::unavailable(OptionalService::Vision),
        views::unavailable(OptionalService::Speech)
    );
}

#[test]
fn long_answer_splits_between_entities() {
    let text = views::answer(Some(&format!("{}<i> & done", "x".repeat(4095))));
    let parts = views::split_message(&text, views::TELEGRAM_MESSAGE_LIMIT);

    assert_eq!(parts.concat(), text);
    assert!(parts.iter().all(|p| !p.ends_with("&l") && !p.ends_with('&')));
    assert!(parts.iter().any(|p| p.starts_with("&lt;i&gt;")));
}

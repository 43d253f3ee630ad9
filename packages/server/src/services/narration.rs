use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use werewolf_rules::{ChannelId, NarrationTiming, PauseCategory};

use crate::models::session::FeedEvent;
use crate::platform::ChatPlatform;

/// External voice service. Receives announcement text and, when one applies, how long to take.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, text: &str, duration: Option<Duration>);
}

pub struct LogNarrator;

#[async_trait]
impl Narrator for LogNarrator {
    async fn narrate(&self, text: &str, duration: Option<Duration>) {
        tracing::debug!(duration_ms = ?duration.map(|d| d.as_millis()), "narrate: {}", text);
    }
}

#[derive(Default)]
pub struct RecordingNarrator {
    lines: Mutex<Vec<(String, Option<Duration>)>>,
}

impl RecordingNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lines(&self) -> Vec<(String, Option<Duration>)> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl Narrator for RecordingNarrator {
    async fn narrate(&self, text: &str, duration: Option<Duration>) {
        self.lines.lock().await.push((text.to_string(), duration));
    }
}

/// Posts public announcements one at a time and holds the caller until the table has had time
/// to take each one in.
pub struct NarrationQueue {
    origin: ChannelId,
    platform: Arc<dyn ChatPlatform>,
    narrator: Arc<dyn Narrator>,
    feed: broadcast::Sender<FeedEvent>,
    timing: NarrationTiming,
}

impl NarrationQueue {
    pub fn new(
        origin: ChannelId,
        platform: Arc<dyn ChatPlatform>,
        narrator: Arc<dyn Narrator>,
        feed: broadcast::Sender<FeedEvent>,
        timing: NarrationTiming,
    ) -> Self {
        Self {
            origin,
            platform,
            narrator,
            feed,
            timing,
        }
    }

    /// Send `text` to `space`, hand it to the narrator, then wait out its hold.
    /// Delivery failures are logged; pacing is kept either way.
    pub async fn announce(
        &self,
        space: ChannelId,
        text: &str,
        category: Option<PauseCategory>,
    ) -> Duration {
        let hint = self.timing.duration_hint(text);

        if let Err(e) = self.platform.send_message(space, text).await {
            tracing::warn!(%space, "failed to post announcement: {}", e);
        }
        // 購読者がいなくてもエラーにしない
        let _ = self.feed.send(FeedEvent::Announcement {
            origin: self.origin,
            content: text.to_string(),
            duration_ms: hint.map(|d| d.as_millis() as u64),
            category,
            timestamp: Utc::now(),
        });
        self.narrator.narrate(text, hint).await;

        let hold = self.timing.hold(text, category);
        tokio::time::sleep(hold).await;
        hold
    }

    pub fn timing(&self) -> &NarrationTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryPlatform, SpaceKind};

    #[tokio::test(start_paused = true)]
    async fn announcement_holds_for_hint_plus_pause() {
        let platform = MemoryPlatform::new();
        platform
            .add_existing_space(ChannelId(9), "village", SpaceKind::Text)
            .await;
        let narrator = Arc::new(RecordingNarrator::new());
        let (feed, mut rx) = broadcast::channel(8);
        let queue = NarrationQueue::new(
            ChannelId(1),
            Arc::new(platform.clone()),
            narrator.clone(),
            feed,
            NarrationTiming::default(),
        );

        let start = tokio::time::Instant::now();
        let hold = queue
            .announce(ChannelId(9), "Dawn.", Some(PauseCategory::Morning))
            .await;

        assert_eq!(hold, Duration::from_millis(4_000));
        assert!(start.elapsed() >= hold);
        assert_eq!(
            narrator.lines().await,
            vec![("Dawn.".to_string(), Some(Duration::from_millis(2_500)))]
        );
        match rx.recv().await.unwrap() {
            FeedEvent::Announcement { duration_ms, .. } => assert_eq!(duration_ms, Some(2_500)),
            other => panic!("unexpected feed event {:?}", other),
        }
        assert_eq!(platform.chat_log().await.messages.len(), 1);
    }
}

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::debug;

use super::{queue::LoopMode, track::Track};

/// Something the command surface should tell the guild about.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    TrackStarted {
        track: Arc<Track>,
        loop_mode: LoopMode,
    },
    TrackFailed {
        track: Option<Arc<Track>>,
        error: String,
    },
    QueueFinished,
}

#[derive(Debug, Clone)]
pub struct GuildEvent {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub event: PlaybackEvent,
}

/// Sending half of the notification channel. Never blocks, so it is safe to
/// use while a guild lock is held; events for a guild arrive in decision order.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: flume::Sender<GuildEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, flume::Receiver<GuildEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, guild_id: GuildId, channel_id: Option<ChannelId>, event: PlaybackEvent) {
        if self
            .tx
            .send(GuildEvent {
                guild_id,
                channel_id,
                event,
            })
            .is_err()
        {
            debug!("No listener for playback events of guild {}", guild_id);
        }
    }
}

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use super::scheduler::TrackCompletion;
use crate::error::TransportError;

/// The voice connection that actually renders audio.
///
/// Every method issues a request and returns; none waits for playback. For
/// each successful `play`, the transport must call
/// [`TrackCompletion::finish`] exactly once, with `None` on natural end or
/// explicit stop and `Some(error)` on failure.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError>;

    async fn is_ready(&self, guild_id: GuildId) -> bool;

    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: TrackCompletion,
    ) -> Result<(), TransportError>;

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), TransportError>;

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), TransportError>;
}

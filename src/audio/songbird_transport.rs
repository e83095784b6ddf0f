use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{scheduler::TrackCompletion, transport::VoiceTransport};
use crate::error::TransportError;

/// Voice transport backed by songbird.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
    volume: f32,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            songbird,
            http,
            current_tracks: DashMap::new(),
            volume,
        }
    }

    fn current_handle(&self, guild_id: GuildId) -> Result<TrackHandle, TransportError> {
        self.current_tracks
            .get(&guild_id)
            .map(|handle| handle.clone())
            .ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?;
        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.current_tracks.remove(&guild_id);
        if self.songbird.get(guild_id).is_none() {
            return Ok(());
        }
        self.songbird
            .remove(guild_id)
            .await
            .map_err(|e| TransportError::Control(e.to_string()))?;
        info!("👋 Left voice in guild {}", guild_id);
        Ok(())
    }

    async fn is_ready(&self, guild_id: GuildId) -> bool {
        match self.songbird.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: TrackCompletion,
    ) -> Result<(), TransportError> {
        let call = self
            .songbird
            .get(guild_id)
            .ok_or(TransportError::NotConnected)?;

        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let handle = call.lock().await.play_input(input);
        if let Err(e) = handle.set_volume(self.volume) {
            debug!("Could not set volume in guild {}: {}", guild_id, e);
        }

        // End and Error may both fire for one track; whichever comes first wins.
        let completion = Arc::new(Mutex::new(Some(on_complete)));
        let armed = handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackFinishedHandler {
                    completion: completion.clone(),
                },
            )
            .and_then(|()| {
                handle.add_event(
                    Event::Track(TrackEvent::Error),
                    TrackFinishedHandler { completion },
                )
            });
        // The track is already in the mixer; it must not keep playing unowned.
        stop_unless_armed(armed, || handle.stop())?;

        self.current_tracks.insert(guild_id, handle);
        Ok(())
    }

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.current_handle(guild_id)?
            .stop()
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), TransportError> {
        let handle = self.current_handle(guild_id)?;
        let result = if paused { handle.pause() } else { handle.play() };
        result.map_err(|e| TransportError::Control(e.to_string()))
    }
}

fn stop_unless_armed<E, S>(
    armed: Result<(), E>,
    stop: impl FnOnce() -> Result<(), S>,
) -> Result<(), TransportError>
where
    E: std::fmt::Display,
    S: std::fmt::Display,
{
    let Err(e) = armed else {
        return Ok(());
    };
    if let Err(stop_err) = stop() {
        debug!("Could not stop unarmed track: {}", stop_err);
    }
    Err(TransportError::Control(e.to_string()))
}

/// Forwards the end (or failure) of a songbird track to the scheduler.
struct TrackFinishedHandler {
    completion: Arc<Mutex<Option<TrackCompletion>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let Some(completion) = self.completion.lock().take() else {
            return None;
        };

        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        match &error {
            Some(e) => error!("❌ Track failed in guild {}: {}", completion.ticket().guild_id, e),
            None => debug!("Track ended in guild {}", completion.ticket().guild_id),
        }

        // Runs off songbird's event task so the guild lock is never awaited there.
        tokio::spawn(completion.finish(error));
        None
    }
}

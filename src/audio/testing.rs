//! Test doubles for the playback core.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::{HashMap, HashSet, VecDeque};

use super::{
    scheduler::TrackCompletion,
    track::{Requester, Track},
    transport::VoiceTransport,
};
use crate::error::TransportError;

pub fn requester() -> Requester {
    Requester::new(UserId::new(7), "<@7>")
}

pub fn track(title: &str, duration_secs: u64) -> Track {
    Track::new(
        title,
        format!("https://example.com/{}", title),
        format!("https://stream/{}", title),
        requester(),
    )
    .with_duration_secs(duration_secs)
}

#[derive(Default)]
struct Recorded {
    connected: HashSet<GuildId>,
    plays: HashMap<GuildId, Vec<String>>,
    pending: HashMap<GuildId, VecDeque<TrackCompletion>>,
    stops: HashMap<GuildId, usize>,
    disconnects: HashMap<GuildId, usize>,
    paused: HashMap<GuildId, bool>,
    refuse_play: bool,
    refuse_control: bool,
}

/// Records every request and keeps completions until a test fires them.
#[derive(Default)]
pub struct FakeTransport {
    inner: Mutex<Recorded>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_play(&self, refuse: bool) {
        self.inner.lock().refuse_play = refuse;
    }

    /// Makes pause/resume requests fail until reset.
    pub fn refuse_control(&self, refuse: bool) {
        self.inner.lock().refuse_control = refuse;
    }

    pub fn plays(&self, guild_id: GuildId) -> Vec<String> {
        self.inner.lock().plays.get(&guild_id).cloned().unwrap_or_default()
    }

    pub fn stop_requests(&self, guild_id: GuildId) -> usize {
        self.inner.lock().stops.get(&guild_id).copied().unwrap_or(0)
    }

    pub fn disconnects(&self, guild_id: GuildId) -> usize {
        self.inner.lock().disconnects.get(&guild_id).copied().unwrap_or(0)
    }

    pub fn paused(&self, guild_id: GuildId) -> Option<bool> {
        self.inner.lock().paused.get(&guild_id).copied()
    }

    /// Takes the oldest completion that has not fired yet.
    pub fn take_next(&self, guild_id: GuildId) -> Option<TrackCompletion> {
        self.inner.lock().pending.get_mut(&guild_id)?.pop_front()
    }

    /// Fires the oldest pending completion, as the transport would at track end.
    pub async fn finish_next(&self, guild_id: GuildId, error: Option<String>) {
        let completion = self
            .take_next(guild_id)
            .expect("no pending completion for guild");
        completion.finish(error).await;
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> Result<(), TransportError> {
        self.inner.lock().connected.insert(guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.connected.remove(&guild_id);
        *inner.disconnects.entry(guild_id).or_insert(0) += 1;
        Ok(())
    }

    async fn is_ready(&self, guild_id: GuildId) -> bool {
        self.inner.lock().connected.contains(&guild_id)
    }

    async fn play(
        &self,
        guild_id: GuildId,
        stream_url: &str,
        on_complete: TrackCompletion,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.refuse_play {
            return Err(TransportError::NotConnected);
        }
        inner
            .plays
            .entry(guild_id)
            .or_default()
            .push(stream_url.to_string());
        inner.pending.entry(guild_id).or_default().push_back(on_complete);
        Ok(())
    }

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), TransportError> {
        *self.inner.lock().stops.entry(guild_id).or_insert(0) += 1;
        Ok(())
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.refuse_control {
            return Err(TransportError::Control("track handle gone".into()));
        }
        inner.paused.insert(guild_id, paused);
        Ok(())
    }
}

//! Decides what plays next and drives the transport.
//!
//! Every operation runs as one critical section under the guild lock:
//! "append then maybe advance" and "finish then advance" are each a single
//! transaction, so advance decisions for a guild are totally ordered.
//!
//! Skip never advances by itself. It only asks the transport to stop; the
//! resulting completion is the one and only trigger of the next advance.
//! Completions carry a [`RenderTicket`] and are discarded when the ticket no
//! longer matches the live record, which covers duplicate deliveries,
//! skip/finish races and callbacks arriving after `stop`.

use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

use super::{
    events::{EventSink, PlaybackEvent},
    queue::LoopMode,
    registry::StateRegistry,
    state::{
        GuildPlaybackState, NowPlaying, PlaybackPhase, QueueListing, RenderTicket, SessionToken,
    },
    track::Track,
    transport::VoiceTransport,
};
use crate::error::{PlaybackError, TransportError};

#[derive(Clone)]
pub struct PlaybackScheduler {
    registry: Arc<StateRegistry>,
    transport: Arc<dyn VoiceTransport>,
    events: EventSink,
    max_queue_size: usize,
}

impl PlaybackScheduler {
    pub fn new(
        registry: Arc<StateRegistry>,
        transport: Arc<dyn VoiceTransport>,
        events: EventSink,
        max_queue_size: usize,
    ) -> Self {
        Self {
            registry,
            transport,
            events,
            max_queue_size,
        }
    }

    pub fn registry(&self) -> &Arc<StateRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn VoiceTransport> {
        &self.transport
    }

    /// Starts a play request. The returned token must accompany the tracks
    /// once extraction finishes; see [`enqueue_in`](Self::enqueue_in).
    pub async fn open_session(&self, guild_id: GuildId, announce: Option<ChannelId>) -> SessionToken {
        let mut state = self.registry.lock_live(guild_id).await;
        state.set_announce_channel(announce);
        state.token()
    }

    /// Appends tracks and starts playback if the guild is idle.
    pub async fn enqueue(&self, guild_id: GuildId, tracks: Vec<Track>) -> Result<usize, PlaybackError> {
        let mut state = self.registry.lock_live(guild_id).await;
        self.append_and_start(&mut state, tracks).await
    }

    /// Like [`enqueue`](Self::enqueue), but only into the session the token
    /// was taken from. Fails with `StaleSession` if it was stopped meanwhile.
    pub async fn enqueue_in(
        &self,
        token: SessionToken,
        tracks: Vec<Track>,
    ) -> Result<usize, PlaybackError> {
        let Some(mut state) = self.registry.lock_existing(token.guild_id).await else {
            debug!("Dropping {} resolved tracks for ended session {}", tracks.len(), token.session);
            return Err(PlaybackError::StaleSession);
        };
        if state.session() != token.session {
            debug!(
                "Dropping {} resolved tracks: session {} replaced by {}",
                tracks.len(),
                token.session,
                state.session()
            );
            return Err(PlaybackError::StaleSession);
        }
        self.append_and_start(&mut state, tracks).await
    }

    async fn append_and_start(
        &self,
        state: &mut GuildPlaybackState,
        tracks: Vec<Track>,
    ) -> Result<usize, PlaybackError> {
        if tracks.is_empty() {
            return Err(PlaybackError::EmptyResult);
        }

        let free = self.max_queue_size.saturating_sub(state.queue().len());
        if free == 0 {
            return Err(PlaybackError::QueueFull {
                capacity: self.max_queue_size,
            });
        }

        let added = state
            .queue_mut()
            .append(tracks.into_iter().take(free).map(Arc::new));
        info!("➕ Queued {} track(s) in guild {}", added, state.guild_id());

        if state.phase() == PlaybackPhase::Idle {
            self.advance(state, false).await;
        }

        Ok(added)
    }

    /// Stops the current render. The transport's completion does the advance.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Arc<Track>, PlaybackError> {
        let state = self
            .registry
            .lock_existing(guild_id)
            .await
            .ok_or(PlaybackError::NothingPlaying)?;
        let current = state.current().cloned().ok_or(PlaybackError::NothingPlaying)?;

        self.transport
            .stop_current(guild_id)
            .await
            .map_err(|e| PlaybackError::Transport(e.to_string()))?;

        info!("⏭️ Skip requested for {} in guild {}", current.title(), guild_id);
        drop(state);
        Ok(current)
    }

    /// Clears everything, disconnects and destroys the guild record.
    /// Returns how many queued tracks were dropped. Safe to repeat.
    pub async fn stop(&self, guild_id: GuildId) -> usize {
        let Some(slot) = self.registry.get(guild_id) else {
            self.release_transport(guild_id).await;
            return 0;
        };

        let mut state = slot.lock().await;
        if state.is_closed() {
            return 0;
        }

        let cleared = state.teardown();
        self.registry.remove(guild_id, &slot);
        self.release_transport(guild_id).await;
        info!("⏹️ Playback stopped in guild {} ({} queued tracks dropped)", guild_id, cleared);
        cleared
    }

    async fn release_transport(&self, guild_id: GuildId) {
        match self.transport.stop_current(guild_id).await {
            Ok(()) | Err(TransportError::NotConnected) => {}
            Err(e) => debug!("Stop request failed for guild {}: {}", guild_id, e),
        }
        if let Err(e) = self.transport.disconnect(guild_id).await {
            debug!("Disconnect failed for guild {}: {}", guild_id, e);
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut state = self
            .registry
            .lock_existing(guild_id)
            .await
            .ok_or(PlaybackError::NothingPlaying)?;
        state.pause()?;

        if let Err(e) = self.transport.set_paused(guild_id, true).await {
            if let Err(rollback) = state.resume() {
                debug!("Pause rollback failed for guild {}: {}", guild_id, rollback);
            }
            return Err(PlaybackError::Transport(e.to_string()));
        }
        info!("⏸️ Paused guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut state = self
            .registry
            .lock_existing(guild_id)
            .await
            .ok_or(PlaybackError::InvalidState("Nothing is paused right now!"))?;
        state.resume()?;

        if let Err(e) = self.transport.set_paused(guild_id, false).await {
            if let Err(rollback) = state.pause() {
                debug!("Resume rollback failed for guild {}: {}", guild_id, rollback);
            }
            return Err(PlaybackError::Transport(e.to_string()));
        }
        info!("▶️ Resumed guild {}", guild_id);
        Ok(())
    }

    pub async fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) {
        let mut state = self.registry.lock_live(guild_id).await;
        state.set_loop_mode(mode);
    }

    /// Removes the track at a 1-based queue position.
    pub async fn remove_at(&self, guild_id: GuildId, position: i64) -> Result<Arc<Track>, PlaybackError> {
        match self.registry.lock_existing(guild_id).await {
            Some(mut state) => state.queue_mut().remove_at(position),
            None => Err(PlaybackError::OutOfRange { position, size: 0 }),
        }
    }

    /// Drops the upcoming tracks; the current one keeps playing.
    pub async fn clear_queue(&self, guild_id: GuildId) -> usize {
        match self.registry.lock_existing(guild_id).await {
            Some(mut state) => state.queue_mut().clear(),
            None => 0,
        }
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Result<NowPlaying, PlaybackError> {
        let state = self
            .registry
            .lock_existing(guild_id)
            .await
            .ok_or(PlaybackError::NothingPlaying)?;
        state.now_playing().ok_or(PlaybackError::NothingPlaying)
    }

    pub async fn queue_listing(&self, guild_id: GuildId, limit: usize) -> QueueListing {
        match self.registry.lock_existing(guild_id).await {
            Some(state) => state.listing(limit),
            None => QueueListing::default(),
        }
    }

    /// Completion entry point. Advances exactly once for the render named by
    /// `ticket`; anything else is a stale delivery.
    pub async fn on_track_finished(
        &self,
        ticket: RenderTicket,
        error: Option<String>,
    ) -> Result<(), PlaybackError> {
        let Some(mut state) = self.registry.lock_existing(ticket.guild_id).await else {
            return Err(PlaybackError::StaleSession);
        };
        if !state.is_current_render(&ticket) {
            return Err(PlaybackError::StaleSession);
        }

        let failed = error.is_some();
        if let Some(error) = error {
            warn!("❌ Playback error in guild {}: {}", ticket.guild_id, error);
            self.events.emit(
                ticket.guild_id,
                state.announce_channel(),
                PlaybackEvent::TrackFailed {
                    track: state.current().cloned(),
                    error,
                },
            );
        }

        self.advance(&mut state, failed).await;
        Ok(())
    }

    /// Runs with the guild lock held by the caller.
    async fn advance(&self, state: &mut GuildPlaybackState, after_failure: bool) {
        let guild_id = state.guild_id();
        let next = if after_failure {
            state.decide_next_after_failure()
        } else {
            state.decide_next()
        };

        let Some(track) = next else {
            state.go_idle();
            info!("📭 Queue finished in guild {}", guild_id);
            self.events
                .emit(guild_id, state.announce_channel(), PlaybackEvent::QueueFinished);
            return;
        };

        let ticket = state.begin_render(track.clone());
        let completion = TrackCompletion {
            scheduler: self.clone(),
            ticket,
        };

        match self.transport.play(guild_id, track.stream_url(), completion).await {
            Ok(()) => {
                info!("🎵 Now playing in guild {}: {}", guild_id, track.title());
                self.events.emit(
                    guild_id,
                    state.announce_channel(),
                    PlaybackEvent::TrackStarted {
                        track,
                        loop_mode: state.loop_mode(),
                    },
                );
            }
            Err(e) => {
                warn!("Transport refused {} in guild {}: {}", track.title(), guild_id, e);
                state.go_idle();
                state.queue_mut().push_front(track.clone());
                self.events.emit(
                    guild_id,
                    state.announce_channel(),
                    PlaybackEvent::TrackFailed {
                        track: Some(track),
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}

/// Handed to the transport with every `play`; must be finished exactly once.
pub struct TrackCompletion {
    scheduler: PlaybackScheduler,
    ticket: RenderTicket,
}

impl TrackCompletion {
    pub fn ticket(&self) -> RenderTicket {
        self.ticket
    }

    pub async fn finish(self, error: Option<String>) {
        match self.scheduler.on_track_finished(self.ticket, error).await {
            Ok(()) => {}
            Err(PlaybackError::StaleSession) => {
                debug!(
                    "Discarded stale completion for guild {} ({}, render {})",
                    self.ticket.guild_id, self.ticket.session, self.ticket.render
                );
            }
            Err(e) => warn!("Completion failed for guild {}: {}", self.ticket.guild_id, e),
        }
    }
}

impl fmt::Debug for TrackCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackCompletion")
            .field("ticket", &self.ticket)
            .finish()
    }
}

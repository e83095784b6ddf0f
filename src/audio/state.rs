//! Per-guild playback state machine.
//!
//! A [`GuildPlaybackState`] is only ever touched through the guild lock held
//! by the [`StateRegistry`](super::registry::StateRegistry). Nothing in here
//! talks to the transport; the scheduler does that after asking this type
//! what should happen next.

use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info};

use super::{
    queue::{LoopMode, PlaybackQueue},
    track::Track,
};
use crate::error::PlaybackError;

/// Generation of a guild record. A new id is handed out every time a record
/// is created, so a destroyed session can never be confused with its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Taken when a play request starts, checked when its tracks are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    pub guild_id: GuildId,
    pub session: SessionId,
}

/// Identifies one render of one track. Carried by the transport completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    pub guild_id: GuildId,
    pub session: SessionId,
    pub render: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
}

/// Copy of the now-playing data, safe to render without the lock.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Arc<Track>,
    pub elapsed: Duration,
    pub loop_mode: LoopMode,
    pub paused: bool,
}

/// Bounded copy of the queue for display.
#[derive(Debug, Clone, Default)]
pub struct QueueListing {
    pub current: Option<Arc<Track>>,
    pub upcoming: Vec<Arc<Track>>,
    pub total: usize,
    pub total_duration: Duration,
    pub loop_mode: LoopMode,
}

impl QueueListing {
    /// Tracks queued beyond the preview.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.upcoming.len())
    }
}

#[derive(Debug)]
pub struct GuildPlaybackState {
    guild_id: GuildId,
    session: SessionId,
    queue: PlaybackQueue,
    current: Option<Arc<Track>>,
    loop_mode: LoopMode,
    is_playing: bool,
    is_paused: bool,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    render: u64,
    announce_channel: Option<ChannelId>,
    closed: bool,
}

impl GuildPlaybackState {
    pub fn new(guild_id: GuildId, session: SessionId) -> Self {
        Self {
            guild_id,
            session,
            queue: PlaybackQueue::new(),
            current: None,
            loop_mode: LoopMode::Off,
            is_playing: false,
            is_paused: false,
            started_at: None,
            paused_at: None,
            paused_total: Duration::ZERO,
            render: 0,
            announce_channel: None,
            closed: false,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            guild_id: self.guild_id,
            session: self.session,
        }
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut PlaybackQueue {
        &mut self.queue
    }

    pub fn current(&self) -> Option<&Arc<Track>> {
        self.current.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Takes effect at the next advance; the track already rendering is untouched.
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Loop disabled in guild {}", self.guild_id),
            LoopMode::Track => info!("🔂 Track loop enabled in guild {}", self.guild_id),
            LoopMode::Queue => info!("🔁 Queue loop enabled in guild {}", self.guild_id),
        }
    }

    #[allow(dead_code)]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    #[allow(dead_code)]
    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    #[allow(dead_code)]
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn announce_channel(&self) -> Option<ChannelId> {
        self.announce_channel
    }

    pub fn set_announce_channel(&mut self, channel: Option<ChannelId>) {
        if channel.is_some() {
            self.announce_channel = channel;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn phase(&self) -> PlaybackPhase {
        match (&self.current, self.is_paused) {
            (None, _) => PlaybackPhase::Idle,
            (Some(_), false) => PlaybackPhase::Playing,
            (Some(_), true) => PlaybackPhase::Paused,
        }
    }

    /// Picks the track that plays after the current one, applying the loop mode.
    ///
    /// Track loop replays the same `Arc` without touching the queue. Queue loop
    /// sends the finished track to the tail before popping the new head, so a
    /// single-entry queue replays that entry forever.
    pub fn decide_next(&mut self) -> Option<Arc<Track>> {
        if self.loop_mode == LoopMode::Track {
            if let Some(current) = &self.current {
                debug!("🔂 Replaying {} in guild {}", current.title(), self.guild_id);
                return Some(current.clone());
            }
        }
        self.decide_from_queue()
    }

    /// Picks the next track after the current one failed to render.
    ///
    /// The failed track is dropped in every loop mode. Its stream locator is
    /// only good for one attempt, so neither track loop nor queue loop gets
    /// it back.
    pub fn decide_next_after_failure(&mut self) -> Option<Arc<Track>> {
        if let Some(failed) = &self.current {
            debug!("🗑️ Dropping failed {} in guild {}", failed.title(), self.guild_id);
        }
        self.queue.pop_front()
    }

    fn decide_from_queue(&mut self) -> Option<Arc<Track>> {
        if self.loop_mode == LoopMode::Queue {
            if let Some(current) = &self.current {
                self.queue.append([current.clone()]);
            }
        }
        self.queue.pop_front()
    }

    /// Marks `track` as rendering and returns the ticket its completion must carry.
    pub fn begin_render(&mut self, track: Arc<Track>) -> RenderTicket {
        self.render += 1;
        self.current = Some(track);
        self.started_at = Some(Instant::now());
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.is_playing = true;
        self.is_paused = false;
        RenderTicket {
            guild_id: self.guild_id,
            session: self.session,
            render: self.render,
        }
    }

    pub fn go_idle(&mut self) {
        self.current = None;
        self.started_at = None;
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.is_playing = false;
        self.is_paused = false;
    }

    /// Whether a completion carrying `ticket` refers to what is rendering now.
    pub fn is_current_render(&self, ticket: &RenderTicket) -> bool {
        !self.closed
            && ticket.session == self.session
            && ticket.render == self.render
            && self.current.is_some()
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        match self.phase() {
            PlaybackPhase::Idle => Err(PlaybackError::NothingPlaying),
            PlaybackPhase::Paused => Err(PlaybackError::InvalidState("The track is already paused!")),
            PlaybackPhase::Playing => {
                self.is_paused = true;
                self.paused_at = Some(Instant::now());
                Ok(())
            }
        }
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        match self.phase() {
            PlaybackPhase::Paused => {
                if let Some(paused_at) = self.paused_at.take() {
                    self.paused_total += paused_at.elapsed();
                }
                self.is_paused = false;
                Ok(())
            }
            PlaybackPhase::Playing => Err(PlaybackError::InvalidState("The track is not paused!")),
            PlaybackPhase::Idle => Err(PlaybackError::InvalidState("Nothing is paused right now!")),
        }
    }

    /// Time spent rendering the current track, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.paused_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(started_at)
            .saturating_sub(self.paused_total)
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.current.as_ref().map(|track| NowPlaying {
            track: track.clone(),
            elapsed: self.elapsed(),
            loop_mode: self.loop_mode,
            paused: self.is_paused,
        })
    }

    pub fn listing(&self, limit: usize) -> QueueListing {
        QueueListing {
            current: self.current.clone(),
            upcoming: self.queue.snapshot(limit),
            total: self.queue.len(),
            total_duration: self.queue.total_duration(),
            loop_mode: self.loop_mode,
        }
    }

    /// Resets every field and marks the record dead. Returns how many queued
    /// tracks were dropped.
    pub fn teardown(&mut self) -> usize {
        let cleared = self.queue.clear();
        self.go_idle();
        self.loop_mode = LoopMode::Off;
        self.announce_channel = None;
        self.closed = true;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::track;
    use pretty_assertions::assert_eq;

    fn state() -> GuildPlaybackState {
        GuildPlaybackState::new(GuildId::new(1), SessionId(1))
    }

    fn titles(state: &GuildPlaybackState) -> Vec<String> {
        state.queue().iter().map(|t| t.title().to_string()).collect()
    }

    fn assert_invariants(state: &GuildPlaybackState) {
        if state.is_paused() {
            assert!(state.is_playing());
        }
        if state.current().is_none() {
            assert!(!state.is_playing() && !state.is_paused());
        }
    }

    #[test]
    fn off_mode_consumes_queue() {
        let mut state = state();
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);

        let next = state.decide_next().unwrap();
        state.begin_render(next);
        assert_eq!(state.current().unwrap().title(), "A");

        let next = state.decide_next().unwrap();
        state.begin_render(next);
        assert_eq!(state.current().unwrap().title(), "B");
        assert!(state.decide_next().is_none());
    }

    #[test]
    fn track_loop_returns_same_arc_without_touching_queue() {
        let mut state = state();
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);
        let first = state.decide_next().unwrap();
        state.begin_render(first.clone());
        state.set_loop_mode(LoopMode::Track);

        let again = state.decide_next().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(titles(&state), vec!["B"]);
    }

    #[test]
    fn failure_bypasses_track_loop() {
        let mut state = state();
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);
        let first = state.decide_next().unwrap();
        state.begin_render(first);
        state.set_loop_mode(LoopMode::Track);

        let next = state.decide_next_after_failure().unwrap();
        assert_eq!(next.title(), "B");
    }

    #[test]
    fn failure_is_not_requeued_under_queue_loop() {
        let mut state = state();
        state.set_loop_mode(LoopMode::Queue);
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);
        let first = state.decide_next().unwrap();
        state.begin_render(first);

        let next = state.decide_next_after_failure().unwrap();
        assert_eq!(next.title(), "B");
        assert!(titles(&state).is_empty());

        state.begin_render(next);
        assert!(state.decide_next_after_failure().is_none());
    }

    #[test]
    fn queue_loop_requeues_finished_track_before_pop() {
        let mut state = state();
        state.set_loop_mode(LoopMode::Queue);
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);

        let a = state.decide_next().unwrap();
        state.begin_render(a);
        assert_eq!(titles(&state), vec!["B"]);

        let b = state.decide_next().unwrap();
        assert_eq!(b.title(), "B");
        state.begin_render(b);
        assert_eq!(titles(&state), vec!["A"]);
    }

    #[test]
    fn pause_resume_guards() {
        let mut state = state();
        assert_eq!(state.pause(), Err(PlaybackError::NothingPlaying));
        assert!(matches!(state.resume(), Err(PlaybackError::InvalidState(_))));

        state.begin_render(Arc::new(track("A", 1)));
        assert!(matches!(state.resume(), Err(PlaybackError::InvalidState(_))));
        assert_eq!(state.pause(), Ok(()));
        assert_eq!(state.phase(), PlaybackPhase::Paused);
        assert_invariants(&state);
        assert!(matches!(state.pause(), Err(PlaybackError::InvalidState(_))));
        assert_eq!(state.resume(), Ok(()));
        assert_eq!(state.phase(), PlaybackPhase::Playing);
        assert_invariants(&state);
    }

    #[test]
    fn render_tickets_are_distinct() {
        let mut state = state();
        let first = state.begin_render(Arc::new(track("A", 1)));
        let second = state.begin_render(Arc::new(track("B", 1)));
        assert_ne!(first, second);
        assert!(!state.is_current_render(&first));
        assert!(state.is_current_render(&second));

        state.go_idle();
        assert!(!state.is_current_render(&second));
        assert_invariants(&state);
    }

    #[test]
    fn teardown_closes_record() {
        let mut state = state();
        state.queue_mut().append([Arc::new(track("A", 1)), Arc::new(track("B", 1))]);
        let ticket = state.begin_render(Arc::new(track("C", 1)));
        state.set_loop_mode(LoopMode::Queue);

        assert_eq!(state.teardown(), 2);
        assert!(state.is_closed());
        assert!(state.current().is_none());
        assert_eq!(state.loop_mode(), LoopMode::Off);
        assert!(!state.is_current_render(&ticket));
        assert_invariants(&state);
    }

    #[test]
    fn elapsed_is_zero_when_idle() {
        let state = state();
        assert_eq!(state.elapsed(), Duration::ZERO);
        assert!(state.now_playing().is_none());
    }

    #[test]
    fn listing_reports_remainder() {
        let mut state = state();
        state
            .queue_mut()
            .append((0..15).map(|i| Arc::new(track(&format!("T{}", i), 10))));
        let listing = state.listing(10);
        assert_eq!(listing.upcoming.len(), 10);
        assert_eq!(listing.total, 15);
        assert_eq!(listing.remaining(), 5);
        assert_eq!(listing.total_duration, Duration::from_secs(150));
    }
}

//! # Audio Module
//!
//! Per-guild playback orchestration.
//!
//! ## Architecture
//!
//! ### [`scheduler`] - Playback Scheduler
//! - Owns every mutation of a guild's queue and current track
//! - Advances only when the transport reports a finished track
//!
//! ### [`registry`] - Guild Records
//! - One lock-protected [`state::GuildPlaybackState`] per guild, created lazily
//! - Session ids distinguish a guild's record from the one it replaced
//!
//! ### [`transport`] - Voice Transport
//! - The seam between scheduling and audio rendering
//! - [`songbird_transport`] implements it on top of a songbird call
//!
//! Notifications for the command surface flow out through [`events`].

pub mod events;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod songbird_transport;
pub mod state;
pub mod track;
pub mod transport;

#[cfg(test)]
pub mod testing;

use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::debug;

use super::track::Track;
use crate::error::PlaybackError;

/// What happens to a track once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn label(&self) -> &'static str {
        match self {
            LoopMode::Off => "Disabled",
            LoopMode::Track => "Single Track",
            LoopMode::Queue => "Queue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(LoopMode::Off),
            "track" => Some(LoopMode::Track),
            "queue" => Some(LoopMode::Queue),
            _ => None,
        }
    }
}

/// Ordered tracks waiting to play. Insertion order is play order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<Arc<Track>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends tracks at the tail, keeping them contiguous. Returns how many were added.
    pub fn append<I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Arc<Track>>,
    {
        let before = self.items.len();
        self.items.extend(tracks);
        self.items.len() - before
    }

    /// Puts a track back at the head.
    pub fn push_front(&mut self, track: Arc<Track>) {
        self.items.push_front(track);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Track>> {
        self.items.pop_front()
    }

    #[allow(dead_code)]
    pub fn peek_front(&self) -> Option<&Arc<Track>> {
        self.items.front()
    }

    /// Removes the track at a 1-based `position`, shifting the rest forward.
    pub fn remove_at(&mut self, position: i64) -> Result<Arc<Track>, PlaybackError> {
        let size = self.items.len();
        if position < 1 || position as u64 > size as u64 {
            return Err(PlaybackError::OutOfRange { position, size });
        }

        let removed = self
            .items
            .remove((position - 1) as usize)
            .ok_or(PlaybackError::OutOfRange { position, size })?;
        debug!("❌ Removed queue position {}: {}", position, removed.title());
        Ok(removed)
    }

    /// Drops every queued track, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copies up to `limit` tracks from the head for display.
    pub fn snapshot(&self, limit: usize) -> Vec<Arc<Track>> {
        self.iter().take(limit).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Track>> {
        self.items.iter()
    }

    /// Sum of the known durations; live tracks count as zero.
    pub fn total_duration(&self) -> Duration {
        self.iter().filter_map(|track| track.duration()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::track;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn titles(queue: &PlaybackQueue) -> Vec<String> {
        queue.iter().map(|t| t.title().to_string()).collect()
    }

    fn queue_of(names: &[&str]) -> PlaybackQueue {
        let mut queue = PlaybackQueue::new();
        queue.append(names.iter().map(|name| Arc::new(track(name, 100))));
        queue
    }

    #[test]
    fn fifo_order() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(queue.peek_front().map(|t| t.title()), Some("A"));
        assert_eq!(queue.pop_front().map(|t| t.title().to_string()), Some("A".into()));
        assert_eq!(titles(&queue), vec!["B", "C"]);
    }

    #[test]
    fn duplicate_titles_are_kept() {
        let queue = queue_of(&["A", "A", "A"]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn remove_at_rejects_out_of_range_positions() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(
            queue.remove_at(0).unwrap_err(),
            PlaybackError::OutOfRange { position: 0, size: 3 }
        );
        assert_eq!(
            queue.remove_at(4).unwrap_err(),
            PlaybackError::OutOfRange { position: 4, size: 3 }
        );
        assert!(queue.remove_at(-2).is_err());

        let mut empty = PlaybackQueue::new();
        assert_eq!(
            empty.remove_at(1).unwrap_err(),
            PlaybackError::OutOfRange { position: 1, size: 0 }
        );
        assert_eq!(titles(&queue), vec!["A", "B", "C"]);
    }

    #[test]
    fn remove_at_keeps_relative_order() {
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        let removed = queue.remove_at(2).unwrap();
        assert_eq!(removed.title(), "B");
        assert_eq!(titles(&queue), vec!["A", "C", "D"]);

        let removed = queue.remove_at(3).unwrap();
        assert_eq!(removed.title(), "D");
        assert_eq!(titles(&queue), vec!["A", "C"]);
    }

    #[test]
    fn snapshot_is_bounded_and_does_not_mutate() {
        let queue = queue_of(&["A", "B", "C"]);
        let preview = queue.snapshot(2);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[1].title(), "B");
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.snapshot(10).len(), 3);
    }

    #[test]
    fn clear_reports_count() {
        let mut queue = queue_of(&["A", "B"]);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn total_duration_skips_live_tracks() {
        let mut queue = queue_of(&["A", "B"]);
        queue.append([Arc::new(track("Live", 0))]);
        assert_eq!(queue.total_duration(), Duration::from_secs(200));
    }

    #[test]
    fn loop_mode_parsing() {
        assert_eq!(LoopMode::parse("Track"), Some(LoopMode::Track));
        assert_eq!(LoopMode::parse(" queue "), Some(LoopMode::Queue));
        assert_eq!(LoopMode::parse("off"), Some(LoopMode::Off));
        assert_eq!(LoopMode::parse("forever"), None);
    }

    proptest! {
        /// 1..=size removes exactly that entry; anything else leaves the queue alone.
        #[test]
        fn remove_at_respects_bounds_and_order(size in 0usize..40, position in -5i64..50) {
            let names: Vec<String> = (0..size).map(|i| format!("T{}", i)).collect();
            let mut queue = PlaybackQueue::new();
            queue.append(names.iter().map(|name| Arc::new(track(name, 10))));

            match queue.remove_at(position) {
                Ok(removed) => {
                    prop_assert!(position >= 1 && position as usize <= size);
                    let index = (position - 1) as usize;
                    prop_assert_eq!(removed.title(), names[index].as_str());

                    let mut expected = names.clone();
                    expected.remove(index);
                    prop_assert_eq!(titles(&queue), expected);
                }
                Err(e) => {
                    prop_assert!(position < 1 || position as usize > size);
                    prop_assert_eq!(e, PlaybackError::OutOfRange { position, size });
                    prop_assert_eq!(titles(&queue), names);
                }
            }
        }
    }
}

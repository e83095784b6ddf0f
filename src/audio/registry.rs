use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::state::{GuildPlaybackState, SessionId};

/// The lock guarding one guild's state.
pub type GuildSlot = Mutex<GuildPlaybackState>;

/// Guild id → playback record.
///
/// Get-or-create and remove go through DashMap's per-shard locking, so two
/// racing first commands can never create two records for one guild. Each
/// guild has its own async lock; guilds never contend with each other.
///
/// Lock order: never await a guild lock while holding a map reference. The
/// guild lock may be held while touching the map (teardown does).
#[derive(Debug, Default)]
pub struct StateRegistry {
    guilds: DashMap<GuildId, Arc<GuildSlot>>,
    next_session: AtomicU64,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the guild's record without creating one.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSlot>> {
        self.guilds.get(&guild_id).map(|slot| slot.clone())
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSlot> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
                debug!("🆕 New playback session {} for guild {}", session, guild_id);
                Arc::new(Mutex::new(GuildPlaybackState::new(guild_id, session)))
            })
            .clone()
    }

    /// Locks the guild's live record, creating it if needed.
    ///
    /// A record found closed is mid-teardown and already gone from the map, so
    /// the lookup is retried and lands on a fresh record.
    pub async fn lock_live(&self, guild_id: GuildId) -> OwnedMutexGuard<GuildPlaybackState> {
        loop {
            let slot = self.get_or_create(guild_id);
            let guard = slot.lock_owned().await;
            if !guard.is_closed() {
                return guard;
            }
        }
    }

    /// Locks the guild's live record only if one exists.
    pub async fn lock_existing(
        &self,
        guild_id: GuildId,
    ) -> Option<OwnedMutexGuard<GuildPlaybackState>> {
        let slot = self.get(guild_id)?;
        let guard = slot.lock_owned().await;
        (!guard.is_closed()).then_some(guard)
    }

    /// Removes `slot` if it is still the guild's record. A newer record for the
    /// same guild is left alone.
    pub fn remove(&self, guild_id: GuildId, slot: &Arc<GuildSlot>) -> bool {
        self.guilds
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, slot))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creators_share_one_record() {
        let registry = Arc::new(StateRegistry::new());
        let guild = GuildId::new(42);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(guild) })
            })
            .collect();

        let slots = futures::future::join_all(handles).await;
        let first = slots[0].as_ref().unwrap().clone();
        for slot in slots {
            assert!(Arc::ptr_eq(&first, &slot.unwrap()));
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn recreated_record_gets_new_session() {
        let registry = StateRegistry::new();
        let guild = GuildId::new(1);

        let first = registry.get_or_create(guild);
        let first_session = first.lock().await.session();
        assert!(registry.remove(guild, &first));

        let second = registry.get_or_create(guild);
        assert_ne!(second.lock().await.session(), first_session);
    }

    #[tokio::test]
    async fn stale_remove_leaves_newer_record() {
        let registry = StateRegistry::new();
        let guild = GuildId::new(1);

        let old = registry.get_or_create(guild);
        assert!(registry.remove(guild, &old));
        let _new = registry.get_or_create(guild);

        assert!(!registry.remove(guild, &old));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn lock_existing_never_creates() {
        let registry = StateRegistry::new();
        assert!(registry.lock_existing(GuildId::new(9)).await.is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn lock_live_skips_closed_records() {
        let registry = StateRegistry::new();
        let guild = GuildId::new(3);

        let slot = registry.get_or_create(guild);
        let old_session = {
            let mut state = slot.lock().await;
            state.teardown();
            registry.remove(guild, &slot);
            state.session()
        };

        assert!(registry.lock_existing(guild).await.is_none());
        let live = registry.lock_live(guild).await;
        assert!(!live.is_closed());
        assert_ne!(live.session(), old_session);
    }
}

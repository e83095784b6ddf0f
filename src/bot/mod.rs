//! # Bot Module
//!
//! Discord-facing half of the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It registers the
//! slash commands, turns interactions into scheduler calls and starts the
//! pump that posts playback notifications back to the guild.
//!
//! ## Guild departure
//!
//! When the bot is disconnected from voice, or the guild goes away, the
//! guild's playback is stopped like an explicit `/stop`.

use anyhow::Result;
use parking_lot::Mutex;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{events::GuildEvent, scheduler::PlaybackScheduler},
    config::Config,
    sources::TrackExtractor,
};

pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Owns every guild's queue and playback state
    pub scheduler: PlaybackScheduler,
    /// Turns `/play` queries into tracks
    pub extractor: Arc<dyn TrackExtractor>,
    /// Taken by the first `ready` to start the notification pump
    notifications: Mutex<Option<flume::Receiver<GuildEvent>>>,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        scheduler: PlaybackScheduler,
        extractor: Arc<dyn TrackExtractor>,
        notifications: flume::Receiver<GuildEvent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            extractor,
            notifications: Mutex::new(Some(notifications)),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate within seconds;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of configured guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!("Could not register guild commands. Check the 'applications.commands' scope.")
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx)
                    .await
                    .map_err(|e| {
                        error!("❌ Global command registration failed: {:?}", e);
                        anyhow::anyhow!("Could not register global commands. Check the 'applications.commands' scope.")
                    })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }

        // Reconnects fire `ready` again; only the first one starts the pump.
        let receiver = self.notifications.lock().take();
        if let Some(receiver) = receiver {
            tokio::spawn(events::notification_pump(ctx.http.clone(), receiver));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Stops playback when the bot itself leaves voice.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // A late update from an earlier disconnect must not end a session
        // that has already rejoined.
        if self.scheduler.transport().is_ready(guild_id).await {
            return;
        }

        info!("🔌 Bot left voice in guild {}", guild_id);
        self.scheduler.stop(guild_id).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        info!(
            "🚪 Guild {} removed (unavailable: {})",
            incomplete.id, incomplete.unavailable
        );
        self.scheduler.stop(incomplete.id).await;
    }
}

use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        queue::LoopMode,
        scheduler::PlaybackScheduler,
        state::SessionToken,
        track::{Requester, Track},
    },
    bot::JukeboxBot,
    error::PlaybackError,
    sources::TrackExtractor,
    ui::embeds,
};

/// Handles slash commands
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply_ephemeral(ctx, &command, "❌ This command only works in a server!").await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        _ => reply_ephemeral(ctx, &command, "❌ Unknown command").await?,
    }

    Ok(())
}

/// Outcome of a play request whose tracks were merged into the queue.
#[derive(Debug)]
pub struct PlayAdded {
    pub first: Track,
    pub added: usize,
    pub resolved: usize,
}

/// Resolves `query` without holding any guild lock, then merges the result
/// into the session named by `token`.
///
/// Extraction failures are reported as an empty result. A session stopped
/// while resolving yields `StaleSession`; nothing is queued in that case.
pub async fn resolve_and_enqueue(
    scheduler: &PlaybackScheduler,
    extractor: &dyn TrackExtractor,
    token: SessionToken,
    query: &str,
    requester: &Requester,
) -> Result<PlayAdded, PlaybackError> {
    let tracks = match extractor.resolve(query, requester).await {
        Ok(tracks) => tracks,
        Err(e) => {
            warn!("Extraction failed for {}: {}", query, e);
            Vec::new()
        }
    };

    let resolved = tracks.len();
    let first = tracks.first().cloned();
    let added = scheduler.enqueue_in(token, tracks).await?;
    let first = first.ok_or(PlaybackError::EmptyResult)?;

    Ok(PlayAdded {
        first,
        added,
        resolved,
    })
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_ephemeral(ctx, command, "❌ You need to be in a voice channel first!").await;
    };

    // Extraction can take a while
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let transport = bot.scheduler.transport();
    if !transport.is_ready(guild_id).await {
        if let Err(e) = transport.connect(guild_id, voice_channel_id).await {
            warn!("Could not join voice in guild {}: {}", guild_id, e);
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .embed(embeds::create_error_embed("❌ Could not join your voice channel!")),
                )
                .await?;
            return Ok(());
        }
    }

    let token = bot
        .scheduler
        .open_session(guild_id, Some(command.channel_id))
        .await;
    let requester = Requester::new(command.user.id, format!("<@{}>", command.user.id));

    match resolve_and_enqueue(
        &bot.scheduler,
        bot.extractor.as_ref(),
        token,
        &query,
        &requester,
    )
    .await
    {
        Ok(outcome) => {
            let mut content = format!(
                "✅ Added {} track{} to the queue!",
                outcome.added,
                if outcome.added == 1 { "" } else { "s" }
            );
            if outcome.added < outcome.resolved {
                content.push_str(&format!(
                    " ({} skipped, queue is full)",
                    outcome.resolved - outcome.added
                ));
            }
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .content(content)
                        .embed(embeds::create_tracks_added_embed(&outcome.first, outcome.added)),
                )
                .await?;
        }
        Err(PlaybackError::StaleSession) => {
            debug!("Session for guild {} ended while resolving {}", guild_id, query);
            command.delete_response(&ctx.http).await?;
        }
        Err(e) => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().embed(embeds::create_error_embed(&e.user_message())),
                )
                .await?;
        }
    }

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.skip(guild_id).await {
        Ok(track) => reply(ctx, command, format!("⏭️ Skipped **{}**!", track.title())).await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.scheduler.stop(guild_id).await;
    reply(ctx, command, "⏹️ Playback stopped, queue cleared, and disconnected.").await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.pause(guild_id).await {
        Ok(()) => reply(ctx, command, "⏸️ Paused.").await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.resume(guild_id).await {
        Ok(()) => reply(ctx, command, "▶️ Resumed.").await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let listing = bot
        .scheduler
        .queue_listing(guild_id, bot.config.queue_preview_limit)
        .await;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&listing)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.clear_queue(guild_id).await {
        0 => reply_ephemeral(ctx, command, "❌ The queue is already empty!").await,
        cleared => {
            reply(
                ctx,
                command,
                format!("🗑️ Cleared {} tracks from the queue!", cleared),
            )
            .await
        }
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let now = match bot.scheduler.now_playing(guild_id).await {
        Ok(now) => now,
        Err(e) => return reply_error(ctx, command, &e).await,
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_now_playing_embed(&now)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str())
        .and_then(LoopMode::parse);

    let Some(mode) = mode else {
        return reply_ephemeral(ctx, command, "❌ Loop mode must be off, track or queue.").await;
    };

    bot.scheduler.set_loop_mode(guild_id, mode).await;

    let icon = match mode {
        LoopMode::Off => "🔄",
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
    };
    reply(
        ctx,
        command,
        format!("{} Loop mode set to: **{}**", icon, mode.label()),
    )
    .await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing position"))?;

    match bot.scheduler.remove_at(guild_id, position).await {
        Ok(track) => {
            reply(
                ctx,
                command,
                format!("✂️ Removed track #{}: **{}**", position, track.title()),
            )
            .await
        }
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

/// Voice channel the user is sitting in, from the gateway cache.
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, error: &PlaybackError) -> Result<()> {
    if !error.is_user_visible() {
        debug!("Suppressed {} for /{}", error, command.data.name);
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
        command.delete_response(&ctx.http).await?;
        return Ok(());
    }
    reply_ephemeral(ctx, command, error.user_message()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            events::EventSink,
            registry::StateRegistry,
            testing::{requester, track, FakeTransport},
        },
        error::ExtractError,
        sources::MockTrackExtractor,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const G: GuildId = GuildId::new(55);

    fn scheduler_with(transport: Arc<FakeTransport>, capacity: usize) -> PlaybackScheduler {
        let (events, _rx) = EventSink::channel();
        PlaybackScheduler::new(Arc::new(StateRegistry::new()), transport, events, capacity)
    }

    #[tokio::test]
    async fn resolved_tracks_start_playing() {
        let transport = Arc::new(FakeTransport::new());
        let scheduler = scheduler_with(transport.clone(), 1000);

        let mut extractor = MockTrackExtractor::new();
        extractor.expect_resolve().times(1).returning(|query, _| {
            assert_eq!(query, "lofi beats");
            Ok(vec![track("Lofi 1", 120), track("Lofi 2", 130)])
        });

        let token = scheduler.open_session(G, None).await;
        let outcome = resolve_and_enqueue(&scheduler, &extractor, token, "lofi beats", &requester())
            .await
            .unwrap();

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.first.title(), "Lofi 1");
        assert_eq!(transport.plays(G), vec!["https://stream/Lofi 1"]);
    }

    #[tokio::test]
    async fn stop_during_resolution_drops_the_result() {
        let transport = Arc::new(FakeTransport::new());
        let scheduler = scheduler_with(transport.clone(), 1000);

        let mut extractor = MockTrackExtractor::new();
        extractor
            .expect_resolve()
            .returning(|_, _| Ok(vec![track("Late", 60)]));

        let token = scheduler.open_session(G, None).await;
        scheduler.stop(G).await;

        let err = resolve_and_enqueue(&scheduler, &extractor, token, "late", &requester())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::StaleSession);
        assert!(transport.plays(G).is_empty());
        assert!(scheduler.registry().get(G).is_none());
    }

    #[tokio::test]
    async fn stale_token_does_not_touch_the_next_session() {
        let transport = Arc::new(FakeTransport::new());
        let scheduler = scheduler_with(transport.clone(), 1000);

        let mut extractor = MockTrackExtractor::new();
        extractor
            .expect_resolve()
            .returning(|query, _| Ok(vec![track(query, 60)]));

        let old = scheduler.open_session(G, None).await;
        scheduler.stop(G).await;
        let fresh = scheduler.open_session(G, None).await;

        resolve_and_enqueue(&scheduler, &extractor, fresh, "fresh", &requester())
            .await
            .unwrap();
        let err = resolve_and_enqueue(&scheduler, &extractor, old, "old", &requester())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::StaleSession);
        let listing = scheduler.queue_listing(G, 10).await;
        assert_eq!(listing.current.map(|t| t.title().to_string()), Some("fresh".to_string()));
        assert_eq!(listing.total, 0);
    }

    #[tokio::test]
    async fn extraction_failure_is_an_empty_result() {
        let transport = Arc::new(FakeTransport::new());
        let scheduler = scheduler_with(transport.clone(), 1000);

        let mut extractor = MockTrackExtractor::new();
        extractor.expect_resolve().returning(|_, _| {
            Err(ExtractError::Failed {
                status: "exit status: 1".into(),
                stderr: "ERROR: video unavailable".into(),
            })
        });

        let token = scheduler.open_session(G, None).await;
        let err = resolve_and_enqueue(&scheduler, &extractor, token, "gone", &requester())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::EmptyResult);
        assert!(transport.plays(G).is_empty());
    }

    #[tokio::test]
    async fn partial_merge_reports_skipped_tracks() {
        let transport = Arc::new(FakeTransport::new());
        let scheduler = scheduler_with(transport.clone(), 2);

        let mut extractor = MockTrackExtractor::new();
        extractor.expect_resolve().returning(|_, _| {
            Ok(vec![
                track("P1", 10),
                track("P2", 10),
                track("P3", 10),
                track("P4", 10),
            ])
        });

        let token = scheduler.open_session(G, None).await;
        let outcome = resolve_and_enqueue(&scheduler, &extractor, token, "playlist", &requester())
            .await
            .unwrap();

        assert_eq!((outcome.added, outcome.resolved), (2, 4));
    }
}

use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    events::EventSink, registry::StateRegistry, scheduler::PlaybackScheduler,
    songbird_transport::SongbirdTransport,
};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::YtDlpExtractor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let extractor = Arc::new(YtDlpExtractor::from_config(&config));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&extractor).await;
    }

    // Voice: one songbird manager shared by the transport and the client
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(
        songbird.clone(),
        reqwest::Client::new(),
        config.default_volume,
    ));

    let (events, notifications) = EventSink::channel();
    let scheduler = PlaybackScheduler::new(
        Arc::new(StateRegistry::new()),
        transport,
        events,
        config.max_queue_size,
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), scheduler.clone(), extractor, notifications);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {:?}", e);
            return;
        }
        info!(
            "⚠️ Shutdown signal received, stopping {} active guild(s)...",
            scheduler.registry().len()
        );
        for guild_id in scheduler.registry().guild_ids() {
            scheduler.stop(guild_id).await;
        }
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(extractor: &YtDlpExtractor) -> Result<()> {
    match extractor.verify().await {
        Ok(_) => {
            println!("OK");
            Ok(())
        }
        Err(e) => anyhow::bail!("yt-dlp unavailable: {}", e),
    }
}

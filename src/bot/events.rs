use anyhow::Result;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::events::{GuildEvent, PlaybackEvent},
    ui::embeds,
};

/// Forwards scheduler notifications to each session's announce channel.
///
/// Events are rendered here, after the guild lock that produced them was
/// released. Runs until every sender is gone.
pub async fn notification_pump(http: Arc<Http>, events: flume::Receiver<GuildEvent>) {
    info!("📣 Notification pump started");

    while let Ok(GuildEvent {
        guild_id,
        channel_id,
        event,
    }) = events.recv_async().await
    {
        let Some(channel_id) = channel_id else {
            debug!("No announce channel for guild {}, dropping {:?}", guild_id, event);
            continue;
        };

        if let Err(e) = send_notification(&http, channel_id, &event).await {
            warn!("Failed to announce in guild {}: {:?}", guild_id, e);
        }
    }

    info!("📣 Notification pump stopped");
}

async fn send_notification(http: &Arc<Http>, channel_id: ChannelId, event: &PlaybackEvent) -> Result<()> {
    channel_id
        .send_message(http, embeds::render_notification(event))
        .await?;
    Ok(())
}

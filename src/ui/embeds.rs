use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage},
};
use std::time::Duration;

use crate::audio::{
    events::PlaybackEvent,
    queue::LoopMode,
    state::{NowPlaying, QueueListing},
    track::Track,
};

/// Standard palette for the bot.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";
const TITLE_LIMIT: usize = 45;
const PROGRESS_SEGMENTS: usize = 10;

fn loop_icon(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "▶️",
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
    }
}

fn track_link(track: &Track, title: &str) -> String {
    if track.url().is_empty() {
        format!("**{}**", title)
    } else {
        format!("**[{}]({})**", title, track.url())
    }
}

/// Embed posted to the announce channel when a track starts.
pub fn create_track_started_embed(track: &Track, loop_mode: LoopMode) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(track_link(track, track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("👤 Requested by", &track.requester().mention, true);

    if !track.is_live() {
        embed = embed.field("⏱️ Duration", format_seconds(track.duration_secs()), true);
    }

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(format!("Loop: {}", loop_mode.label())))
        .timestamp(Timestamp::now())
}

/// Embed for `/nowplaying`, with a progress bar when the length is known.
pub fn create_now_playing_embed(now: &NowPlaying) -> CreateEmbed {
    let track = &now.track;
    let title = if now.paused { "⏸️ Paused" } else { "🎵 Now Playing" };

    let time = match track.duration() {
        Some(total) => format!(
            "{}\n{} / {}",
            progress_bar(now.elapsed, total),
            format_duration(now.elapsed),
            format_duration(total)
        ),
        None => "🔴 Live stream or duration unknown".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(track_link(track, track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Time", time, false)
        .field("👤 Requested by", &track.requester().mention, true)
        .field("🔁 Loop Mode", now.loop_mode.label(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Embed for `/queue`. Shows `listing.upcoming` and summarizes the rest.
pub fn create_queue_embed(listing: &QueueListing) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Music Queue")
        .color(colors::INFO_BLUE);

    if listing.current.is_none() && listing.total == 0 {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(format!(
                "Loop Mode: {}",
                listing.loop_mode.label()
            )))
            .timestamp(Timestamp::now());
    }

    let current = match &listing.current {
        Some(track) => format!(
            "{}\nDuration: {}\nRequested by: {}",
            track_link(track, track.title()),
            format_seconds(track.duration_secs()),
            track.requester().mention
        ),
        None => "Nothing".to_string(),
    };
    embed = embed.field(
        format!("{} Now Playing", loop_icon(listing.loop_mode)),
        current,
        false,
    );

    if listing.upcoming.is_empty() {
        embed = embed.field("📑 Up Next", "Queue is empty", false);
    } else {
        let mut description = String::new();
        for (i, track) in listing.upcoming.iter().enumerate() {
            description.push_str(&format!(
                "`{}.` {} | {} | Req: {}\n",
                i + 1,
                track_link(track, &truncate_title(track.title(), TITLE_LIMIT)),
                format_seconds(track.duration_secs()),
                track.requester().mention
            ));
        }
        if listing.remaining() > 0 {
            description.push_str(&format!("\n*...and {} more track(s).*", listing.remaining()));
        }
        embed = embed.description(description);

        let mut info = format!("**Up Next:** {} track(s)", listing.total);
        if listing.total_duration > Duration::ZERO {
            info.push_str(&format!(" • **Length:** {}", format_duration(listing.total_duration)));
        }
        embed = embed.field("ℹ️ Info", info, false);
    }

    embed
        .footer(CreateEmbedFooter::new(format!(
            "Loop Mode: {}",
            listing.loop_mode.label()
        )))
        .timestamp(Timestamp::now())
}

/// Reply to `/play` once the tracks are queued.
pub fn create_tracks_added_embed(first: &Track, added: usize) -> CreateEmbed {
    let (title, description) = if added == 1 {
        (
            "✅ Track Added",
            format!("{} has been added to the queue", track_link(first, first.title())),
        )
    } else {
        (
            "📋 Tracks Added",
            format!(
                "Added **{} tracks** to the queue, starting with {}",
                added,
                track_link(first, &truncate_title(first.title(), TITLE_LIMIT))
            ),
        )
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", format_seconds(first.duration_secs()), true)
        .field("👤 Requested by", &first.requester().mention, true);

    if let Some(thumbnail) = first.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(description)
        .color(colors::ERROR_RED)
}

/// Renders a scheduler notification as a channel message.
pub fn render_notification(event: &PlaybackEvent) -> CreateMessage {
    match event {
        PlaybackEvent::TrackStarted { track, loop_mode } => {
            CreateMessage::new().embed(create_track_started_embed(track, *loop_mode))
        }
        PlaybackEvent::TrackFailed { track, error } => {
            let content = match track {
                Some(track) => format!("❌ Playback error on **{}**: {}", track.title(), error),
                None => format!("❌ Playback error: {}", error),
            };
            CreateMessage::new().content(content)
        }
        PlaybackEvent::QueueFinished => CreateMessage::new().content("📭 Queue finished."),
    }
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Like [`format_duration`], with `N/A` for the unknown-length sentinel.
pub fn format_seconds(secs: u64) -> String {
    if secs == 0 {
        "N/A".to_string()
    } else {
        format_duration(Duration::from_secs(secs))
    }
}

pub fn progress_bar(elapsed: Duration, total: Duration) -> String {
    let ratio = if total.is_zero() {
        0.0
    } else {
        (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    };
    let filled = (ratio * PROGRESS_SEGMENTS as f64) as usize;
    format!(
        "`[{}{}]`",
        "▬".repeat(filled),
        "─".repeat(PROGRESS_SEGMENTS - filled)
    )
}

pub fn truncate_title(title: &str, limit: usize) -> String {
    if title.chars().count() <= limit {
        return title.to_string();
    }
    let cut: String = title.chars().take(limit).collect();
    format!("{}...", cut)
}

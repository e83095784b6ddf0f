use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot answers.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        queue_command(),
        clear_command(),
        nowplaying_command(),
        loop_command(),
        remove_command(),
    ]
}

/// Registers global commands
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play music from YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "YouTube URL or search query",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current track")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback and clear queue")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current track")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume playback")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current queue")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Clear the queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show current track")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Set loop mode")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Loop mode: off, track, queue")
                .add_string_choice("off", "off")
                .add_string_choice("track", "track")
                .add_string_choice("queue", "queue")
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove track from queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Track position in queue",
            )
            .min_int_value(1)
            .required(true),
        )
}

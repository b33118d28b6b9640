use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![youtube_command()]
}

fn youtube_command() -> CreateCommand {
    CreateCommand::new("youtube")
        .description("Reproduce videos de YouTube en tu canal de voz")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "play", "Busca y elige videos para reproducir")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                        .required(true),
                ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "next",
            "Salta al siguiente video",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "queue",
            "Muestra la cola de reproducción",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "move",
            "Mueve el bot a tu canal de voz",
        ))
}

use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{
            CommandDataOption, CommandDataOptionValue, CommandInteraction, ComponentInteraction,
            ComponentInteractionDataKind,
        },
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use crate::{
    audio::{player::PlayerError, queue::PlaybackState, transport::TransportError},
    bot::TubeBot,
    ui::embeds,
};

const NOT_IN_VOICE: &str = "Debes estar en un canal de voz para usar este comando.";

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &TubeBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, &command, "Este comando solo funciona dentro de un servidor.").await;
    };

    let subcommand = match (command.data.name.as_str(), command.data.options.first()) {
        ("youtube", Some(option)) => option,
        _ => return respond(ctx, &command, "❌ Comando no reconocido").await,
    };

    info!(
        "📝 Comando /youtube {} usado por {} en guild {}",
        subcommand.name, command.user.name, guild_id
    );

    match subcommand.name.as_str() {
        "play" => {
            let query = sub_option_str(subcommand, "query")
                .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
                .to_string();
            handle_play(ctx, &command, bot, &query).await
        }
        "next" => handle_next(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "move" => handle_move(ctx, &command, bot, guild_id).await,
        _ => respond(ctx, &command, "❌ Subcomando no reconocido").await,
    }
}

/// Maneja interacciones con componentes (menú de resultados)
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &TubeBot) -> Result<()> {
    if component.data.custom_id != embeds::SEARCH_MENU_ID {
        warn!("⚠️ Componente desconocido: {}", component.data.custom_id);
        return Ok(());
    }

    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let content = match selection_target(ctx, &component) {
        Some((guild_id, channel_id, ids)) => {
            info!(
                "🔘 {} eligió {} video(s) en guild {}",
                component.user.name,
                ids.len(),
                guild_id
            );
            match bot.player.enqueue(guild_id, channel_id, &ids).await {
                Ok(outcome) if outcome.started => {
                    format!("Se agregaron {} video(s) a la cola. ▶️ Reproduciendo.", outcome.added)
                }
                Ok(outcome) => format!("Se agregaron {} video(s) a la cola.", outcome.added),
                Err(e) => {
                    error!("Error agregando a la cola en guild {}: {:?}", guild_id, e);
                    player_error_message(&e)
                }
            }
        }
        None => NOT_IN_VOICE.to_string(),
    };

    component
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content(content).components(Vec::new()),
        )
        .await?;

    Ok(())
}

fn selection_target(ctx: &Context, component: &ComponentInteraction) -> Option<(GuildId, ChannelId, Vec<String>)> {
    let guild_id = component.guild_id?;
    let channel_id = get_user_voice_channel(ctx, guild_id, component.user.id)?;

    let ComponentInteractionDataKind::StringSelect { values } = &component.data.kind else {
        return None;
    };

    Some((guild_id, channel_id, values.clone()))
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &TubeBot, query: &str) -> Result<()> {
    // Defer la respuesta ya que la búsqueda hace dos llamadas a la API
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let edit = match bot.resolver.search(query).await {
        Ok(results) if results.is_empty() => {
            EditInteractionResponse::new().content(embeds::no_results_message(query))
        }
        Ok(results) => EditInteractionResponse::new().components(vec![CreateActionRow::SelectMenu(
            embeds::create_search_menu(query, &results),
        )]),
        Err(e) => {
            error!("Error en búsqueda '{}': {:?}", query, e);
            EditInteractionResponse::new().embed(embeds::create_error_embed(
                "Búsqueda fallida",
                "No se pudo completar la búsqueda.",
            ))
        }
    };

    command.edit_response(&ctx.http, edit).await?;
    Ok(())
}

async fn handle_next(ctx: &Context, command: &CommandInteraction, bot: &TubeBot, guild_id: GuildId) -> Result<()> {
    let content = match bot.player.state(guild_id) {
        PlaybackState::Cancelling(_) => "⏭️ El video actual ya se está saltando.".to_string(),
        _ => match bot.player.skip(guild_id) {
            Ok(()) => "⏭️ Se saltó el video actual.".to_string(),
            Err(e) => player_error_message(&e),
        },
    };

    respond(ctx, command, &content).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &TubeBot, guild_id: GuildId) -> Result<()> {
    let snapshot = bot.player.snapshot(guild_id);
    if snapshot.is_idle() {
        return respond(ctx, command, "La cola está vacía.").await;
    }

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let edit = match bot.resolver.resolve_metadata(&snapshot.items).await {
        Ok(info) => EditInteractionResponse::new()
            .embed(embeds::create_queue_embed(embeds::queue_description(&snapshot, &info))),
        Err(e) => {
            error!("Error obteniendo metadatos de la cola en guild {}: {:?}", guild_id, e);
            EditInteractionResponse::new().content("No se pudo obtener la información de la cola.")
        }
    };

    command.edit_response(&ctx.http, edit).await?;
    Ok(())
}

async fn handle_move(ctx: &Context, command: &CommandInteraction, bot: &TubeBot, guild_id: GuildId) -> Result<()> {
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, NOT_IN_VOICE).await;
    };

    let content = match bot.player.move_to(guild_id, channel_id).await {
        Ok(()) => "🔀 Me uní a tu canal de voz.".to_string(),
        Err(e) => {
            warn!("⚠️ No se pudo mover la conexión en guild {}: {}", guild_id, e);
            player_error_message(&e)
        }
    };

    respond(ctx, command, &content).await
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

fn sub_option_str<'a>(subcommand: &'a CommandDataOption, name: &str) -> Option<&'a str> {
    let CommandDataOptionValue::SubCommand(options) = &subcommand.value else {
        return None;
    };

    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

/// Mensaje para el usuario de cada error del reproductor.
fn player_error_message(error: &PlayerError) -> String {
    match error {
        PlayerError::QueueFull { max } => format!("❌ La cola está llena (máximo {} videos).", max),
        PlayerError::NothingPlaying => "No hay nada reproduciéndose.".to_string(),
        PlayerError::StartAborted => {
            "❌ No se pudo conectar al canal de voz y la cola se vació.".to_string()
        }
        PlayerError::Transport(TransportError::ChangeChannel(_)) => {
            "❌ No se pudo cambiar de canal de voz.".to_string()
        }
        PlayerError::Transport(_) => "❌ No se pudo conectar al canal de voz.".to_string(),
    }
}

/// Canal de voz del usuario según la caché de la guild.
pub fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_player_error_has_a_message() {
        assert_eq!(
            player_error_message(&PlayerError::QueueFull { max: 3 }),
            "❌ La cola está llena (máximo 3 videos)."
        );
        assert_eq!(
            player_error_message(&PlayerError::NothingPlaying),
            "No hay nada reproduciéndose."
        );
        assert_eq!(
            player_error_message(&PlayerError::StartAborted),
            "❌ No se pudo conectar al canal de voz y la cola se vació."
        );
        assert_eq!(
            player_error_message(&TransportError::Connect("x".into()).into()),
            "❌ No se pudo conectar al canal de voz."
        );
        assert_eq!(
            player_error_message(&TransportError::ChangeChannel("x".into()).into()),
            "❌ No se pudo cambiar de canal de voz."
        );
    }
}

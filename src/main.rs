use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{pipeline::PipelineSource, player::Player, voice::SongbirdGateway};
use crate::bot::TubeBot;
use crate::config::Config;
use crate::sources::{MediaResolver, YouTubeAPIv3Client};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tube_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tube Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Voz: songbird compartido entre serenity y el transporte
    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(songbird.clone(), config.frame_buffer));
    let source = Arc::new(PipelineSource::from_config(&config));
    let player = Arc::new(Player::new(source, gateway, config.max_queue_size));

    let api = Arc::new(YouTubeAPIv3Client::new(config.youtube_api_key.clone())?);
    let resolver = Arc::new(MediaResolver::new(api, config.max_results));

    // GUILD_VOICE_STATES para ubicar al usuario y para songbird
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = TubeBot::new(config.clone(), player, resolver);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Verifica que los programas de la tubería de audio respondan.
async fn health_check(config: &Config) -> Result<()> {
    let fetch = async_process::Command::new(&config.fetch_program)
        .arg("--version")
        .output()
        .await?;

    let transcode = async_process::Command::new(&config.transcode_program)
        .arg("-version")
        .output()
        .await?;

    if fetch.status.success() && transcode.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}

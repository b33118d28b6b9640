use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use thiserror::Error;

use super::source::Frame;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(String),

    #[error("no se pudo mover la conexión de voz: {0}")]
    ChangeChannel(String),

    #[error("el transporte no está emitiendo")]
    NotSpeaking,

    #[error("el transporte se cerró")]
    Closed,
}

/// Abre conexiones de voz por guild.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, TransportError>;
}

/// Conexión de voz activa de una guild.
///
/// Methods take `&self` so the playback task can send while a command task
/// moves the connection to another channel.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Envía un frame. Puede bloquear mientras el buffer del transporte esté lleno.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    async fn set_speaking(&self, speaking: bool);

    async fn change_channel(&self, channel_id: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

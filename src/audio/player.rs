use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    queue::{Advance, GuildQueue, PlaybackState, QueueSnapshot},
    registry::QueueRegistry,
    source::{FrameSource, SourceError},
    transport::{TransportError, VoiceGateway, VoiceLink},
};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("la cola está llena (máximo {max} elementos)")]
    QueueFull { max: usize },

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("la reproducción no pudo arrancar y la cola se vació")]
    StartAborted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// La cola estaba inactiva y se lanzó la reproducción.
    pub started: bool,
}

#[derive(Debug)]
enum ItemOutcome {
    Finished { frames: u64 },
    Cancelled { frames: u64 },
    Failed(SourceError),
    TransportLost(TransportError),
}

/// Controlador de reproducción por guild.
///
/// Leaving `Idle` spawns one task per guild. That task walks the queue with
/// an iterative loop, re-reading `cursor` and `items` under the queue lock
/// after every item, and owns the voice link until the queue drains.
pub struct Player {
    registry: QueueRegistry,
    source: Arc<dyn FrameSource>,
    gateway: Arc<dyn VoiceGateway>,
    max_queue_size: usize,
}

impl Player {
    pub fn new(
        source: Arc<dyn FrameSource>,
        gateway: Arc<dyn VoiceGateway>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            registry: QueueRegistry::new(),
            source,
            gateway,
            max_queue_size,
        }
    }

    /// Agrega ids a la cola de la guild y arranca la reproducción si estaba inactiva.
    ///
    /// The initial transport connect is awaited here so the caller can report
    /// a failure; in that case the queue is reset to idle. Enqueues that land
    /// while that connect is in flight wait for its result, since a failure
    /// drops their items too.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ids: &[String],
    ) -> Result<EnqueueOutcome, PlayerError> {
        let queue = self.registry.get_or_create(guild_id);
        let appended = queue.append(ids, self.max_queue_size)?;

        if !appended.start {
            if appended.pending {
                // El lock es FIFO: quien arranca lo tomó antes que nosotros
                let _session = queue.session().await;
                if queue.link().is_none() {
                    return Err(PlayerError::StartAborted);
                }
            }
            return Ok(EnqueueOutcome { added: appended.added, started: false });
        }

        // Espera a que la sesión anterior termine de desconectarse
        let session = queue.session().await;
        let link = match self.gateway.connect(guild_id, channel_id).await {
            Ok(link) => link,
            Err(e) => {
                warn!("❌ No se pudo conectar al canal de voz en guild {}: {}", guild_id, e);
                queue.reset();
                return Err(e.into());
            }
        };
        queue.attach(link.clone());
        drop(session);

        tokio::spawn(run(queue, link, self.source.clone()));

        Ok(EnqueueOutcome { added: appended.added, started: true })
    }

    /// Salta el elemento en curso. Avanza exactamente una posición.
    pub fn skip(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let queue = self.registry.get(guild_id).ok_or(PlayerError::NothingPlaying)?;

        if queue.request_skip() {
            info!("⏭️ Saltando elemento actual en guild {}", guild_id);
            Ok(())
        } else {
            Err(PlayerError::NothingPlaying)
        }
    }

    /// Mueve la conexión de voz a otro canal sin interrumpir el elemento en curso.
    pub async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayerError> {
        let link = self
            .registry
            .get(guild_id)
            .and_then(|queue| queue.link())
            .ok_or(PlayerError::NothingPlaying)?;

        link.change_channel(channel_id).await?;
        Ok(())
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.registry
            .get(guild_id)
            .map(|queue| queue.snapshot())
            .unwrap_or_default()
    }

    pub fn state(&self, guild_id: GuildId) -> PlaybackState {
        self.registry
            .get(guild_id)
            .map(|queue| queue.state())
            .unwrap_or(PlaybackState::Idle)
    }
}

async fn run(queue: Arc<GuildQueue>, link: Arc<dyn VoiceLink>, source: Arc<dyn FrameSource>) {
    let guild_id = queue.guild_id();
    info!("▶️ Reproducción iniciada en guild {}", guild_id);

    loop {
        let Some((index, media_id, skip)) = queue.begin_item() else {
            warn!("⚠️ Cursor inválido en guild {}, reiniciando cola", guild_id);
            let _session = queue.session().await;
            if let Some(released) = queue.reset() {
                released.disconnect().await;
            }
            break;
        };

        info!("🎵 Reproduciendo {} (posición {}) en guild {}", media_id, index, guild_id);

        match play_item(source.as_ref(), link.as_ref(), &media_id, &skip).await {
            ItemOutcome::Finished { frames } => {
                info!("✅ {} terminó ({} frames)", media_id, frames);
            }
            ItemOutcome::Cancelled { frames } => {
                info!("⏭️ {} saltado tras {} frames", media_id, frames);
            }
            ItemOutcome::Failed(e) => {
                warn!("❌ Falló la fuente de {}: {}", media_id, e);
            }
            ItemOutcome::TransportLost(e) => {
                warn!("❌ Transporte perdido durante {}: {}", media_id, e);
            }
        }

        // Un enqueue que vea la cola inactiva no conecta hasta soltar este guard
        let _session = queue.session().await;
        match queue.advance() {
            Advance::Next(next) => debug!("➡️ Avanzando a la posición {} en guild {}", next, guild_id),
            Advance::Drained(released) => {
                if let Some(released) = released {
                    released.disconnect().await;
                }
                info!("📭 Cola terminada en guild {}", guild_id);
                break;
            }
        }
    }
}

/// Transmite un elemento hasta que se agote, falle o se salte.
///
/// The stream is always shut down (processes killed and reaped) before
/// returning, so the advance rule never runs with live processes.
async fn play_item(
    source: &dyn FrameSource,
    link: &dyn VoiceLink,
    media_id: &str,
    skip: &CancellationToken,
) -> ItemOutcome {
    if skip.is_cancelled() {
        return ItemOutcome::Cancelled { frames: 0 };
    }

    let mut stream = match source.open(media_id).await {
        Ok(stream) => stream,
        Err(e) => return ItemOutcome::Failed(e),
    };

    link.set_speaking(true).await;

    let mut frames = 0u64;
    let outcome = 'stream: loop {
        let next = tokio::select! {
            biased;
            _ = skip.cancelled() => break 'stream ItemOutcome::Cancelled { frames },
            next = stream.next_frame() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => break 'stream ItemOutcome::Failed(e),
            None => break 'stream ItemOutcome::Finished { frames },
        };

        tokio::select! {
            biased;
            _ = skip.cancelled() => break 'stream ItemOutcome::Cancelled { frames },
            sent = link.send(frame) => {
                if let Err(e) = sent {
                    break 'stream ItemOutcome::TransportLost(e);
                }
            }
        }
        frames += 1;
    };

    stream.shutdown().await;
    link.set_speaking(false).await;

    outcome
}

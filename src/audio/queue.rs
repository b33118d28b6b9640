use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{player::PlayerError, transport::VoiceLink};

/// Estado observable del controlador de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(usize),
    Cancelling(usize),
}

/// Copia de la cola para renderizar "sonando / a continuación".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub items: Vec<String>,
    pub cursor: Option<usize>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.cursor.is_none() || self.items.is_empty()
    }

    pub fn now_playing(&self) -> Option<&str> {
        self.cursor
            .and_then(|cursor| self.items.get(cursor))
            .map(String::as_str)
    }

    pub fn up_next(&self) -> &[String] {
        match self.cursor {
            Some(cursor) if cursor < self.items.len() => &self.items[cursor + 1..],
            _ => &[],
        }
    }
}

/// Resultado de agregar elementos a la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub added: usize,
    /// La cola estaba inactiva y quien agregó debe arrancar la reproducción.
    pub start: bool,
    /// Otro enqueue está arrancando la reproducción y aún no hay transporte.
    pub pending: bool,
}

/// Qué hacer tras terminar (o saltar) el elemento actual.
pub enum Advance {
    Next(usize),
    Drained(Option<Arc<dyn VoiceLink>>),
}

struct QueueState {
    items: Vec<String>,
    cursor: Option<usize>,
    link: Option<Arc<dyn VoiceLink>>,
    skip: Option<CancellationToken>,
}

/// Cola de reproducción de una guild.
///
/// `items`, `cursor`, the voice link and the skip token of the current
/// item change together under one lock, which is never held across an
/// `.await`. Queues are reset in place and never dropped from the registry.
///
/// Connecting and releasing the voice link happen under a second, async
/// `session` lock, so a new session never connects while the previous one
/// is still disconnecting.
pub struct GuildQueue {
    guild_id: GuildId,
    state: Mutex<QueueState>,
    session: AsyncMutex<()>,
}

impl GuildQueue {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: Mutex::new(QueueState {
                items: Vec::new(),
                cursor: None,
                link: None,
                skip: None,
            }),
            session: AsyncMutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            items: state.items.clone(),
            cursor: state.cursor,
        }
    }

    pub fn state(&self) -> PlaybackState {
        let state = self.state.lock();
        match (state.cursor, &state.skip) {
            (None, _) => PlaybackState::Idle,
            (Some(index), Some(token)) if token.is_cancelled() => PlaybackState::Cancelling(index),
            (Some(index), _) => PlaybackState::Playing(index),
        }
    }

    /// Exclusión entre conectar, avanzar y liberar el transporte.
    pub async fn session(&self) -> AsyncMutexGuard<'_, ()> {
        self.session.lock().await
    }

    /// Agrega ids al final. Si la cola estaba inactiva pasa a `Playing(0)`.
    pub fn append(&self, ids: &[String], max_size: usize) -> Result<Appended, PlayerError> {
        let mut state = self.state.lock();

        if state.items.len() + ids.len() > max_size {
            return Err(PlayerError::QueueFull { max: max_size });
        }

        state.items.extend_from_slice(ids);
        let start = state.cursor.is_none() && !state.items.is_empty();
        if start {
            state.cursor = Some(0);
            state.skip = Some(CancellationToken::new());
        }
        let pending = !start && state.cursor.is_some() && state.link.is_none();

        info!("➕ {} elemento(s) agregados a la cola de guild {}", ids.len(), self.guild_id);
        Ok(Appended { added: ids.len(), start, pending })
    }

    pub fn attach(&self, link: Arc<dyn VoiceLink>) {
        self.state.lock().link = Some(link);
    }

    pub fn link(&self) -> Option<Arc<dyn VoiceLink>> {
        self.state.lock().link.clone()
    }

    /// Elemento bajo el cursor y su token de salto.
    ///
    /// The token already exists since the cursor moved here, so a skip that
    /// lands before the item opens still cancels it.
    pub fn begin_item(&self) -> Option<(usize, String, CancellationToken)> {
        let mut state = self.state.lock();
        let index = state.cursor?;
        let media_id = state.items.get(index)?.clone();

        let token = state.skip.get_or_insert_with(CancellationToken::new).clone();
        Some((index, media_id, token))
    }

    /// Cancela el elemento en curso. `false` si no hay ninguno.
    pub fn request_skip(&self) -> bool {
        let state = self.state.lock();
        match (&state.cursor, &state.skip) {
            (Some(index), Some(token)) => {
                // Cancelar dos veces el mismo token no avanza dos posiciones
                token.cancel();
                debug!("⏭️ Salto solicitado en guild {} (índice {})", self.guild_id, index);
                true
            }
            _ => false,
        }
    }

    /// Regla de avance: relee `cursor` y `len(items)` bajo el lock.
    ///
    /// Callers hold the `session` guard until a `Drained` link is disconnected.
    pub fn advance(&self) -> Advance {
        let mut state = self.state.lock();

        match state.cursor {
            Some(cursor) if cursor + 1 < state.items.len() => {
                state.cursor = Some(cursor + 1);
                state.skip = Some(CancellationToken::new());
                Advance::Next(cursor + 1)
            }
            _ => {
                state.cursor = None;
                state.skip = None;
                state.items.clear();
                Advance::Drained(state.link.take())
            }
        }
    }

    /// Vuelve a inactivo y devuelve el transporte si había uno.
    pub fn reset(&self) -> Option<Arc<dyn VoiceLink>> {
        let mut state = self.state.lock();
        state.items.clear();
        state.cursor = None;
        state.skip = None;
        state.link.take()
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Un paquete Opus listo para enviarse al transporte de voz (48kHz, estéreo, 20ms).
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({} bytes)", self.0.len())
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no se pudo iniciar {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error de decodificación: {0}")]
    Decode(String),

    #[error("no llegó ningún frame en {}", humantime::format_duration(*.0))]
    StartupTimeout(Duration),
}

/// Produce la secuencia de frames de un elemento de la cola.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Arranca todo lo necesario para producir frames de `media_id`.
    async fn open(&self, media_id: &str) -> Result<Box<dyn FrameStream>, SourceError>;
}

/// Secuencia finita y no reiniciable de frames.
///
/// `next_frame` must be cancel-safe: the controller races it against the
/// skip signal and may drop the future at any await point.
#[async_trait]
pub trait FrameStream: Send {
    /// `None` marks the end of the sequence. After an `Err` the sequence is over.
    async fn next_frame(&mut self) -> Option<Result<Frame, SourceError>>;

    /// Termina y recoge los procesos del stream. Idempotente.
    async fn shutdown(&mut self);
}

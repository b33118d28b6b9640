//! Songbird-backed voice transport.
//!
//! Songbird only passes Opus through untouched when it can read it from a
//! container, so every item gets its own live input that re-frames the
//! incoming packets as a DCA stream (`DCA1` header, JSON metadata, then
//! `i16` length-prefixed Opus frames). The input is fed by a bounded channel:
//! when the driver falls behind, `send` waits.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::TrackHandle,
    Call, Songbird,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
};
use symphonia::core::{io::MediaSource, probe::Hint};
use tracing::{debug, info, warn};

use super::{
    source::Frame,
    transport::{TransportError, VoiceGateway, VoiceLink},
};

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    frame_buffer: usize,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, frame_buffer: usize) -> Self {
        Self {
            manager,
            frame_buffer: frame_buffer.max(1),
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdLink {
            manager: self.manager.clone(),
            call,
            guild_id,
            frame_buffer: self.frame_buffer,
            track: Mutex::new(None),
        }))
    }
}

struct ActiveTrack {
    frames: flume::Sender<Frame>,
    handle: TrackHandle,
}

pub struct SongbirdLink {
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    guild_id: GuildId,
    frame_buffer: usize,
    track: Mutex<Option<ActiveTrack>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let frames = self
            .track
            .lock()
            .as_ref()
            .map(|track| track.frames.clone())
            .ok_or(TransportError::NotSpeaking)?;

        frames.send_async(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn set_speaking(&self, speaking: bool) {
        if !speaking {
            // Cerrar el canal termina la pista cuando el driver vacíe el buffer
            let finished = self.track.lock().take();
            if finished.is_some() {
                debug!("🔇 Fin de emisión en guild {}", self.guild_id);
            }
            return;
        }

        if self.track.lock().is_some() {
            return;
        }

        let (tx, rx) = flume::bounded(self.frame_buffer);
        let handle = {
            let mut call = self.call.lock().await;
            call.enqueue_input(DcaFeed::new(rx).into_input()).await
        };

        debug!("🔈 Emitiendo en guild {}", self.guild_id);
        *self.track.lock() = Some(ActiveTrack { frames: tx, handle });
    }

    async fn change_channel(&self, channel_id: ChannelId) -> Result<(), TransportError> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| TransportError::ChangeChannel(e.to_string()))?;

        info!("🔀 Conexión movida al canal {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) {
        let active = self.track.lock().take();
        if let Some(track) = active {
            let _ = track.handle.stop();
        }
        self.call.lock().await.queue().stop();

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {:?}", self.guild_id, e);
            return;
        }

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }
}

/// Adaptador `Read` que serializa frames Opus como stream DCA.
struct DcaFeed {
    frames: flume::Receiver<Frame>,
    pending: Bytes,
}

impl DcaFeed {
    fn new(frames: flume::Receiver<Frame>) -> Self {
        Self {
            frames,
            pending: dca_header(),
        }
    }

    fn into_input(self) -> Input {
        let mut hint = Hint::new();
        hint.with_extension("dca");

        Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(self) as Box<dyn MediaSource>,
                hint: Some(hint),
            }),
            None,
        )
    }
}

impl Read for DcaFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.frames.recv() {
                Ok(frame) => {
                    if let Some(encoded) = encode_frame(&frame) {
                        self.pending = encoded;
                    }
                }
                // Emisor cerrado: fin de la pista
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Seek for DcaFeed {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "stream en vivo"))
    }
}

impl MediaSource for DcaFeed {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

fn dca_header() -> Bytes {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null
            }
        },
        "opus": {
            "mode": "music",
            "sample_rate": 48000,
            "frame_size": 960,
            "abr": null,
            "vbr": true,
            "channels": 2
        },
        "info": null,
        "origin": null,
        "extra": null
    })
    .to_string();

    let mut header = BytesMut::with_capacity(8 + metadata.len());
    header.put_slice(b"DCA1");
    header.put_i32_le(metadata.len() as i32);
    header.put_slice(metadata.as_bytes());
    header.freeze()
}

fn encode_frame(frame: &Frame) -> Option<Bytes> {
    if frame.is_empty() {
        return None;
    }
    let Ok(len) = i16::try_from(frame.len()) else {
        warn!("⚠️ Frame de {} bytes descartado", frame.len());
        return None;
    };

    let mut encoded = BytesMut::with_capacity(2 + frame.len());
    encoded.put_i16_le(len);
    encoded.put_slice(frame.as_bytes());
    Some(encoded.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_writes_header_then_length_prefixed_frames() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Frame::new(vec![0xFC, 0xFF, 0xFE])).unwrap();
        tx.send(Frame::new(Vec::<u8>::new())).unwrap();
        tx.send(Frame::new(vec![0x01])).unwrap();
        drop(tx);

        let mut out = Vec::new();
        DcaFeed::new(rx).read_to_end(&mut out).unwrap();

        assert_eq!(&out[..4], b"DCA1");
        let json_len = i32::from_le_bytes(out[4..8].try_into().unwrap()) as usize;
        let metadata: serde_json::Value = serde_json::from_slice(&out[8..8 + json_len]).unwrap();
        assert_eq!(metadata["opus"]["sample_rate"], 48000);
        assert_eq!(metadata["opus"]["channels"], 2);

        // El frame vacío se omite
        assert_eq!(&out[8 + json_len..], &[3, 0, 0xFC, 0xFF, 0xFE, 1, 0, 0x01]);
    }

    #[test]
    fn feed_reads_in_small_chunks() {
        let (tx, rx) = flume::bounded(1);
        let mut feed = DcaFeed::new(rx);
        let header_len = feed.pending.len();
        drop(tx);

        let mut buf = [0u8; 3];
        let mut total = 0;
        loop {
            let n = feed.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, header_len);
    }

    #[test]
    fn feed_is_not_seekable() {
        let (_tx, rx) = flume::bounded(1);
        let mut feed = DcaFeed::new(rx);

        assert!(!feed.is_seekable());
        assert!(feed.seek(SeekFrom::Start(0)).is_err());
    }
}

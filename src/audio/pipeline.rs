use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, Read},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use symphonia::{
    core::{
        codecs::CODEC_TYPE_OPUS,
        errors::Error as SymphoniaError,
        formats::{FormatOptions, FormatReader},
        io::{MediaSourceStream, ReadOnlySource},
    },
    default::formats::OggReader,
};
use tokio::{
    process::{Child, Command},
    task::JoinHandle,
};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

use super::source::{Frame, FrameSource, FrameStream, SourceError};
use crate::config::Config;

type FrameResult = Result<Frame, SourceError>;

/// Programa externo con argumentos que admiten `{id}` y `{bitrate}`.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

/// Fuente de frames basada en `yt-dlp | ffmpeg` con demux Ogg/Opus.
///
/// The fetch process writes the media bytes straight into the transcode
/// process; the transcode output is demultiplexed on a blocking thread and
/// handed over through a bounded channel, so a slow consumer stalls the
/// decoder, the pipe and finally both processes.
pub struct PipelineSource {
    fetch: CommandTemplate,
    transcode: CommandTemplate,
    bitrate: String,
    frame_buffer: usize,
    startup_timeout: Duration,
}

impl PipelineSource {
    pub fn new(
        fetch: CommandTemplate,
        transcode: CommandTemplate,
        opus_bitrate: u32,
        frame_buffer: usize,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            fetch,
            transcode,
            bitrate: format!("{}K", opus_bitrate / 1000),
            frame_buffer: frame_buffer.max(1),
            startup_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let fetch = CommandTemplate::new(
            config.fetch_program.clone(),
            [
                "-f",
                "ba",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "-o",
                "-",
                "https://youtube.com/watch?v={id}",
            ],
        );
        let transcode = CommandTemplate::new(
            config.transcode_program.clone(),
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "-",
                "-c:a",
                "libopus",
                "-b:a",
                "{bitrate}",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-f",
                "opus",
                "-",
            ],
        );

        Self::new(
            fetch,
            transcode,
            config.opus_bitrate,
            config.frame_buffer,
            config.startup_timeout,
        )
    }

    /// Lanza ambos procesos y el demuxer. No espera ningún frame.
    pub fn spawn(&self, media_id: &str) -> Result<PipelineStream, SourceError> {
        let vars = [("id", media_id), ("bitrate", self.bitrate.as_str())];

        let mut fetch = Command::new(self.fetch.program())
            .args(self.fetch.render(&vars))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: self.fetch.program().to_string(),
                source,
            })?;

        let Some(fetch_stdout) = fetch.stdout.take() else {
            abandon(fetch);
            return Err(SourceError::Spawn {
                program: self.fetch.program().to_string(),
                source: io::Error::other("stdout no disponible"),
            });
        };
        let converted: Result<Stdio, io::Error> = fetch_stdout.try_into();
        let transcode_stdin = match converted {
            Ok(stdin) => stdin,
            Err(source) => {
                abandon(fetch);
                return Err(SourceError::Spawn {
                    program: self.transcode.program().to_string(),
                    source,
                });
            }
        };

        let spawned = Command::new(self.transcode.program())
            .args(self.transcode.render(&vars))
            .stdin(transcode_stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut transcode = match spawned {
            Ok(child) => child,
            Err(source) => {
                abandon(fetch);
                return Err(SourceError::Spawn {
                    program: self.transcode.program().to_string(),
                    source,
                });
            }
        };

        let Some(transcode_stdout) = transcode.stdout.take() else {
            abandon(fetch);
            abandon(transcode);
            return Err(SourceError::Spawn {
                program: self.transcode.program().to_string(),
                source: io::Error::other("stdout no disponible"),
            });
        };

        let (tx, rx) = flume::bounded(self.frame_buffer);
        let reader = SyncIoBridge::new(transcode_stdout);
        let decoder = tokio::task::spawn_blocking(move || demux(reader, tx));

        info!(
            "🎬 Pipeline iniciado para {}: {} (pid {:?}) | {} (pid {:?})",
            media_id,
            self.fetch.program(),
            fetch.id(),
            self.transcode.program(),
            transcode.id()
        );

        Ok(PipelineStream {
            media_id: media_id.to_string(),
            fetch: Some(fetch),
            transcode: Some(transcode),
            frames: Some(rx),
            decoder: Some(decoder),
            startup_timeout: Some(self.startup_timeout),
            exit_statuses: Vec::new(),
        })
    }
}

#[async_trait]
impl FrameSource for PipelineSource {
    async fn open(&self, media_id: &str) -> Result<Box<dyn FrameStream>, SourceError> {
        Ok(Box::new(self.spawn(media_id)?))
    }
}

/// Procesos y demuxer de un único elemento.
pub struct PipelineStream {
    media_id: String,
    fetch: Option<Child>,
    transcode: Option<Child>,
    frames: Option<flume::Receiver<FrameResult>>,
    decoder: Option<JoinHandle<u64>>,
    // Solo aplica hasta el primer frame
    startup_timeout: Option<Duration>,
    exit_statuses: Vec<(&'static str, ExitStatus)>,
}

impl PipelineStream {
    /// Estados de salida recogidos por `shutdown`.
    #[cfg(test)]
    fn exit_statuses(&self) -> &[(&'static str, ExitStatus)] {
        &self.exit_statuses
    }

    async fn reap(&mut self, role: &'static str, mut child: Child) {
        // Falla si el proceso ya terminó por su cuenta; el wait lo recoge igual
        if let Err(e) = child.start_kill() {
            debug!("{} de {} ya había terminado: {}", role, self.media_id, e);
        }

        match child.wait().await {
            Ok(status) => {
                debug!("🧹 {} de {} recogido: {}", role, self.media_id, status);
                self.exit_statuses.push((role, status));
            }
            Err(e) => warn!("⚠️ No se pudo recoger {} de {}: {}", role, self.media_id, e),
        }
    }
}

#[async_trait]
impl FrameStream for PipelineStream {
    async fn next_frame(&mut self) -> Option<FrameResult> {
        let frames = self.frames.as_ref()?;

        let next = match self.startup_timeout {
            Some(limit) => match tokio::time::timeout(limit, frames.recv_async()).await {
                Ok(next) => next,
                Err(_) => {
                    self.frames = None;
                    return Some(Err(SourceError::StartupTimeout(limit)));
                }
            },
            None => frames.recv_async().await,
        };
        self.startup_timeout = None;

        match next {
            Ok(Ok(frame)) => Some(Ok(frame)),
            Ok(Err(e)) => {
                self.frames = None;
                Some(Err(e))
            }
            Err(_) => {
                self.frames = None;
                None
            }
        }
    }

    async fn shutdown(&mut self) {
        // Sin receptor, un decoder bloqueado en send() termina
        self.frames = None;

        if let Some(child) = self.fetch.take() {
            self.reap("fetch", child).await;
        }
        if let Some(child) = self.transcode.take() {
            self.reap("transcode", child).await;
        }

        if let Some(decoder) = self.decoder.take() {
            match decoder.await {
                Ok(produced) => debug!("📦 Demuxer de {} terminó tras {} frames", self.media_id, produced),
                Err(e) => warn!("⚠️ Demuxer de {} falló: {}", self.media_id, e),
            }
        }
    }
}

fn abandon(mut child: Child) {
    if let Err(e) = child.start_kill() {
        warn!("⚠️ No se pudo terminar proceso huérfano: {}", e);
    }
    // kill_on_drop + el runtime de tokio se encargan de recogerlo
}

/// Lee un contenedor Ogg/Opus y envía un frame por paquete.
///
/// Runs on a blocking thread. Returns the number of frames handed over.
fn demux<R>(reader: R, frames: flume::Sender<FrameResult>) -> u64
where
    R: Read + Send + Sync + 'static,
{
    let stream = MediaSourceStream::new(Box::new(ReadOnlySource::new(reader)), Default::default());

    let mut format = match OggReader::try_new(stream, &FormatOptions::default()) {
        Ok(format) => format,
        Err(e) => {
            let _ = frames.send(Err(SourceError::Decode(e.to_string())));
            return 0;
        }
    };

    let track_id = match format.default_track() {
        Some(track) if track.codec_params.codec == CODEC_TYPE_OPUS => track.id,
        Some(track) => {
            let _ = frames.send(Err(SourceError::Decode(format!(
                "códec inesperado en el contenedor: {:?}",
                track.codec_params.codec
            ))));
            return 0;
        }
        None => {
            let _ = frames.send(Err(SourceError::Decode("contenedor sin pistas".to_string())));
            return 0;
        }
    };

    let mut produced = 0;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                let frame = Frame::new(Bytes::copy_from_slice(packet.buf()));
                if frames.send(Ok(frame)).is_err() {
                    // El consumidor abandonó el stream
                    break;
                }
                produced += 1;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            // Nuevo stream encadenado: lo tratamos como fin
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                let _ = frames.send(Err(SourceError::Decode(e.to_string())));
                break;
            }
        }
    }

    produced
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};

    const SERIAL: u32 = 0x5eed;

    fn ogg_crc(data: &[u8]) -> u32 {
        let mut crc = 0u32;
        for &byte in data {
            crc ^= u32::from(byte) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04c1_1db7 } else { crc << 1 };
            }
        }
        crc
    }

    /// Página Ogg con un segmento por paquete (paquetes < 255 bytes).
    fn ogg_page(flags: u8, granule: u64, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&SERIAL.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(packets.len() as u8);
        for packet in packets {
            assert!(packet.len() < 255);
            page.push(packet.len() as u8);
        }
        for packet in packets {
            page.extend_from_slice(packet);
        }

        let crc = ogg_crc(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }

    /// Paquete Opus de 20ms (TOC 0xFC) marcado con `n`.
    fn opus_packet(n: u8) -> Vec<u8> {
        vec![0xFC, 0xA0, n]
    }

    /// OpusHead + OpusTags y cinco paquetes de audio en dos páginas.
    fn opus_fixture() -> (Vec<u8>, Vec<Vec<u8>>) {
        // versión 1, estéreo, pre-skip 312, 48kHz, ganancia 0, mapeo 0
        let mut head = b"OpusHead".to_vec();
        head.extend_from_slice(&[1, 2]);
        head.extend_from_slice(&312u16.to_le_bytes());
        head.extend_from_slice(&48_000u32.to_le_bytes());
        head.extend_from_slice(&[0, 0, 0]);

        let mut tags = b"OpusTags".to_vec();
        tags.extend_from_slice(&4u32.to_le_bytes());
        tags.extend_from_slice(b"test");
        tags.extend_from_slice(&0u32.to_le_bytes());

        let packets: Vec<Vec<u8>> = (0..5).map(opus_packet).collect();
        let audio: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();

        let mut bytes = ogg_page(0x02, 0, 0, &[head.as_slice()]);
        bytes.extend(ogg_page(0x00, 0, 1, &[tags.as_slice()]));
        bytes.extend(ogg_page(0x00, 960 * 3, 2, &audio[..3]));
        bytes.extend(ogg_page(0x04, 960 * 5, 3, &audio[3..]));

        (bytes, packets)
    }

    /// Lanza `cat <archivo>` | `cat` sobre los bytes dados.
    fn cat_pipeline(bytes: &[u8]) -> (tempfile::NamedTempFile, PipelineStream) {
        let mut file = tempfile::NamedTempFile::new().expect("archivo temporal");
        file.write_all(bytes).expect("escribir fixture");
        file.flush().expect("flush");

        let path = file.path().to_string_lossy().into_owned();
        let source = source(
            CommandTemplate::new("cat", [path]),
            CommandTemplate::new("cat", Vec::<String>::new()),
            Duration::from_secs(5),
        );
        let stream = source.spawn("fixture").expect("spawn");
        (file, stream)
    }

    async fn drain(stream: &mut PipelineStream) -> (Vec<Vec<u8>>, Option<SourceError>) {
        let mut frames = Vec::new();
        let mut error = None;
        while let Some(next) = stream.next_frame().await {
            match next {
                Ok(frame) => frames.push(frame.as_bytes().to_vec()),
                Err(e) => error = Some(e),
            }
        }
        (frames, error)
    }

    /// Entrega los bytes y luego falla como una tubería rota.
    struct BrokenPipe(Cursor<Vec<u8>>);

    impl Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::other("tubería rota")),
                n => Ok(n),
            }
        }
    }

    fn source(fetch: CommandTemplate, transcode: CommandTemplate, timeout: Duration) -> PipelineSource {
        PipelineSource::new(fetch, transcode, 96000, 4, timeout)
    }

    #[test]
    fn renders_placeholders() {
        let template = CommandTemplate::new("yt-dlp", ["-o", "-", "https://youtube.com/watch?v={id}", "{bitrate}"]);
        let args = template.render(&[("id", "dQw4w9WgXcQ"), ("bitrate", "96K")]);

        assert_eq!(args, vec!["-o", "-", "https://youtube.com/watch?v=dQw4w9WgXcQ", "96K"]);
    }

    #[test]
    fn bitrate_is_rendered_in_kbps() {
        let source = source(
            CommandTemplate::new("true", Vec::<String>::new()),
            CommandTemplate::new("cat", Vec::<String>::new()),
            Duration::from_secs(1),
        );
        assert_eq!(source.bitrate, "96K");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_program_is_a_spawn_error() {
        let source = source(
            CommandTemplate::new("definitely-not-a-real-program-7f3a", ["{id}"]),
            CommandTemplate::new("cat", Vec::<String>::new()),
            Duration::from_secs(1),
        );

        let result = source.open("abc").await;
        assert!(matches!(result, Err(SourceError::Spawn { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_container_ends_with_decode_error() {
        let source = source(
            CommandTemplate::new("true", Vec::<String>::new()),
            CommandTemplate::new("cat", Vec::<String>::new()),
            Duration::from_secs(5),
        );

        let mut stream = source.spawn("abc").expect("spawn");
        assert!(matches!(stream.next_frame().await, Some(Err(SourceError::Decode(_)))));
        assert!(stream.next_frame().await.is_none());

        stream.shutdown().await;
        assert_eq!(stream.exit_statuses().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn emits_one_frame_per_opus_packet_in_order() {
        let (bytes, packets) = opus_fixture();
        let (_file, mut stream) = cat_pipeline(&bytes);

        let (frames, error) = drain(&mut stream).await;
        stream.shutdown().await;

        // Sin OpusHead ni OpusTags
        assert_eq!(frames, packets);
        assert!(error.is_none());
        assert_eq!(stream.exit_statuses().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn truncated_output_keeps_complete_pages() {
        let (bytes, packets) = opus_fixture();
        // Corta a mitad de la última página
        let (_file, mut stream) = cat_pipeline(&bytes[..bytes.len() - 4]);

        let (frames, error) = drain(&mut stream).await;
        stream.shutdown().await;

        assert_eq!(frames, packets[..3].to_vec());
        assert!(error.is_none());
    }

    #[test]
    fn decode_error_mid_stream_keeps_earlier_frames() {
        let (bytes, packets) = opus_fixture();
        let (tx, rx) = flume::unbounded();

        let produced = demux(BrokenPipe(Cursor::new(bytes)), tx);
        let results: Vec<FrameResult> = rx.try_iter().collect();

        assert_eq!(produced, 5);
        assert_eq!(results.len(), 6);
        let frames: Vec<Vec<u8>> = results[..5]
            .iter()
            .map(|r| r.as_ref().expect("frame").as_bytes().to_vec())
            .collect();
        assert_eq!(frames, packets);
        assert!(matches!(results[5], Err(SourceError::Decode(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_kills_and_reaps_both_processes() {
        let source = source(
            CommandTemplate::new("sleep", ["30"]),
            CommandTemplate::new("sleep", ["30"]),
            Duration::from_secs(30),
        );
        let mut stream = source.spawn("abc").expect("spawn");

        tokio::time::timeout(Duration::from_secs(5), stream.shutdown())
            .await
            .expect("shutdown no debe colgarse");

        let statuses = stream.exit_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].0, "fetch");
        assert_eq!(statuses[1].0, "transcode");
        assert!(statuses.iter().all(|(_, status)| !status.success()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stalled_pipeline_hits_startup_timeout() {
        let source = source(
            CommandTemplate::new("sleep", ["30"]),
            CommandTemplate::new("sleep", ["30"]),
            Duration::from_millis(100),
        );
        let mut stream = source.spawn("abc").expect("spawn");

        assert!(matches!(
            stream.next_frame().await,
            Some(Err(SourceError::StartupTimeout(_)))
        ));
        assert!(stream.next_frame().await.is_none());

        stream.shutdown().await;
    }
}

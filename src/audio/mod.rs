//! # Audio Module
//!
//! Reproducción por guild: colas, controlador y tubería de frames Opus.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Controller
//! - One task per active guild, started when the queue leaves idle
//! - Iterative advance loop; skip is a per-item cancellation token
//!
//! ### [`queue`] / [`registry`] - Queue Management
//! - `items`, `cursor` and the voice link guarded by a single lock per guild
//! - Guild queues created on first use and reset in place
//!
//! ### [`pipeline`] - Frame Source
//! - `yt-dlp | ffmpeg` producing Ogg/Opus, demuxed with symphonia
//! - Bounded channel between the demuxer and the controller
//!
//! ### [`voice`] - Transport
//! - Songbird call per guild, Opus passthrough via a DCA live input
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo
//! - **Frame Size**: 20ms (960 samples)
//! - **Codec**: Opus, forwarded without re-encoding

pub mod pipeline;
pub mod player;
pub mod queue;
pub mod registry;
pub mod source;
pub mod transport;
pub mod voice;

//! Frame synchronization for compressed audio elementary streams.
//!
//! ## Technical Overview
//!
//! Broadcast receivers hand over audio as arbitrarily sized chunks, each
//! tagged with the 90 kHz presentation timestamp of the PES packet it came
//! from. Chunk boundaries have nothing to do with frame boundaries, the
//! stream may start mid-frame, and transmission errors leave garbage between
//! frames. This crate finds the frames again.
//!
//! ### Supported Formats
//!
//! - MPEG-1/2/2.5 audio, layers I, II and III
//! - AC-3 and E-AC-3
//! - AAC in ADTS framing
//! - AAC in LOAS/LATM framing
//! - DTS core
//!
//! ### Timestamps
//!
//! Every appended chunk keeps its PTS next to its byte count. A frame that
//! starts where a chunk started reports that chunk's PTS; a frame that starts
//! inside a chunk reports none.
//!
//! ## Quick Start
//!
//! 1. Unpack PES packets with [`structs::pes::PesReader`] (skip this for raw
//!    elementary streams)
//! 2. Append payloads to a [`process::extract::Extractor`]
//! 3. Take the current frame and discard it once consumed
//!
//! ```rust,no_run
//! use esframe::process::extract::Extractor;
//! use esframe::structs::pes::PesReader;
//!
//! let mut extractor = Extractor::default();
//! let mut reader = PesReader::default();
//!
//! reader.push_bytes(&std::fs::read("audio.pes")?);
//!
//! for payload in reader.by_ref() {
//!     let payload = payload?;
//!     if !extractor.append(&payload.data, payload.pts) {
//!         eprintln!("Buffer full, dropping {} bytes", payload.data.len());
//!         continue;
//!     }
//!
//!     while let Some(frame) = extractor.current_frame() {
//!         println!(
//!             "{} at {:?}: {} bytes",
//!             frame.info.format,
//!             frame.pts,
//!             frame.data.len()
//!         );
//!         let consumed = frame.data.len();
//!         extractor.shrink(consumed, false);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Producer and consumer threads share a [`process::shared::SharedExtractor`];
//! [`process::decode::DecodeLoop`] drives a decoder or pass-through output
//! from it.

/// Buffering, synchronization and the consumer loop.
///
/// 1. **Frame Buffer** ([`process::buffer`]): Byte storage with per-chunk
///    timestamps and a zeroed tail
/// 2. **Synchronization** ([`process::extract`]): Locates the current frame
/// 3. **Sharing** ([`process::shared`]): One lock over buffer and state
/// 4. **Decode Loop** ([`process::decode`]): Feeds decoder or render
pub mod process;

/// Header layouts of the supported formats and PES packets.
///
/// - **Dispatch** ([`structs::codec`]): Sync word priority and full checks
/// - **MPEG Audio** ([`structs::mpeg`])
/// - **AC-3 / E-AC-3** ([`structs::ac3`])
/// - **ADTS** ([`structs::adts`])
/// - **LATM** ([`structs::latm`])
/// - **DTS** ([`structs::dts`])
/// - **PES** ([`structs::pes`]): Packet unpacking
pub mod structs;

/// Supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Header field reading
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): 90 kHz timestamp arithmetic
/// - **Buffer Management** ([`utils::buffer_pool`]): Frame copy reuse
pub mod utils;

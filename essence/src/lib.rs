//! Raw essence resolution, track mapping and synchronized multiplexing.
//!
//! ## Technical Overview
//!
//! Raw essence files carry no container: a DV file is a run of DIF frames, an
//! AVC file a run of NAL units, a PCM file interleaved samples. Wrapping them
//! into a clip needs three things the file itself does not state:
//!
//! - **What it is**: the exact essence type, found by probing the first
//!   access unit with a codec-specific header parser.
//! - **Where it goes**: which output track and channel each input channel
//!   feeds, given an optional sound channel routing expression.
//! - **When it is written**: a frame-synchronous loop that reads one edit
//!   unit from every input (following the sound sample cadence), finds the
//!   shortest input and writes exactly that much to every output.
//!
//! The container itself is written by a [`process::writer::ClipWriter`]
//! implementation supplied by the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use essence::process::input::{EssenceSource, InputKind, RawInput};
//! use essence::process::wrap::{WrapJob, WrapOptions};
//! # fn writer() -> Box<dyn essence::process::writer::ClipWriter> { unimplemented!() }
//!
//! let inputs = vec![
//!     RawInput::new(InputKind::Group(essence::structs::essence_type::EssenceTypeGroup::Dv),
//!                   EssenceSource::file("video.dv", 0)),
//!     RawInput::new("wave".parse::<InputKind>()?, EssenceSource::file("audio.wav", 0)),
//! ];
//!
//! let mut job = WrapJob::new(inputs, WrapOptions::default())?;
//! job.resolve()?;
//!
//! let mut clip = writer();
//! let outcome = job.run(clip.as_mut(), None)?;
//! println!("{outcome:?}");
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Input handling, mapping and the multiplex loop.
///
/// 1. **Inputs** ([`process::input`], [`process::reader`], [`process::wave`]):
///    byte sources split into samples.
/// 2. **Resolution** ([`process::resolve`]): essence type probing.
/// 3. **Mapping** ([`process::track_map`], [`process::graph`]): output tracks
///    and their channel bindings.
/// 4. **Multiplexing** ([`process::mux`], [`process::wrap`]): the run loop and
///    its driver.
pub mod process;

/// Essence types and bitstream probe parsers.
///
/// - **Essence types** ([`structs::essence_type`]): the closed set of wrappable types
/// - **Rationals** ([`structs::rational`]): frame, sampling and aspect rates
/// - **Probe parsers**: [`structs::dv`], [`structs::mpeg2`], [`structs::avc`],
///   [`structs::vc3`], [`structs::vc2`], [`structs::rdd36`]
/// - **AVC-Intra headers** ([`structs::avci_header`])
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;

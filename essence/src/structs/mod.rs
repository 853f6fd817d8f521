//! Essence type model and per-codec bitstream probe parsers.
//!
//! Each probe parser inspects only the headers of one access unit. It never
//! decodes picture content. Parsers also locate access unit boundaries so
//! that a raw reader can split a header-less stream into samples.

use anyhow::Result;

pub mod avc;
pub mod avci_header;
pub mod dv;
pub mod essence_type;
pub mod mpeg2;
pub mod rational;
pub mod rdd36;
pub mod vc2;
pub mod vc3;

/// Result of looking for the end of the access unit at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    /// The unit is exactly this many bytes. It may extend past the buffer.
    Known(usize),
    /// No boundary found yet. At end of stream the rest of the data is the unit.
    Unknown,
    /// The buffer does not start with an access unit.
    Invalid,
}

pub trait EssenceParser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize;

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()>;
}

/// Offsets of every `00 00 01` start code prefix in `data`.
pub(crate) fn start_codes(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
    data.windows(3)
        .enumerate()
        .filter(|(_, w)| w[0] == 0 && w[1] == 0 && w[2] == 1)
        .map(|(i, _)| i)
}

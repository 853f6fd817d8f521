//! VC-3 (SMPTE ST 2019-1) frame header probing.

use anyhow::{Result, bail};

use crate::structs::essence_type::{EssenceType, Vc3Variant};
use crate::structs::{EssenceParser, FrameSize};
use crate::utils::errors::{ProbeError, ResolveError};

/// Bytes of frame header needed to read the compression id.
pub const VC3_HEADER_SIZE: usize = 0x280;

const HEADER_PREFIX: [u8; 4] = [0x00, 0x00, 0x02, 0x80];

#[derive(Debug, Default)]
pub struct Vc3Parser {
    pub compression_id: u32,
    pub active_lines: u16,
    pub samples_per_line: u16,
}

impl Vc3Parser {
    fn has_prefix(data: &[u8]) -> bool {
        data.len() >= 5 && data[..4] == HEADER_PREFIX && (1..=3).contains(&data[4])
    }

    pub fn compression_id(&self) -> u32 {
        self.compression_id
    }

    pub fn essence_type(&self) -> Result<EssenceType> {
        match Vc3Variant::from_compression_id(self.compression_id) {
            Some(variant) => Ok(EssenceType::Vc3(variant)),
            None => bail!(ResolveError::UnknownVc3CompressionId(self.compression_id)),
        }
    }
}

impl EssenceParser for Vc3Parser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        if data.len() < 0x2c {
            return FrameSize::Unknown;
        }
        if self.parse_frame_info(data).is_err() {
            return FrameSize::Invalid;
        }
        match Vc3Variant::from_compression_id(self.compression_id) {
            Some(variant) => FrameSize::Known(variant.frame_size() as usize),
            None => FrameSize::Invalid,
        }
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        if !Self::has_prefix(data) {
            bail!(ProbeError::InvalidVc3Prefix);
        }
        if data.len() < 0x2c {
            bail!(ProbeError::Truncated("VC-3"));
        }

        self.active_lines = u16::from_be_bytes([data[0x18], data[0x19]]);
        self.samples_per_line = u16::from_be_bytes([data[0x1a], data[0x1b]]);
        self.compression_id = u32::from_be_bytes([data[0x28], data[0x29], data[0x2a], data[0x2b]]);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn synth_vc3_header(compression_id: u32) -> Vec<u8> {
    let mut header = vec![0u8; VC3_HEADER_SIZE];
    header[..5].copy_from_slice(&[0x00, 0x00, 0x02, 0x80, 0x01]);
    header[0x18..0x1a].copy_from_slice(&1080u16.to_be_bytes());
    header[0x1a..0x1c].copy_from_slice(&1920u16.to_be_bytes());
    header[0x28..0x2c].copy_from_slice(&compression_id.to_be_bytes());
    header
}

#[test]
fn test_vc3_probe() {
    let mut parser = Vc3Parser::default();
    let header = synth_vc3_header(1242);
    assert_eq!(parser.parse_frame_size(&header), FrameSize::Known(606_208));
    assert_eq!(
        parser.essence_type().unwrap(),
        EssenceType::Vc3(Vc3Variant::Id1242)
    );
    assert_eq!(parser.active_lines, 1080);

    let header = synth_vc3_header(9999);
    parser.parse_frame_info(&header).unwrap();
    assert_eq!(parser.compression_id(), 9999);
    assert!(parser.essence_type().is_err());
    assert_eq!(parser.parse_frame_size(&header), FrameSize::Invalid);
}

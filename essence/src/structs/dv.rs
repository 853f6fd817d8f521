//! DV DIF frame probing (IEC 61834, SMPTE 314M and SMPTE 370M).
//!
//! A frame is a run of 80-byte DIF blocks grouped in DIF sequences of 150
//! blocks. The first sequence carries the header block and three VAUX
//! blocks whose source (0x60) and source control (0x61) packs identify the
//! format and display aspect ratio.

use anyhow::{Result, bail};

use crate::structs::essence_type::{DvVariant, EssenceType};
use crate::structs::rational::{
    ASPECT_RATIO_4_3, ASPECT_RATIO_16_9, FRAME_RATE_25, FRAME_RATE_50, FRAME_RATE_2997,
    FRAME_RATE_5994, Rational,
};
use crate::structs::{EssenceParser, FrameSize};
use crate::utils::errors::{ProbeError, ResolveError};

const DIF_BLOCK_SIZE: usize = 80;
const DIF_SEQUENCE_SIZE: usize = 150 * DIF_BLOCK_SIZE;
const VAUX_BLOCKS: std::ops::Range<usize> = 3..6;

/// Bytes needed to identify a DV frame: the header and VAUX blocks.
pub const DV_HEADER_SIZE: usize = VAUX_BLOCKS.end * DIF_BLOCK_SIZE;
const PACK_SIZE: usize = 5;

const PACK_VS: u8 = 0x60;
const PACK_VSC: u8 = 0x61;

#[derive(Debug, Default)]
pub struct DvParser {
    is_50hz: bool,
    apt: u8,
    stype: Option<u8>,
    display_mode: Option<u8>,
}

impl DvParser {
    fn parse_header(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < VAUX_BLOCKS.end * DIF_BLOCK_SIZE {
            bail!(ProbeError::Truncated("DV"));
        }
        // header block: SCT = 0, DSEQ = 0, DBN = 0
        if data[0] >> 5 != 0 {
            bail!(ProbeError::InvalidDifHeader);
        }

        self.is_50hz = data[3] & 0x80 != 0;
        self.apt = data[4] & 0x07;
        self.stype = None;
        self.display_mode = None;

        for block in VAUX_BLOCKS {
            let start = block * DIF_BLOCK_SIZE + 3;
            let packs = &data[start..start + 15 * PACK_SIZE];
            for pack in packs.chunks_exact(PACK_SIZE) {
                match pack[0] {
                    PACK_VS if self.stype.is_none() => {
                        self.stype = Some(pack[3] & 0x1f);
                        self.is_50hz = pack[3] & 0x20 != 0;
                    }
                    PACK_VSC if self.display_mode.is_none() => {
                        self.display_mode = Some(pack[2] & 0x07);
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    pub fn is_50hz(&self) -> bool {
        self.is_50hz
    }

    pub fn essence_type(&self) -> Result<EssenceType> {
        let stype = self.stype.unwrap_or(0);
        let variant = match stype {
            0x00 if self.apt == 0 => DvVariant::Iec25,
            0x00 => DvVariant::DvBased25,
            0x04 => DvVariant::Dv50,
            0x14 | 0x15 => DvVariant::Dv100_1080i,
            0x18 => DvVariant::Dv100_720p,
            _ => bail!(ResolveError::UnknownDv {
                stype,
                apt: self.apt
            }),
        };
        Ok(EssenceType::Dv(variant))
    }

    pub fn frame_rate(&self) -> Rational {
        let is_720p = self.stype == Some(0x18);
        match (self.is_50hz, is_720p) {
            (true, false) => FRAME_RATE_25,
            (true, true) => FRAME_RATE_50,
            (false, false) => FRAME_RATE_2997,
            (false, true) => FRAME_RATE_5994,
        }
    }

    pub fn aspect_ratio(&self) -> Option<Rational> {
        match self.display_mode? {
            0 => Some(ASPECT_RATIO_4_3),
            2 => Some(ASPECT_RATIO_16_9),
            _ => None,
        }
    }

    pub fn frame_size(&self) -> Option<usize> {
        let sequences = if self.is_50hz { 12 } else { 10 };
        let channels = match self.stype? {
            0x00 => 1,
            0x04 | 0x18 => 2,
            0x14 | 0x15 => 4,
            _ => return None,
        };
        Some(channels * sequences * DIF_SEQUENCE_SIZE)
    }
}

impl EssenceParser for DvParser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        if data.len() < VAUX_BLOCKS.end * DIF_BLOCK_SIZE {
            return FrameSize::Unknown;
        }
        if self.parse_header(data).is_err() {
            return FrameSize::Invalid;
        }
        match self.frame_size() {
            Some(size) => FrameSize::Known(size),
            None => FrameSize::Invalid,
        }
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        self.parse_header(data)
    }
}

#[cfg(test)]
pub(crate) fn synth_dv_frame(stype: u8, is_50hz: bool, apt: u8, display_mode: u8) -> Vec<u8> {
    let mut parser = DvParser {
        is_50hz,
        apt,
        stype: Some(stype),
        display_mode: None,
    };
    let size = parser.frame_size().unwrap_or(DIF_SEQUENCE_SIZE);
    parser.stype = None;

    let mut frame = vec![0xffu8; size];
    frame[0] = 0x1f;
    frame[1] = 0x07;
    frame[2] = 0x00;
    frame[3] = if is_50hz { 0xbf } else { 0x3f };
    frame[4] = 0xf8 | apt;

    let vaux = 3 * DIF_BLOCK_SIZE + 3;
    let sys = if is_50hz { 0x20 } else { 0x00 };
    frame[vaux..vaux + PACK_SIZE].copy_from_slice(&[PACK_VS, 0xff, 0xff, sys | stype, 0xff]);
    frame[vaux + PACK_SIZE..vaux + 2 * PACK_SIZE]
        .copy_from_slice(&[PACK_VSC, 0xff, 0xc8 | display_mode, 0xff, 0xff]);
    frame
}

#[test]
fn test_dv_probe() {
    let frame = synth_dv_frame(0x04, true, 1, 2);
    let mut parser = DvParser::default();
    assert_eq!(parser.parse_frame_size(&frame), FrameSize::Known(288_000));
    parser.parse_frame_info(&frame).unwrap();
    assert_eq!(
        parser.essence_type().unwrap(),
        EssenceType::Dv(DvVariant::Dv50)
    );
    assert_eq!(parser.frame_rate(), FRAME_RATE_25);
    assert_eq!(parser.aspect_ratio(), Some(ASPECT_RATIO_16_9));

    let frame = synth_dv_frame(0x00, false, 0, 0);
    parser.parse_frame_info(&frame).unwrap();
    assert_eq!(
        parser.essence_type().unwrap(),
        EssenceType::Dv(DvVariant::Iec25)
    );
    assert_eq!(parser.frame_rate(), FRAME_RATE_2997);
    assert_eq!(parser.frame_size(), Some(120_000));

    let frame = synth_dv_frame(0x1e, true, 0, 0);
    parser.parse_frame_info(&frame).unwrap();
    assert!(parser.essence_type().is_err());
}

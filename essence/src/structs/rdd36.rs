//! SMPTE RDD 36 (Apple ProRes) frame header probing.

use anyhow::{Result, bail};

use crate::structs::rational::{ASPECT_RATIO_4_3, ASPECT_RATIO_16_9, Rational};
use crate::structs::{EssenceParser, FrameSize};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ProbeError;

pub const FRAME_IDENTIFIER: u32 = 0x6963_7066; // "icpf"

const FRAME_RATES: [Rational; 11] = [
    Rational::new(0, 0),
    Rational::new(24000, 1001),
    Rational::new(24, 1),
    Rational::new(25, 1),
    Rational::new(30000, 1001),
    Rational::new(30, 1),
    Rational::new(50, 1),
    Rational::new(60000, 1001),
    Rational::new(60, 1),
    Rational::new(100, 1),
    Rational::new(120, 1),
];

#[derive(Debug, Default, Clone)]
pub struct Rdd36Parser {
    pub frame_size: u32,
    pub frame_header_size: u16,
    pub bitstream_version: u8,
    pub encoder_identifier: [u8; 4],
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub chroma_format: u8,
    pub interlace_mode: u8,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    pub color_primaries: u8,
    pub transfer_characteristic: u8,
    pub matrix_coefficients: u8,
    pub alpha_channel_type: u8,
}

impl Rdd36Parser {
    pub fn have_frame_rate(&self) -> bool {
        self.frame_rate().is_some()
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        FRAME_RATES
            .get(self.frame_rate_code as usize)
            .copied()
            .filter(|rate| !rate.is_zero())
    }

    pub fn aspect_ratio(&self) -> Option<Rational> {
        match self.aspect_ratio_information {
            1 if self.vertical_size > 0 => Some(
                Rational::new(self.horizontal_size as i32, self.vertical_size as i32).reduced(),
            ),
            2 => Some(ASPECT_RATIO_4_3),
            3 => Some(ASPECT_RATIO_16_9),
            _ => None,
        }
    }

    pub fn is_444(&self) -> bool {
        self.chroma_format == 3
    }

    pub fn is_interlaced(&self) -> bool {
        self.interlace_mode != 0
    }
}

impl EssenceParser for Rdd36Parser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        if data.len() < 8 {
            return FrameSize::Unknown;
        }
        let identifier = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let frame_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if identifier != FRAME_IDENTIFIER || frame_size < 8 {
            return FrameSize::Invalid;
        }
        FrameSize::Known(frame_size)
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < 28 {
            bail!(ProbeError::Truncated("RDD-36"));
        }
        let reader = &mut BsIoSliceReader::from_slice(data);
        self.frame_size = reader.get_n(32)?;
        let identifier: u32 = reader.get_n(32)?;
        if identifier != FRAME_IDENTIFIER {
            bail!(ProbeError::InvalidRdd36Identifier(identifier));
        }

        self.frame_header_size = reader.get_n(16)?;
        reader.skip_n(8)?; // reserved
        self.bitstream_version = reader.get_n(8)?;
        for byte in self.encoder_identifier.iter_mut() {
            *byte = reader.get_n(8)?;
        }
        self.horizontal_size = reader.get_n(16)?;
        self.vertical_size = reader.get_n(16)?;
        self.chroma_format = reader.get_n(2)?;
        reader.skip_n(2)?;
        self.interlace_mode = reader.get_n(2)?;
        reader.skip_n(2)?;
        self.aspect_ratio_information = reader.get_n(4)?;
        self.frame_rate_code = reader.get_n(4)?;
        self.color_primaries = reader.get_n(8)?;
        self.transfer_characteristic = reader.get_n(8)?;
        self.matrix_coefficients = reader.get_n(8)?;
        reader.skip_n(4)?;
        self.alpha_channel_type = reader.get_n(4)?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn synth_rdd36_frame(frame_rate_code: u8, payload: usize) -> Vec<u8> {
    let frame_size = (28 + payload) as u32;
    let mut frame = frame_size.to_be_bytes().to_vec();
    frame.extend(b"icpf");
    frame.extend(20u16.to_be_bytes());
    frame.extend([0, 0]);
    frame.extend(b"essm");
    frame.extend(1920u16.to_be_bytes());
    frame.extend(1080u16.to_be_bytes());
    frame.push(0b1000_0100); // 4:2:2, top field first
    frame.push(0x30 | frame_rate_code); // 16:9
    frame.extend([1, 1, 1, 0]);
    frame.resize(frame_size as usize, 0x11);
    frame
}

#[test]
fn test_rdd36_probe() {
    let frame = synth_rdd36_frame(9, 100);
    let mut parser = Rdd36Parser::default();
    assert_eq!(parser.parse_frame_size(&frame), FrameSize::Known(128));
    parser.parse_frame_info(&frame).unwrap();
    assert_eq!(parser.frame_rate(), Some(Rational::new(100, 1)));
    assert_eq!(parser.aspect_ratio(), Some(ASPECT_RATIO_16_9));
    assert_eq!((parser.horizontal_size, parser.vertical_size), (1920, 1080));
    assert!(parser.is_interlaced());
    assert!(!parser.is_444());

    assert_eq!(parser.parse_frame_size(b"\0\0\0\x20abcd"), FrameSize::Invalid);
}

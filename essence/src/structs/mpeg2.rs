//! MPEG-2 video (ISO/IEC 13818-2) elementary stream probing for D10 and
//! Long GOP essence.

use anyhow::{Result, bail};

use crate::structs::essence_type::{D10Variant, EssenceType, Mpeg2LgVariant};
use crate::structs::rational::{ASPECT_RATIO_4_3, ASPECT_RATIO_16_9, Rational};
use crate::structs::{EssenceParser, FrameSize, start_codes};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{ProbeError, ResolveError};

pub const PICTURE_START_CODE: u8 = 0x00;
pub const SEQUENCE_HEADER_CODE: u8 = 0xb3;
pub const EXTENSION_START_CODE: u8 = 0xb5;
pub const SEQUENCE_END_CODE: u8 = 0xb7;
pub const GROUP_START_CODE: u8 = 0xb8;

const SEQUENCE_EXTENSION_ID: u8 = 1;

const FRAME_RATES: [Rational; 9] = [
    Rational::new(0, 0),
    Rational::new(24000, 1001),
    Rational::new(24, 1),
    Rational::new(25, 1),
    Rational::new(30000, 1001),
    Rational::new(30, 1),
    Rational::new(50, 1),
    Rational::new(60000, 1001),
    Rational::new(60, 1),
];

#[derive(Debug, Default, Clone)]
pub struct Mpeg2Parser {
    pub horizontal_size: u32,
    pub vertical_size: u32,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    pub bit_rate_value: u32,
    pub profile_and_level: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    frame_rate_extension_n: u8,
    frame_rate_extension_d: u8,
    have_sequence_header: bool,
    have_sequence_extension: bool,
}

impl Mpeg2Parser {
    fn read_sequence_header(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        self.horizontal_size = reader.get_n(12)?;
        self.vertical_size = reader.get_n(12)?;
        self.aspect_ratio_information = reader.get_n(4)?;
        self.frame_rate_code = reader.get_n(4)?;
        self.bit_rate_value = reader.get_n(18)?;
        self.have_sequence_header = true;
        Ok(())
    }

    fn read_sequence_extension(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        let extension_id: u8 = reader.get_n(4)?;
        if extension_id != SEQUENCE_EXTENSION_ID {
            return Ok(());
        }

        self.profile_and_level = reader.get_n(8)?;
        self.progressive_sequence = reader.get()?;
        self.chroma_format = reader.get_n(2)?;
        let horizontal_size_extension: u32 = reader.get_n(2)?;
        let vertical_size_extension: u32 = reader.get_n(2)?;
        let bit_rate_extension: u32 = reader.get_n(12)?;
        reader.skip_n(1)?; // marker_bit
        reader.skip_n(8)?; // vbv_buffer_size_extension
        reader.skip_n(1)?; // low_delay
        self.frame_rate_extension_n = reader.get_n(2)?;
        self.frame_rate_extension_d = reader.get_n(2)?;

        self.horizontal_size |= horizontal_size_extension << 12;
        self.vertical_size |= vertical_size_extension << 12;
        self.bit_rate_value |= bit_rate_extension << 18;
        self.have_sequence_extension = true;
        Ok(())
    }

    pub fn have_frame_rate(&self) -> bool {
        self.have_sequence_header && (1..FRAME_RATES.len()).contains(&(self.frame_rate_code as usize))
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        if !self.have_frame_rate() {
            return None;
        }
        let base = FRAME_RATES[self.frame_rate_code as usize];
        let num = base.num * (self.frame_rate_extension_n as i32 + 1);
        let den = base.den * (self.frame_rate_extension_d as i32 + 1);
        Some(Rational::new(num, den).reduced())
    }

    pub fn aspect_ratio(&self) -> Option<Rational> {
        match self.aspect_ratio_information {
            2 => Some(ASPECT_RATIO_4_3),
            3 => Some(ASPECT_RATIO_16_9),
            _ => None,
        }
    }

    /// Bit rate in units of 400 bit/s.
    pub fn bit_rate(&self) -> u32 {
        self.bit_rate_value
    }

    pub fn d10_essence_type(&self) -> Result<EssenceType> {
        let variant = match self.bit_rate_value {
            75_000 => D10Variant::Mbps30,
            100_000 => D10Variant::Mbps40,
            125_000 => D10Variant::Mbps50,
            rate => bail!(ResolveError::UnknownD10BitRate(rate)),
        };
        Ok(EssenceType::D10(variant))
    }

    pub fn long_gop_essence_type(&self) -> Result<EssenceType> {
        use Mpeg2LgVariant::*;

        let variant = match (
            self.progressive_sequence,
            self.vertical_size,
            self.horizontal_size,
            self.profile_and_level,
        ) {
            (true, 1080, 1920, 0x82) => Some(P422Hl1080p),
            (true, 1080, 1920, 0x44) => Some(MpHl1920_1080p),
            (true, 1080, 1440, 0x44) => Some(MpHl1440_1080p),
            (true, 1080, 1440, 0x46) => Some(MpH14_1080p),
            (true, 720, 1280, 0x82) => Some(P422Hl720p),
            (true, 720, 1280, 0x44) => Some(MpHl720p),
            (false, 1080, 1920, 0x82) => Some(P422Hl1080i),
            (false, 1080, 1920, 0x44) => Some(MpHl1920_1080i),
            (false, 1080, 1440, 0x44) => Some(MpHl1440_1080i),
            (false, 1080, 1440, 0x46) => Some(MpH14_1080i),
            _ => None,
        };

        match variant {
            Some(v) => Ok(EssenceType::Mpeg2Lg(v)),
            None => bail!(ResolveError::UnknownMpeg2Lg {
                width: self.horizontal_size,
                height: self.vertical_size,
                scan: if self.progressive_sequence {
                    "progressive"
                } else {
                    "interlaced"
                },
                profile_level: self.profile_and_level,
            }),
        }
    }
}

impl EssenceParser for Mpeg2Parser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        if data.len() < 4 {
            return FrameSize::Unknown;
        }
        if data[..3] != [0, 0, 1] {
            return FrameSize::Invalid;
        }

        let mut seen_picture = false;
        for offset in start_codes(data) {
            let Some(&code) = data.get(offset + 3) else {
                break;
            };
            match code {
                PICTURE_START_CODE if seen_picture => return FrameSize::Known(offset),
                PICTURE_START_CODE => seen_picture = true,
                SEQUENCE_HEADER_CODE | GROUP_START_CODE if seen_picture => {
                    return FrameSize::Known(offset);
                }
                SEQUENCE_END_CODE if seen_picture => return FrameSize::Known(offset + 4),
                _ => {}
            }
        }

        FrameSize::Unknown
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        self.have_sequence_header = false;
        self.have_sequence_extension = false;

        for offset in start_codes(data) {
            let payload = &data[(offset + 3).min(data.len())..];
            let Some((&code, rest)) = payload.split_first() else {
                break;
            };
            let reader = &mut BsIoSliceReader::from_slice(rest);
            match code {
                SEQUENCE_HEADER_CODE => self.read_sequence_header(reader)?,
                EXTENSION_START_CODE if self.have_sequence_header => {
                    self.read_sequence_extension(reader)?
                }
                PICTURE_START_CODE => break,
                _ => {}
            }
        }

        if !self.have_sequence_header {
            bail!(ProbeError::MissingSequenceHeader);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn synth_mpeg2_frame(
    width: u32,
    height: u32,
    progressive: bool,
    profile_and_level: u8,
    bit_rate_value: u32,
    frame_rate_code: u8,
) -> Vec<u8> {
    use crate::utils::bitstream_io::BsIoVecWriter;

    let mut seq = BsIoVecWriter::default();
    seq.put_n::<u32>(12, width & 0xfff).unwrap();
    seq.put_n::<u32>(12, height & 0xfff).unwrap();
    seq.put_n::<u8>(4, 3).unwrap();
    seq.put_n::<u8>(4, frame_rate_code).unwrap();
    seq.put_n::<u32>(18, bit_rate_value & 0x3ffff).unwrap();
    seq.put(true).unwrap();
    seq.put_n::<u32>(10, 0).unwrap();
    seq.put_n::<u8>(3, 0).unwrap();

    let mut ext = BsIoVecWriter::default();
    ext.put_n::<u8>(4, SEQUENCE_EXTENSION_ID).unwrap();
    ext.put_n::<u8>(8, profile_and_level).unwrap();
    ext.put(progressive).unwrap();
    ext.put_n::<u8>(2, 2).unwrap();
    ext.put_n::<u8>(2, 0).unwrap();
    ext.put_n::<u8>(2, 0).unwrap();
    ext.put_n::<u32>(12, bit_rate_value >> 18).unwrap();
    ext.put(true).unwrap();
    ext.put_n::<u8>(8, 0).unwrap();
    ext.put(false).unwrap();
    ext.put_n::<u8>(4, 0).unwrap();
    ext.put_n::<u8>(3, 0).unwrap();

    let mut frame = vec![0, 0, 1, SEQUENCE_HEADER_CODE];
    frame.extend(seq.into_bytes().unwrap());
    frame.extend([0, 0, 1, EXTENSION_START_CODE]);
    frame.extend(ext.into_bytes().unwrap());
    frame.extend([0, 0, 1, GROUP_START_CODE, 0x00, 0x08, 0x00, 0x00]);
    frame.extend([0, 0, 1, PICTURE_START_CODE, 0x00, 0x0f, 0xff, 0xf8]);
    frame.extend([0, 0, 1, 0x01, 0x12, 0x34, 0x56, 0x78, 0x9a]);
    frame
}

#[test]
fn test_mpeg2_probe() {
    let frame = synth_mpeg2_frame(1920, 1080, false, 0x82, 125_000, 3);
    let mut stream = frame.clone();
    stream.extend(&frame);

    let mut parser = Mpeg2Parser::default();
    assert_eq!(parser.parse_frame_size(&stream), FrameSize::Known(frame.len()));
    assert_eq!(parser.parse_frame_size(&frame), FrameSize::Unknown);
    assert_eq!(parser.parse_frame_size(&[0x47, 0, 0, 0]), FrameSize::Invalid);

    parser.parse_frame_info(&frame).unwrap();
    assert_eq!(parser.horizontal_size, 1920);
    assert_eq!(parser.vertical_size, 1080);
    assert_eq!(parser.frame_rate(), Some(Rational::new(25, 1)));
    assert_eq!(parser.aspect_ratio(), Some(ASPECT_RATIO_16_9));
    assert_eq!(
        parser.long_gop_essence_type().unwrap(),
        EssenceType::Mpeg2Lg(Mpeg2LgVariant::P422Hl1080i)
    );
    assert_eq!(
        parser.d10_essence_type().unwrap(),
        EssenceType::D10(D10Variant::Mbps50)
    );

    let frame = synth_mpeg2_frame(1920, 720, true, 0x82, 90_000, 3);
    parser.parse_frame_info(&frame).unwrap();
    assert!(parser.long_gop_essence_type().is_err());
    assert!(parser.d10_essence_type().is_err());
}

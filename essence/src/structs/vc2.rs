//! VC-2 (SMPTE ST 2042-1) stream probing.
//!
//! A VC-2 stream is a chain of data units, each with a 13 byte parse info
//! header that links to the next unit. A frame sample is the run of units
//! up to and including its picture (two pictures when field coded), plus a
//! directly following end of sequence unit.

use anyhow::{Result, bail};

use crate::structs::rational::Rational;
use crate::structs::{EssenceParser, FrameSize};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ProbeError;

pub const PARSE_INFO_PREFIX: u32 = 0x4242_4344; // "BBCD"
pub const PARSE_INFO_SIZE: usize = 13;

pub const SEQUENCE_HEADER: u8 = 0x00;
pub const END_OF_SEQUENCE: u8 = 0x10;

/// (width, height, interlaced, frame rate index, pixel aspect ratio index)
const BASE_VIDEO_FORMATS: [(u32, u32, bool, u32, u32); 23] = [
    (640, 480, false, 1, 1),
    (176, 120, false, 9, 2),
    (176, 144, false, 10, 3),
    (352, 240, false, 9, 2),
    (352, 288, false, 10, 3),
    (704, 480, false, 9, 2),
    (704, 576, false, 10, 3),
    (720, 480, true, 4, 2),
    (720, 576, true, 3, 3),
    (1280, 720, false, 7, 1),
    (1280, 720, false, 6, 1),
    (1920, 1080, true, 4, 1),
    (1920, 1080, true, 3, 1),
    (1920, 1080, false, 7, 1),
    (1920, 1080, false, 6, 1),
    (2048, 1080, false, 2, 1),
    (4096, 2160, false, 2, 1),
    (3840, 2160, false, 7, 1),
    (3840, 2160, false, 6, 1),
    (7680, 4320, false, 7, 1),
    (7680, 4320, false, 6, 1),
    (1920, 1080, false, 1, 1),
    (720, 486, true, 4, 2),
];

const FRAME_RATES: [Rational; 17] = [
    Rational::new(0, 0),
    Rational::new(24000, 1001),
    Rational::new(24, 1),
    Rational::new(25, 1),
    Rational::new(30000, 1001),
    Rational::new(30, 1),
    Rational::new(50, 1),
    Rational::new(60000, 1001),
    Rational::new(60, 1),
    Rational::new(15000, 1001),
    Rational::new(25, 2),
    Rational::new(48, 1),
    Rational::new(48000, 1001),
    Rational::new(96, 1),
    Rational::new(100, 1),
    Rational::new(120000, 1001),
    Rational::new(120, 1),
];

const PIXEL_ASPECT_RATIOS: [(u32, u32); 7] =
    [(0, 0), (1, 1), (10, 11), (12, 11), (40, 33), (16, 11), (4, 3)];

#[derive(Debug, Clone, Copy)]
struct ParseInfo {
    parse_code: u8,
    next_parse_offset: u32,
}

impl ParseInfo {
    fn read(data: &[u8]) -> Option<Result<Self>> {
        if data.len() < PARSE_INFO_SIZE {
            return None;
        }
        let prefix = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if prefix != PARSE_INFO_PREFIX {
            return Some(Err(ProbeError::InvalidParseInfo(prefix).into()));
        }
        Some(Ok(Self {
            parse_code: data[4],
            next_parse_offset: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
        }))
    }

    fn is_picture(&self) -> bool {
        // fragments (bit 2 set) are not counted as pictures
        self.parse_code & 0x0c == 0x08
    }
}

#[derive(Debug, Default, Clone)]
pub struct Vc2Parser {
    pub major_version: u32,
    pub profile: u32,
    pub level: u32,
    pub base_video_format: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub interlaced: bool,
    pub picture_coding_mode: u32,
    frame_rate: Option<Rational>,
    pixel_aspect_ratio: Option<(u32, u32)>,
    have_sequence_header: bool,
}

impl Vc2Parser {
    fn read_sequence_header(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        self.major_version = reader.get_vc2_uint()?;
        reader.get_vc2_uint()?; // minor_version
        self.profile = reader.get_vc2_uint()?;
        self.level = reader.get_vc2_uint()?;
        self.base_video_format = reader.get_vc2_uint()?;

        let Some(&(width, height, interlaced, frame_rate_index, par_index)) =
            BASE_VIDEO_FORMATS.get(self.base_video_format as usize)
        else {
            bail!(ProbeError::UnknownBaseVideoFormat(self.base_video_format));
        };
        self.frame_width = width;
        self.frame_height = height;
        self.interlaced = interlaced;
        self.frame_rate = FRAME_RATES.get(frame_rate_index as usize).copied();
        self.pixel_aspect_ratio = PIXEL_ASPECT_RATIOS.get(par_index as usize).copied();

        if reader.get()? {
            self.frame_width = reader.get_vc2_uint()?;
            self.frame_height = reader.get_vc2_uint()?;
        }
        if reader.get()? {
            reader.get_vc2_uint()?; // color_diff_format_index
        }
        if reader.get()? {
            self.interlaced = reader.get_vc2_uint()? == 1;
        }
        if reader.get()? {
            let index = reader.get_vc2_uint()?;
            self.frame_rate = if index == 0 {
                let num = reader.get_vc2_uint()?;
                let den = reader.get_vc2_uint()?;
                Some(Rational::new(num as i32, den as i32))
            } else {
                FRAME_RATES.get(index as usize).copied()
            };
        }
        if reader.get()? {
            let index = reader.get_vc2_uint()?;
            self.pixel_aspect_ratio = if index == 0 {
                Some((reader.get_vc2_uint()?, reader.get_vc2_uint()?))
            } else {
                PIXEL_ASPECT_RATIOS.get(index as usize).copied()
            };
        }
        if reader.get()? {
            for _ in 0..4 {
                reader.get_vc2_uint()?; // clean area
            }
        }
        if reader.get()? && reader.get_vc2_uint()? == 0 {
            for _ in 0..4 {
                reader.get_vc2_uint()?; // signal range
            }
        }
        if reader.get()? && reader.get_vc2_uint()? == 0 {
            for _ in 0..3 {
                if reader.get()? {
                    reader.get_vc2_uint()?;
                }
            }
        }
        self.picture_coding_mode = reader.get_vc2_uint()?;
        self.have_sequence_header = true;

        Ok(())
    }

    pub fn have_frame_rate(&self) -> bool {
        self.frame_rate().is_some()
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate.filter(|rate| !rate.is_zero())
    }

    pub fn aspect_ratio(&self) -> Option<Rational> {
        let (par_num, par_den) = self.pixel_aspect_ratio?;
        if par_num == 0 || par_den == 0 {
            return None;
        }
        let num = i32::try_from(self.frame_width as u64 * par_num as u64).ok()?;
        let den = i32::try_from(self.frame_height as u64 * par_den as u64).ok()?;
        Some(Rational::new(num, den).reduced())
    }

    fn pictures_per_frame(&self) -> usize {
        if self.picture_coding_mode == 1 { 2 } else { 1 }
    }
}

impl EssenceParser for Vc2Parser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        let mut offset = 0usize;
        let mut pictures = 0usize;

        loop {
            let info = match ParseInfo::read(&data[offset..]) {
                None => return FrameSize::Unknown,
                Some(Err(_)) => return FrameSize::Invalid,
                Some(Ok(info)) => info,
            };

            if pictures == self.pictures_per_frame() {
                if info.parse_code == END_OF_SEQUENCE {
                    offset += PARSE_INFO_SIZE;
                }
                return FrameSize::Known(offset);
            }

            if info.parse_code == SEQUENCE_HEADER && !self.have_sequence_header {
                let body = &data[offset + PARSE_INFO_SIZE..];
                let end = (info.next_parse_offset as usize)
                    .saturating_sub(PARSE_INFO_SIZE)
                    .min(body.len());
                let reader = &mut BsIoSliceReader::from_slice(&body[..end]);
                if self.read_sequence_header(reader).is_err() {
                    return FrameSize::Unknown;
                }
            }

            if info.parse_code == END_OF_SEQUENCE {
                return FrameSize::Known(offset + PARSE_INFO_SIZE);
            }
            if info.next_parse_offset < PARSE_INFO_SIZE as u32 {
                return FrameSize::Invalid;
            }
            if info.is_picture() {
                pictures += 1;
            }

            offset += info.next_parse_offset as usize;
            if offset > data.len() {
                return FrameSize::Unknown;
            }
            if offset == data.len() && pictures == self.pictures_per_frame() {
                // the following unit may be an end of sequence; wait for it
                return FrameSize::Unknown;
            }
        }
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        self.have_sequence_header = false;
        let mut offset = 0usize;
        while let Some(info) = ParseInfo::read(&data[offset..]) {
            let info = info?;
            if info.parse_code == SEQUENCE_HEADER {
                let body_end = if info.next_parse_offset == 0 {
                    data.len()
                } else {
                    (offset + info.next_parse_offset as usize).min(data.len())
                };
                let body = &data[(offset + PARSE_INFO_SIZE).min(body_end)..body_end];
                let reader = &mut BsIoSliceReader::from_slice(body);
                return self.read_sequence_header(reader);
            }
            if info.next_parse_offset == 0 {
                break;
            }
            offset += info.next_parse_offset as usize;
        }

        bail!(ProbeError::MissingVc2SequenceHeader)
    }
}

#[cfg(test)]
fn parse_info(parse_code: u8, next: u32, prev: u32) -> Vec<u8> {
    let mut unit = b"BBCD".to_vec();
    unit.push(parse_code);
    unit.extend(next.to_be_bytes());
    unit.extend(prev.to_be_bytes());
    unit
}

#[cfg(test)]
pub(crate) fn synth_vc2_frame(with_sequence_header: bool) -> Vec<u8> {
    let mut frame = Vec::new();
    if with_sequence_header {
        // major 2, minor 0, profile 3, level 3, base format 12 (1080i50),
        // no custom source parameters, picture coding mode 1 (fields)
        let body = [0b0111_0000, 0b1000_0101, 0b0001_1000, 0b0000_0001];
        frame.extend(parse_info(SEQUENCE_HEADER, (PARSE_INFO_SIZE + body.len()) as u32, 0));
        frame.extend(body);
    }
    for _ in 0..2 {
        frame.extend(parse_info(0xe8, (PARSE_INFO_SIZE + 4) as u32, 0));
        frame.extend([0xaa; 4]);
    }
    frame
}

#[test]
fn test_vc2_probe() {
    let frame = synth_vc2_frame(true);
    let mut stream = frame.clone();
    stream.extend(synth_vc2_frame(false));
    stream.extend(parse_info(END_OF_SEQUENCE, 0, 17));

    let mut parser = Vc2Parser::default();
    parser.parse_frame_info(&frame).unwrap();
    assert_eq!(parser.major_version, 2);
    assert_eq!(parser.base_video_format, 12);
    assert_eq!((parser.frame_width, parser.frame_height), (1920, 1080));
    assert_eq!(parser.picture_coding_mode, 1);
    assert_eq!(parser.frame_rate(), Some(Rational::new(25, 1)));
    assert_eq!(parser.aspect_ratio(), Some(Rational::new(16, 9)));

    assert_eq!(parser.parse_frame_size(&stream), FrameSize::Known(frame.len()));
    let rest = &stream[frame.len()..];
    assert_eq!(parser.parse_frame_size(rest), FrameSize::Known(rest.len()));
    assert_eq!(parser.parse_frame_size(b"XXXXXXXXXXXXXXXX"), FrameSize::Invalid);
}

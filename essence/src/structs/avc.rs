//! H.264/AVC Annex B byte stream probing.
//!
//! Access unit boundaries follow ISO/IEC 14496-10 7.4.1.2.3: after the
//! first VCL NAL unit, an access unit delimiter, SPS, PPS, SEI or a slice
//! with `first_mb_in_slice == 0` starts the next access unit.

use anyhow::{Result, bail};

use crate::structs::essence_type::{AvcProfile, AvciClass, EssenceType, HdScan};
use crate::structs::rational::Rational;
use crate::structs::{EssenceParser, FrameSize, start_codes};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{ProbeError, ResolveError};

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR_SLICE: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// Parameter set header that AVC-Intra frames may carry in front of the slices.
pub const AVCI_HEADER_SIZE: usize = 512;

const SAMPLE_ASPECT_RATIOS: [(u32, u32); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

#[derive(Debug, Clone, Copy)]
struct NalUnit {
    /// Offset of the start code, including a leading zero byte when present.
    start: usize,
    /// Offset of the NAL header byte.
    header: usize,
}

fn nal_units(data: &[u8]) -> Vec<NalUnit> {
    start_codes(data)
        .map(|offset| NalUnit {
            start: if offset > 0 && data[offset - 1] == 0 {
                offset - 1
            } else {
                offset
            },
            header: offset + 3,
        })
        .filter(|nal| nal.header < data.len())
        .collect()
}

/// Removes emulation prevention bytes (`00 00 03` -> `00 00`).
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 3 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        rbsp.push(byte);
    }
    rbsp
}

/// Inserts emulation prevention bytes into a raw byte sequence payload.
pub fn escape_rbsp(rbsp: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 3 {
            data.push(3);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        data.push(byte);
    }
    data
}

#[derive(Debug, Default, Clone)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_map_units: u32,
    pub frame_mbs_only: bool,
    pub crop: [u32; 4],
    pub sample_aspect_ratio: Option<(u32, u32)>,
    pub timing: Option<(u32, u32)>,
}

impl Sps {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut sps = Sps {
            profile_idc: reader.get_n(8)?,
            constraint_flags: reader.get_n(8)?,
            level_idc: reader.get_n(8)?,
            chroma_format_idc: 1,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            ..Default::default()
        };
        reader.get_ue()?; // seq_parameter_set_id

        if matches!(
            sps.profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            sps.chroma_format_idc = reader.get_ue()?;
            if sps.chroma_format_idc > 3 {
                bail!(ProbeError::InvalidChromaFormat(sps.chroma_format_idc));
            }
            if sps.chroma_format_idc == 3 {
                reader.skip_n(1)?; // separate_colour_plane_flag
            }
            sps.bit_depth_luma = reader.get_ue()? + 8;
            sps.bit_depth_chroma = reader.get_ue()? + 8;
            reader.skip_n(1)?; // qpprime_y_zero_transform_bypass_flag
            if reader.get()? {
                let lists = if sps.chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if reader.get()? {
                        Self::skip_scaling_list(reader, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        reader.get_ue()?; // log2_max_frame_num_minus4
        match reader.get_ue()? {
            0 => {
                reader.get_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                reader.skip_n(1)?; // delta_pic_order_always_zero_flag
                reader.get_se()?; // offset_for_non_ref_pic
                reader.get_se()?; // offset_for_top_to_bottom_field
                for _ in 0..reader.get_ue()? {
                    reader.get_se()?;
                }
            }
            _ => {}
        }
        reader.get_ue()?; // max_num_ref_frames
        reader.skip_n(1)?; // gaps_in_frame_num_value_allowed_flag
        sps.pic_width_in_mbs = reader.get_ue()? + 1;
        sps.pic_height_in_map_units = reader.get_ue()? + 1;
        sps.frame_mbs_only = reader.get()?;
        if !sps.frame_mbs_only {
            reader.skip_n(1)?; // mb_adaptive_frame_field_flag
        }
        reader.skip_n(1)?; // direct_8x8_inference_flag
        if reader.get()? {
            for crop in sps.crop.iter_mut() {
                *crop = reader.get_ue()?;
            }
        }

        if reader.get()? {
            sps.read_vui(reader)?;
        }

        Ok(sps)
    }

    fn skip_scaling_list(reader: &mut BsIoSliceReader, size: usize) -> Result<()> {
        let mut last_scale = 8i32;
        let mut next_scale = 8i32;
        for _ in 0..size {
            if next_scale != 0 {
                let delta = reader.get_se()?;
                next_scale = (last_scale + delta + 256) % 256;
            }
            if next_scale != 0 {
                last_scale = next_scale;
            }
        }
        Ok(())
    }

    fn read_vui(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        if reader.get()? {
            let idc: u8 = reader.get_n(8)?;
            self.sample_aspect_ratio = match idc {
                255 => Some((reader.get_n(16)?, reader.get_n(16)?)),
                1..=16 => Some(SAMPLE_ASPECT_RATIOS[idc as usize]),
                _ => None,
            };
        }
        if reader.get()? {
            reader.skip_n(1)?; // overscan_appropriate_flag
        }
        if reader.get()? {
            reader.skip_n(3 + 1)?; // video_format, video_full_range_flag
            if reader.get()? {
                reader.skip_n(24)?; // colour_primaries, transfer, matrix
            }
        }
        if reader.get()? {
            reader.get_ue()?;
            reader.get_ue()?;
        }
        if reader.get()? {
            let num_units_in_tick: u32 = reader.get_n(32)?;
            let time_scale: u32 = reader.get_n(32)?;
            if num_units_in_tick > 0 && time_scale > 0 {
                self.timing = Some((num_units_in_tick, time_scale));
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        let crop_unit_x = match self.chroma_format_idc {
            1 | 2 => 2,
            _ => 1,
        };
        (self.pic_width_in_mbs * 16).saturating_sub(crop_unit_x * (self.crop[0] + self.crop[1]))
    }

    pub fn height(&self) -> u32 {
        let field_factor = if self.frame_mbs_only { 1 } else { 2 };
        let crop_unit_y = match self.chroma_format_idc {
            1 => 2,
            _ => 1,
        } * field_factor;
        (field_factor * self.pic_height_in_map_units * 16)
            .saturating_sub(crop_unit_y * (self.crop[2] + self.crop[3]))
    }

    pub fn constraint_set(&self, index: u8) -> bool {
        self.constraint_flags & (0x80 >> index) != 0
    }
}

#[derive(Debug, Default)]
pub struct AvcParser {
    sps: Option<Sps>,
    has_parameter_sets: bool,
}

impl AvcParser {
    pub fn sps(&self) -> Option<&Sps> {
        self.sps.as_ref()
    }

    /// Whether the last parsed access unit carried its own SPS and PPS.
    pub fn has_parameter_sets(&self) -> bool {
        self.has_parameter_sets
    }

    pub fn have_frame_rate(&self) -> bool {
        self.frame_rate().is_some()
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        let (num_units_in_tick, time_scale) = self.sps.as_ref()?.timing?;
        let num = i32::try_from(time_scale).ok()?;
        let den = i32::try_from(num_units_in_tick.checked_mul(2)?).ok()?;
        Some(Rational::new(num, den).reduced())
    }

    pub fn aspect_ratio(&self) -> Option<Rational> {
        let sps = self.sps.as_ref()?;
        let (sar_w, sar_h) = sps.sample_aspect_ratio?;
        if sar_w == 0 || sar_h == 0 {
            return None;
        }
        let num = i32::try_from(sps.width() as u64 * sar_w as u64).ok()?;
        let den = i32::try_from(sps.height() as u64 * sar_h as u64).ok()?;
        Some(Rational::new(num, den).reduced())
    }

    pub fn essence_type(&self) -> Result<EssenceType> {
        let Some(sps) = &self.sps else {
            bail!(ProbeError::MissingSps);
        };
        let intra = sps.constraint_set(3);
        let profile = match sps.profile_idc {
            66 if sps.constraint_set(1) => AvcProfile::ConstrainedBaseline,
            66 => AvcProfile::Baseline,
            77 => AvcProfile::Main,
            88 => AvcProfile::Extended,
            100 => AvcProfile::High,
            110 if intra => AvcProfile::High10Intra,
            110 => AvcProfile::High10,
            122 if intra => AvcProfile::High422Intra,
            122 => AvcProfile::High422,
            244 if intra => AvcProfile::High444Intra,
            244 => AvcProfile::High444,
            44 => AvcProfile::Cavlc444Intra,
            profile_idc => bail!(ResolveError::UnknownAvcProfile {
                profile_idc,
                constraint_flags: sps.constraint_flags,
            }),
        };
        Ok(EssenceType::Avc(profile))
    }

    /// Classifies AVC-Intra essence from the SPS and the size of one coded
    /// frame without its parameter set header. `guess_progressive` resolves
    /// 1080 line material coded as fields, which is interlaced by default.
    pub fn avci_essence_type(
        &self,
        frame_size: usize,
        guess_progressive: Option<bool>,
    ) -> Result<EssenceType> {
        let Some(sps) = &self.sps else {
            bail!(ProbeError::MissingSps);
        };

        let height = sps.height();
        let scan = match height {
            720 => HdScan::Progressive720,
            1080 if sps.frame_mbs_only => HdScan::Progressive1080,
            1080 if guess_progressive == Some(true) => HdScan::Progressive1080,
            1080 => HdScan::Interlaced1080,
            _ => bail!(ResolveError::UnknownAvci),
        };

        let class = match sps.profile_idc {
            110 => AvciClass::C50,
            122 => {
                let class_200_threshold = if height == 720 { 400_000 } else { 800_000 };
                if frame_size > class_200_threshold {
                    AvciClass::C200
                } else {
                    AvciClass::C100
                }
            }
            _ => bail!(ResolveError::UnknownAvci),
        };

        Ok(EssenceType::Avci(class, scan))
    }
}

/// Whether `data` starts with an AVC-Intra parameter set header: an access
/// unit delimiter followed by an SPS.
pub fn has_avci_header(data: &[u8]) -> bool {
    let units = nal_units(&data[..data.len().min(64)]);
    let types: Vec<u8> = units.iter().map(|n| data[n.header] & 0x1f).collect();
    matches!(types.as_slice(), [NAL_AUD, NAL_SPS, ..] | [NAL_SPS, ..])
}

impl EssenceParser for AvcParser {
    fn parse_frame_size(&mut self, data: &[u8]) -> FrameSize {
        if data.len() < 5 {
            return FrameSize::Unknown;
        }
        let starts_with_code = data[..3] == [0, 0, 1] || data[..4] == [0, 0, 0, 1];
        if !starts_with_code {
            return FrameSize::Invalid;
        }

        let mut seen_vcl = false;
        for nal in nal_units(data) {
            let nal_type = data[nal.header] & 0x1f;
            match nal_type {
                NAL_SLICE | NAL_IDR_SLICE => {
                    let Some(&slice_header) = data.get(nal.header + 1) else {
                        break;
                    };
                    // first_mb_in_slice == 0 is coded as a single 1 bit
                    let first_mb_is_zero = slice_header & 0x80 != 0;
                    if seen_vcl && first_mb_is_zero {
                        return FrameSize::Known(nal.start);
                    }
                    seen_vcl = true;
                }
                NAL_AUD | NAL_SPS | NAL_PPS | NAL_SEI | 14..=18 if seen_vcl => {
                    return FrameSize::Known(nal.start);
                }
                _ => {}
            }
        }

        FrameSize::Unknown
    }

    fn parse_frame_info(&mut self, data: &[u8]) -> Result<()> {
        self.has_parameter_sets = false;
        let mut have_pps = false;
        let units = nal_units(data);
        for (i, nal) in units.iter().enumerate() {
            let end = units.get(i + 1).map_or(data.len(), |next| next.start);
            match data[nal.header] & 0x1f {
                NAL_SPS => {
                    let rbsp = unescape_rbsp(&data[nal.header + 1..end]);
                    let reader = &mut BsIoSliceReader::from_slice(&rbsp);
                    self.sps = Some(Sps::read(reader)?);
                }
                NAL_PPS => have_pps = true,
                NAL_SLICE | NAL_IDR_SLICE => break,
                _ => {}
            }
        }
        self.has_parameter_sets = self.sps.is_some() && have_pps;

        if self.sps.is_none() {
            bail!(ProbeError::MissingSps);
        }
        Ok(())
    }
}

/// Two slices of 100 bytes each, led by the parameter set header if asked.
#[cfg(test)]
pub(crate) fn synth_avci_frame(
    essence_type: EssenceType,
    frame_rate: Rational,
    with_header: bool,
) -> Vec<u8> {
    let mut frame = if with_header {
        crate::structs::avci_header::avci_header(essence_type, frame_rate).unwrap()
    } else {
        Vec::new()
    };
    for first_mb_zero in [true, false] {
        frame.extend([0, 0, 1, 0x65, if first_mb_zero { 0x88 } else { 0x40 }]);
        frame.extend(std::iter::repeat_n(0x5a, 100));
    }
    frame
}

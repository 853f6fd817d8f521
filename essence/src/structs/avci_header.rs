//! Built-in AVC-Intra parameter set headers.
//!
//! AVC-Intra essence that omits the per-frame header needs one supplied at
//! wrap time. This builds a 512 byte header (access unit delimiter, SPS,
//! PPS, zero padding) for every AVC-Intra class, raster and frame rate.

use anyhow::{Result, anyhow};

use crate::structs::avc::{AVCI_HEADER_SIZE, NAL_AUD, NAL_PPS, NAL_SPS, escape_rbsp};
use crate::structs::essence_type::{AvciClass, EssenceType, HdScan};
use crate::structs::rational::Rational;
use crate::utils::bitstream_io::BsIoVecWriter;

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const SAR_4_3: u8 = 14;
const SAR_SQUARE: u8 = 1;

struct AvciLayout {
    profile_idc: u8,
    level_idc: u8,
    chroma_format_idc: u32,
    width_in_mbs: u32,
    height_in_map_units: u32,
    frame_mbs_only: bool,
    crop_bottom: u32,
    sar_idc: u8,
}

impl AvciLayout {
    fn new(class: AvciClass, scan: HdScan) -> Self {
        let (profile_idc, chroma_format_idc) = match class {
            AvciClass::C50 => (110, 1),
            AvciClass::C100 | AvciClass::C200 => (122, 2),
        };
        let level_idc = if class == AvciClass::C200 { 50 } else { 41 };
        let width_in_mbs = match (class, scan) {
            (AvciClass::C50, HdScan::Progressive720) => 60,
            (AvciClass::C50, _) => 90,
            (_, HdScan::Progressive720) => 80,
            _ => 120,
        };
        let (height_in_map_units, frame_mbs_only) = match scan {
            HdScan::Interlaced1080 => (34, false),
            HdScan::Progressive1080 => (68, true),
            HdScan::Progressive720 => (45, true),
        };
        // 8 lines of padding below 1080, in crop units
        let chroma_unit_y = if chroma_format_idc == 1 { 2 } else { 1 };
        let crop_unit_y = if frame_mbs_only { chroma_unit_y } else { 2 * chroma_unit_y };
        let crop_bottom = match scan {
            HdScan::Progressive720 => 0,
            _ => 8 / crop_unit_y,
        };
        let sar_idc = if class == AvciClass::C50 {
            SAR_4_3
        } else {
            SAR_SQUARE
        };

        Self {
            profile_idc,
            level_idc,
            chroma_format_idc,
            width_in_mbs,
            height_in_map_units,
            frame_mbs_only,
            crop_bottom,
            sar_idc,
        }
    }

    fn sps(&self, frame_rate: Rational) -> std::io::Result<Vec<u8>> {
        let mut w = BsIoVecWriter::default();
        w.put_n::<u8>(8, self.profile_idc)?;
        w.put_n::<u8>(8, 0x10)?; // constraint_set3_flag: intra profile
        w.put_n::<u8>(8, self.level_idc)?;
        w.put_ue(0)?; // seq_parameter_set_id
        w.put_ue(self.chroma_format_idc)?;
        w.put_ue(2)?; // bit_depth_luma_minus8
        w.put_ue(2)?; // bit_depth_chroma_minus8
        w.put(false)?; // qpprime_y_zero_transform_bypass_flag
        w.put(false)?; // seq_scaling_matrix_present_flag
        w.put_ue(0)?; // log2_max_frame_num_minus4
        w.put_ue(2)?; // pic_order_cnt_type
        w.put_ue(0)?; // max_num_ref_frames
        w.put(false)?; // gaps_in_frame_num_value_allowed_flag
        w.put_ue(self.width_in_mbs - 1)?;
        w.put_ue(self.height_in_map_units - 1)?;
        w.put(self.frame_mbs_only)?;
        if !self.frame_mbs_only {
            w.put(false)?; // mb_adaptive_frame_field_flag
        }
        w.put(true)?; // direct_8x8_inference_flag
        w.put(self.crop_bottom > 0)?;
        if self.crop_bottom > 0 {
            w.put_ue(0)?;
            w.put_ue(0)?;
            w.put_ue(0)?;
            w.put_ue(self.crop_bottom)?;
        }

        w.put(true)?; // vui_parameters_present_flag
        w.put(true)?; // aspect_ratio_info_present_flag
        w.put_n::<u8>(8, self.sar_idc)?;
        w.put(false)?; // overscan_info_present_flag
        w.put(false)?; // video_signal_type_present_flag
        w.put(false)?; // chroma_loc_info_present_flag
        w.put(true)?; // timing_info_present_flag
        w.put_n::<u32>(32, frame_rate.den as u32)?;
        w.put_n::<u32>(32, 2 * frame_rate.num as u32)?;
        w.put(true)?; // fixed_frame_rate_flag
        w.put(false)?; // nal_hrd_parameters_present_flag
        w.put(false)?; // vcl_hrd_parameters_present_flag
        w.put(false)?; // pic_struct_present_flag
        w.put(false)?; // bitstream_restriction_flag
        w.put_trailing_bits()?;
        w.into_bytes()
    }

    fn pps(&self) -> std::io::Result<Vec<u8>> {
        let mut w = BsIoVecWriter::default();
        w.put_ue(0)?; // pic_parameter_set_id
        w.put_ue(0)?; // seq_parameter_set_id
        w.put(true)?; // entropy_coding_mode_flag
        w.put(false)?; // bottom_field_pic_order_in_frame_present_flag
        w.put_ue(0)?; // num_slice_groups_minus1
        w.put_ue(0)?; // num_ref_idx_l0_default_active_minus1
        w.put_ue(0)?; // num_ref_idx_l1_default_active_minus1
        w.put(false)?; // weighted_pred_flag
        w.put_n::<u8>(2, 0)?; // weighted_bipred_idc
        w.put_se(0)?; // pic_init_qp_minus26
        w.put_se(0)?; // pic_init_qs_minus26
        w.put_se(0)?; // chroma_qp_index_offset
        w.put(true)?; // deblocking_filter_control_present_flag
        w.put(false)?; // constrained_intra_pred_flag
        w.put(false)?; // redundant_pic_cnt_present_flag
        w.put(true)?; // transform_8x8_mode_flag
        w.put(false)?; // pic_scaling_matrix_present_flag
        w.put_se(0)?; // second_chroma_qp_index_offset
        w.put_trailing_bits()?;
        w.into_bytes()
    }
}

/// Builds the 512 byte header for `essence_type`, which must be AVC-Intra.
pub fn avci_header(essence_type: EssenceType, frame_rate: Rational) -> Result<Vec<u8>> {
    let EssenceType::Avci(class, scan) = essence_type else {
        return Err(anyhow!("{essence_type} is not an AVC-Intra essence type"));
    };
    let layout = AvciLayout::new(class, scan);

    let mut header = Vec::with_capacity(AVCI_HEADER_SIZE);
    header.extend(START_CODE);
    header.extend([NAL_AUD, 0x10]);
    header.extend(START_CODE);
    header.push(0x60 | NAL_SPS);
    header.extend(escape_rbsp(&layout.sps(frame_rate)?));
    header.extend(START_CODE);
    header.push(0x60 | NAL_PPS);
    header.extend(escape_rbsp(&layout.pps()?));
    header.resize(AVCI_HEADER_SIZE, 0);

    Ok(header)
}

#[test]
fn test_avci_header_layout() {
    let header = avci_header(
        EssenceType::Avci(AvciClass::C50, HdScan::Interlaced1080),
        Rational::new(30000, 1001),
    )
    .unwrap();
    assert_eq!(header.len(), AVCI_HEADER_SIZE);
    assert_eq!(&header[..6], &[0, 0, 0, 1, 0x09, 0x10]);
    assert_eq!(&header[6..11], &[0, 0, 0, 1, 0x67]);
    assert_eq!(header[11], 110);

    assert!(avci_header(EssenceType::Vc2, Rational::new(25, 1)).is_err());
}

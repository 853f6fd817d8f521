//! Essence type resolution.
//!
//! Inputs given as an essence group are narrowed to one concrete type by
//! probing their first access unit. Explicit types are probed as well where
//! the bitstream carries a frame rate or aspect ratio. Frame rates found in
//! the bitstream replace the clip default unless the rate was set explicitly;
//! the last input probed wins.

use anyhow::{Result, anyhow, bail};
use log::{debug, info};

use crate::log_or_err;
use crate::process::input::{OptProp, RawInput};
use crate::structs::avc::{AVCI_HEADER_SIZE, AvcParser, has_avci_header};
use crate::structs::dv::{DV_HEADER_SIZE, DvParser};
use crate::structs::essence_type::{EssenceType, EssenceTypeGroup, Rdd36Profile};
use crate::structs::mpeg2::Mpeg2Parser;
use crate::structs::rational::{FRAME_RATE_25, Rational};
use crate::structs::rdd36::Rdd36Parser;
use crate::structs::vc2::Vc2Parser;
use crate::structs::vc3::{VC3_HEADER_SIZE, Vc3Parser};
use crate::structs::EssenceParser;
use crate::utils::errors::{ReadError, ResolveError};

/// Clip-wide state shared by every input's resolution.
#[derive(Debug, Clone)]
pub struct ResolveState {
    pub frame_rate: OptProp<Rational>,
    pub regression_test: bool,
    pub fail_level: log::Level,
}

impl Default for ResolveState {
    fn default() -> Self {
        Self {
            frame_rate: OptProp::Default(FRAME_RATE_25),
            regression_test: false,
            fail_level: log::Level::Error,
        }
    }
}

impl ResolveState {
    pub fn new(frame_rate: Option<Rational>) -> Self {
        Self {
            frame_rate: frame_rate.map_or(OptProp::Default(FRAME_RATE_25), OptProp::Set),
            ..Default::default()
        }
    }

    pub fn frame_rate(&self) -> Rational {
        self.frame_rate.value_or(FRAME_RATE_25)
    }

    fn update_frame_rate(&mut self, frame_rate: Option<Rational>) {
        if let Some(frame_rate) = frame_rate.filter(|r| !r.is_zero()) {
            self.frame_rate.set_default(frame_rate);
        }
    }
}

/// Opens `input` and settles its essence type. The reader is left rewound.
pub fn resolve_input(state: &mut ResolveState, input: &mut RawInput) -> Result<()> {
    input.open()?;

    if let Some(group) = input.essence_group() {
        if state.regression_test {
            bail!(ResolveError::GroupInRegressionTest(group.to_string()));
        }
        let essence_type = resolve_group(state, input, group)?;
        input.essence_type = Some(essence_type);
    } else {
        let essence_type = input.resolved_type()?;
        let probe = !state.regression_test
            || matches!(
                essence_type,
                EssenceType::Rdd36(Rdd36Profile::Std422 | Rdd36Profile::Std4444)
                    | EssenceType::Avci(..)
            );
        if probe {
            let essence_type = probe_explicit(state, input, essence_type)?;
            input.essence_type = Some(essence_type);
        }
    }

    input.open()?;
    info!(
        "{}: {} ({} fps)",
        input.name(),
        input.resolved_type()?,
        state.frame_rate()
    );
    Ok(())
}

/// First access unit found by `parser`, or `None` for an empty input.
fn first_sample(input: &mut RawInput, parser: Box<dyn EssenceParser>) -> Result<Option<Vec<u8>>> {
    let Some(reader) = input.raw_reader_mut() else {
        bail!(ReadError::NotOpen);
    };
    reader.set_essence_parser(parser);
    if reader.read_samples(1)? == 0 {
        return Ok(None);
    }
    Ok(Some(reader.sample_data().to_vec()))
}

fn resolve_group(
    state: &mut ResolveState,
    input: &mut RawInput,
    group: EssenceTypeGroup,
) -> Result<EssenceType> {
    let essence_type = match group {
        EssenceTypeGroup::Dv => probe_dv(state, input)?,
        EssenceTypeGroup::D10 => probe_mpeg2(state, input, true)?,
        EssenceTypeGroup::Mpeg2Lg => probe_mpeg2(state, input, false)?,
        EssenceTypeGroup::Vc3 => probe_vc3(input)?,
        EssenceTypeGroup::Avc => probe_avc(state, input)?,
        EssenceTypeGroup::Avci => match probe_avci(state, input)? {
            Some(essence_type) => Some(essence_type),
            None => bail!(ResolveError::NoAvciSamples(input.name())),
        },
    };

    match essence_type {
        Some(essence_type) => Ok(essence_type),
        None => {
            let Some(default) = group.default_type() else {
                bail!(ResolveError::Unresolved(input.name()));
            };
            debug!("{}: no samples, assuming {default}", input.name());
            Ok(default)
        }
    }
}

fn probe_explicit(
    state: &mut ResolveState,
    input: &mut RawInput,
    essence_type: EssenceType,
) -> Result<EssenceType> {
    let parsed = match essence_type {
        EssenceType::Dv(_) => probe_dv(state, input)?.map(|_| essence_type),
        EssenceType::D10(_) | EssenceType::Mpeg2Lg(_) => {
            probe_mpeg2(state, input, matches!(essence_type, EssenceType::D10(_)))?
                .map(|_| essence_type)
        }
        EssenceType::Avci(..) => probe_avci(state, input)?.map(|_| essence_type),
        EssenceType::Avc(_) => match probe_avc(state, input)? {
            Some(parsed) if parsed != essence_type => {
                log_or_err!(
                    state,
                    log::Level::Warn,
                    anyhow!(ResolveError::AvcProfileMismatch {
                        forced: essence_type.to_string(),
                        parsed: parsed.to_string(),
                    })
                );
                Some(parsed)
            }
            parsed => parsed,
        },
        EssenceType::Vc2 => {
            let mut parser = Vc2Parser::default();
            if let Some(sample) = first_sample(input, Box::new(Vc2Parser::default()))? {
                parser.parse_frame_info(&sample)?;
                state.update_frame_rate(parser.frame_rate());
            }
            None
        }
        EssenceType::Rdd36(_) => {
            let mut parser = Rdd36Parser::default();
            if let Some(sample) = first_sample(input, Box::new(Rdd36Parser::default()))? {
                parser.parse_frame_info(&sample)?;
                state.update_frame_rate(parser.frame_rate());
            }
            None
        }
        _ => None,
    };

    Ok(parsed.unwrap_or(essence_type))
}

fn probe_dv(state: &mut ResolveState, input: &mut RawInput) -> Result<Option<EssenceType>> {
    let Some(reader) = input.raw_reader_mut() else {
        bail!(ReadError::NotOpen);
    };
    // shorter than one header means zero samples
    let header = reader.peek(DV_HEADER_SIZE)?;
    if header.len() < DV_HEADER_SIZE {
        return Ok(None);
    }
    let mut parser = DvParser::default();
    parser.parse_frame_info(header)?;
    let essence_type = parser.essence_type()?;
    if let Some(frame_size) = parser.frame_size() {
        reader.set_fixed_sample_size(frame_size);
    }

    state.update_frame_rate(Some(parser.frame_rate()));
    if let Some(aspect_ratio) = parser.aspect_ratio() {
        input.picture.aspect_ratio.set_default(aspect_ratio);
    }
    Ok(Some(essence_type))
}

fn probe_mpeg2(
    state: &mut ResolveState,
    input: &mut RawInput,
    d10: bool,
) -> Result<Option<EssenceType>> {
    let Some(sample) = first_sample(input, Box::new(Mpeg2Parser::default()))? else {
        return Ok(None);
    };
    let mut parser = Mpeg2Parser::default();
    parser.parse_frame_info(&sample)?;
    let essence_type = if d10 {
        parser.d10_essence_type()?
    } else {
        parser.long_gop_essence_type()?
    };

    state.update_frame_rate(parser.frame_rate());
    if let Some(aspect_ratio) = parser.aspect_ratio() {
        input.picture.aspect_ratio.set_default(aspect_ratio);
    }
    if d10 && input.d10_fixed_frame_size {
        if let Some(reader) = input.raw_reader_mut() {
            reader.set_fixed_sample_size(sample.len());
        }
    }
    Ok(Some(essence_type))
}

fn probe_vc3(input: &mut RawInput) -> Result<Option<EssenceType>> {
    let Some(reader) = input.raw_reader_mut() else {
        bail!(ReadError::NotOpen);
    };
    let header = reader.peek(VC3_HEADER_SIZE)?;
    if header.len() < VC3_HEADER_SIZE {
        return Ok(None);
    }
    let mut parser = Vc3Parser::default();
    parser.parse_frame_info(header)?;
    Ok(Some(parser.essence_type()?))
}

fn probe_avc(state: &mut ResolveState, input: &mut RawInput) -> Result<Option<EssenceType>> {
    let Some(sample) = first_sample(input, Box::new(AvcParser::default()))? else {
        return Ok(None);
    };
    let mut parser = AvcParser::default();
    parser.parse_frame_info(&sample)?;
    let essence_type = parser.essence_type()?;
    state.update_frame_rate(parser.frame_rate());
    Ok(Some(essence_type))
}

/// Classifies AVC-Intra from its first frame and switches the reader to
/// constant frame size reads.
fn probe_avci(state: &mut ResolveState, input: &mut RawInput) -> Result<Option<EssenceType>> {
    let Some(sample) = first_sample(input, Box::new(AvcParser::default()))? else {
        return Ok(None);
    };
    let mut parser = AvcParser::default();
    parser.parse_frame_info(&sample)?;

    let frame_size = if has_avci_header(&sample) {
        sample.len().saturating_sub(AVCI_HEADER_SIZE)
    } else {
        sample.len()
    };
    let essence_type = parser.avci_essence_type(frame_size, input.avci_guess_progressive)?;
    state.update_frame_rate(parser.frame_rate());
    if let Some(reader) = input.raw_reader_mut() {
        reader.set_avci_frame_size(frame_size);
    }
    debug!("{}: AVC-Intra frame size {frame_size}", input.name());
    Ok(Some(essence_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::input::{EssenceSource, InputKind};
    use crate::structs::avc::synth_avci_frame;
    use crate::structs::dv::synth_dv_frame;
    use crate::structs::essence_type::{
        AvciClass, AvcProfile, D10Variant, DvVariant, HdScan, Mpeg2LgVariant, Vc3Variant,
    };
    use crate::structs::mpeg2::synth_mpeg2_frame;
    use crate::structs::rational::{ASPECT_RATIO_16_9, FRAME_RATE_2997};
    use crate::structs::vc3::synth_vc3_header;

    fn group_input(group: EssenceTypeGroup, data: Vec<u8>) -> RawInput {
        RawInput::new(InputKind::Group(group), EssenceSource::memory(data))
    }

    #[test]
    fn empty_groups_use_defaults() -> Result<()> {
        for (group, expected) in [
            (EssenceTypeGroup::Dv, EssenceType::Dv(DvVariant::Iec25)),
            (EssenceTypeGroup::D10, EssenceType::D10(D10Variant::Mbps50)),
            (
                EssenceTypeGroup::Mpeg2Lg,
                EssenceType::Mpeg2Lg(Mpeg2LgVariant::P422Hl1080i),
            ),
            (EssenceTypeGroup::Vc3, EssenceType::Vc3(Vc3Variant::Id1242)),
            (EssenceTypeGroup::Avc, EssenceType::Avc(AvcProfile::High422)),
        ] {
            let mut state = ResolveState::default();
            let mut input = group_input(group, Vec::new());
            resolve_input(&mut state, &mut input)?;
            assert_eq!(input.essence_type, Some(expected));
            assert_eq!(state.frame_rate, OptProp::Default(FRAME_RATE_25));
        }

        let mut input = group_input(EssenceTypeGroup::Avci, Vec::new());
        let err = resolve_input(&mut ResolveState::default(), &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NoAvciSamples(_))
        ));
        Ok(())
    }

    #[test]
    fn truncated_groups_use_defaults() -> Result<()> {
        let dv = synth_dv_frame(0x00, true, 0, 2);
        let mut input = group_input(EssenceTypeGroup::Dv, dv[..200].to_vec());
        resolve_input(&mut ResolveState::default(), &mut input)?;
        assert_eq!(input.essence_type, Some(EssenceType::Dv(DvVariant::Iec25)));

        let vc3 = synth_vc3_header(1242);
        let mut input = group_input(EssenceTypeGroup::Vc3, vc3[..20].to_vec());
        resolve_input(&mut ResolveState::default(), &mut input)?;
        assert_eq!(input.essence_type, Some(EssenceType::Vc3(Vc3Variant::Id1242)));
        Ok(())
    }

    #[test]
    fn dv_sets_frame_rate_and_frame_size() -> Result<()> {
        let frame = synth_dv_frame(0x00, false, 0, 2);
        let mut input = group_input(EssenceTypeGroup::Dv, [frame.clone(), frame].concat());
        let mut state = ResolveState::default();
        resolve_input(&mut state, &mut input)?;

        assert_eq!(input.essence_type, Some(EssenceType::Dv(DvVariant::Iec25)));
        assert_eq!(state.frame_rate(), FRAME_RATE_2997);
        assert_eq!(input.picture.aspect_ratio, OptProp::Default(ASPECT_RATIO_16_9));
        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.sample_data().len(), 120_000);

        // explicit frame rates are kept
        let frame = synth_dv_frame(0x04, false, 1, 0);
        let mut input = group_input(EssenceTypeGroup::Dv, frame);
        input.picture.aspect_ratio = OptProp::Set(Rational::new(4, 3));
        let mut state = ResolveState::new(Some(FRAME_RATE_25));
        resolve_input(&mut state, &mut input)?;
        assert_eq!(input.essence_type, Some(EssenceType::Dv(DvVariant::Dv50)));
        assert_eq!(state.frame_rate, OptProp::Set(FRAME_RATE_25));
        assert_eq!(input.picture.aspect_ratio, OptProp::Set(Rational::new(4, 3)));
        Ok(())
    }

    #[test]
    fn unclassifiable_essence_is_rejected() {
        let mut input = group_input(EssenceTypeGroup::Vc3, synth_vc3_header(9999));
        let err = resolve_input(&mut ResolveState::default(), &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::UnknownVc3CompressionId(9999))
        ));

        let frame = synth_dv_frame(0x1e, true, 0, 0);
        let mut input = group_input(EssenceTypeGroup::Dv, frame);
        let err = resolve_input(&mut ResolveState::default(), &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::UnknownDv { stype: 0x1e, .. })
        ));

        let frame = synth_mpeg2_frame(1920, 1080, false, 0x82, 90_000, 3);
        let mut input = group_input(EssenceTypeGroup::D10, frame);
        let err = resolve_input(&mut ResolveState::default(), &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::UnknownD10BitRate(90_000))
        ));
    }

    #[test]
    fn mpeg2_long_gop() -> Result<()> {
        let frame = synth_mpeg2_frame(1440, 1080, true, 0x44, 87_500, 4);
        let mut input = group_input(EssenceTypeGroup::Mpeg2Lg, frame);
        let mut state = ResolveState::default();
        resolve_input(&mut state, &mut input)?;
        assert_eq!(
            input.essence_type,
            Some(EssenceType::Mpeg2Lg(Mpeg2LgVariant::MpHl1440_1080p))
        );
        assert_eq!(state.frame_rate(), FRAME_RATE_2997);
        Ok(())
    }

    #[test]
    fn avci_switches_to_constant_frames() -> Result<()> {
        let essence_type = EssenceType::Avci(AvciClass::C100, HdScan::Interlaced1080);
        let with_header = synth_avci_frame(essence_type, FRAME_RATE_25, true);
        let without_header = synth_avci_frame(essence_type, FRAME_RATE_25, false);
        let mut input = group_input(
            EssenceTypeGroup::Avci,
            [with_header.clone(), without_header.clone(), without_header.clone()].concat(),
        );
        let mut state = ResolveState::new(None);
        resolve_input(&mut state, &mut input)?;
        assert_eq!(input.essence_type, Some(essence_type));
        assert_eq!(state.frame_rate(), FRAME_RATE_25);

        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.sample_data(), with_header.as_slice());
        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.sample_data(), without_header.as_slice());
        Ok(())
    }

    #[test]
    fn avc_profile_mismatch_warns_or_fails() -> Result<()> {
        let frame = synth_avci_frame(
            EssenceType::Avci(AvciClass::C100, HdScan::Progressive1080),
            Rational::new(30000, 1001),
            true,
        );
        let forced = EssenceType::Avc(AvcProfile::High);
        let parsed = EssenceType::Avc(AvcProfile::High422Intra);

        let mut input = RawInput::new(InputKind::Essence(forced), EssenceSource::memory(frame.clone()));
        let mut state = ResolveState::default();
        resolve_input(&mut state, &mut input)?;
        assert_eq!(input.essence_type, Some(parsed));
        assert_eq!(state.frame_rate(), FRAME_RATE_2997);

        let mut input = RawInput::new(InputKind::Essence(forced), EssenceSource::memory(frame));
        let mut state = ResolveState {
            fail_level: log::Level::Warn,
            ..Default::default()
        };
        let err = resolve_input(&mut state, &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::AvcProfileMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn regression_mode_requires_explicit_types() {
        let mut state = ResolveState {
            regression_test: true,
            ..Default::default()
        };
        let mut input = group_input(EssenceTypeGroup::Dv, Vec::new());
        let err = resolve_input(&mut state, &mut input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::GroupInRegressionTest(_))
        ));
    }
}

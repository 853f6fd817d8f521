use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, bail};
use log::debug;

use crate::process::pcm;
use crate::process::reader::RawEssenceReader;
use crate::process::wave::WaveReader;
use crate::structs::avc::AvcParser;
use crate::structs::essence_type::{DataDef, EssenceType, EssenceTypeGroup};
use crate::structs::mpeg2::Mpeg2Parser;
use crate::structs::rational::{Rational, SAMPLING_RATE_48K};
use crate::structs::rdd36::Rdd36Parser;
use crate::structs::vc2::Vc2Parser;
use crate::utils::errors::{GraphError, ReadError, ResolveError};

/// Access unit ceiling for AVC and MPEG-2 Long GOP.
pub const MAX_LONG_GOP_SAMPLE_SIZE: usize = 50_000_000;
/// Access unit ceiling for RDD-36 and VC-2.
pub const MAX_INTRA_SAMPLE_SIZE: usize = 100_000_000;

/// A property that is either unset, set explicitly, or filled with a default.
///
/// Defaults may be replaced later (for example by a value parsed from the
/// bitstream); explicit values never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptProp<T> {
    Unset,
    Set(T),
    Default(T),
}

impl<T> Default for OptProp<T> {
    fn default() -> Self {
        OptProp::Unset
    }
}

impl<T: Copy> OptProp<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            OptProp::Set(v) | OptProp::Default(v) => Some(*v),
            OptProp::Unset => None,
        }
    }

    pub fn value_or(&self, default: T) -> T {
        self.value().unwrap_or(default)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, OptProp::Set(_))
    }

    /// Stores `value` unless a value was set explicitly.
    pub fn set_default(&mut self, value: T) {
        if !self.is_set() {
            *self = OptProp::Default(value);
        }
    }
}

/// Where an input's bytes come from.
#[derive(Debug, Clone)]
pub enum EssenceSource {
    File { path: PathBuf, start_offset: u64 },
    Memory(Arc<[u8]>),
}

impl EssenceSource {
    pub fn file(path: impl Into<PathBuf>, start_offset: u64) -> Self {
        EssenceSource::File {
            path: path.into(),
            start_offset,
        }
    }

    pub fn memory(data: impl Into<Arc<[u8]>>) -> Self {
        EssenceSource::Memory(data.into())
    }

    /// Opens a fresh stream positioned at the start offset.
    pub fn open(&self) -> io::Result<Box<dyn Read>> {
        match self {
            EssenceSource::File { path, start_offset } => {
                let mut file = File::open(path)?;
                if *start_offset > 0 {
                    file.seek(SeekFrom::Start(*start_offset))?;
                }
                Ok(Box::new(BufReader::new(file)))
            }
            EssenceSource::Memory(data) => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }

    pub fn name(&self) -> String {
        match self {
            EssenceSource::File { path, .. } => path.display().to_string(),
            EssenceSource::Memory(_) => "<memory>".into(),
        }
    }
}

/// Essence tag given for an input before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Probe the bitstream to pick the type within the group.
    Group(EssenceTypeGroup),
    Essence(EssenceType),
    Wave,
}

impl FromStr for InputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "dv" => InputKind::Group(EssenceTypeGroup::Dv),
            "d10" => InputKind::Group(EssenceTypeGroup::D10),
            "mpeg2lg" => InputKind::Group(EssenceTypeGroup::Mpeg2Lg),
            "vc3" => InputKind::Group(EssenceTypeGroup::Vc3),
            "avci" => InputKind::Group(EssenceTypeGroup::Avci),
            "avc" => InputKind::Group(EssenceTypeGroup::Avc),
            "wave" | "wav" => InputKind::Wave,
            "pcm" => InputKind::Essence(EssenceType::Pcm),
            "anc" => InputKind::Essence(EssenceType::Anc),
            "vbi" => InputKind::Essence(EssenceType::Vbi),
            _ => InputKind::Essence(s.parse()?),
        })
    }
}

impl Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Group(group) => write!(f, "{group}"),
            InputKind::Essence(essence_type) => write!(f, "{essence_type}"),
            InputKind::Wave => write!(f, "WAVE"),
        }
    }
}

/// Picture and data essence properties passed through to the writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureProps {
    pub aspect_ratio: OptProp<Rational>,
    pub afd: Option<u8>,
    pub component_depth: OptProp<u32>,
    pub input_height: Option<u32>,
    pub signal_standard: Option<u8>,
    pub frame_layout: Option<u8>,
    pub field_dominance: Option<u8>,
    pub transfer_characteristic: Option<u8>,
    pub coding_equations: Option<u8>,
    pub color_primaries: Option<u8>,
    pub color_siting: Option<u8>,
    pub black_ref_level: Option<u32>,
    pub white_ref_level: Option<u32>,
    pub color_range: Option<u32>,
    pub vc2_mode_flags: Option<u32>,
    pub rdd36_opaque: bool,
    /// Rewrite the aspect ratio in D10 sequence headers.
    pub d10_bitstream_aspect: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundProps {
    pub sampling_rate: Rational,
    pub bits_per_sample: u32,
    pub channel_count: u32,
    pub locked: Option<bool>,
    pub audio_ref_level: Option<i8>,
    pub dial_norm: Option<i8>,
    pub sequence_offset: Option<u8>,
}

impl Default for SoundProps {
    fn default() -> Self {
        Self {
            sampling_rate: SAMPLING_RATE_48K,
            bits_per_sample: 16,
            channel_count: 1,
            locked: None,
            audio_ref_level: None,
            dial_norm: None,
            sequence_offset: None,
        }
    }
}

impl SoundProps {
    pub fn block_align(&self) -> usize {
        pcm::sample_size(self.bits_per_sample) * self.channel_count as usize
    }
}

pub enum InputReader {
    Raw(RawEssenceReader),
    Wave(WaveReader),
}

impl InputReader {
    pub fn read_samples(&mut self, num_samples: u32) -> Result<u32> {
        match self {
            InputReader::Raw(reader) => reader.read_samples(num_samples),
            InputReader::Wave(reader) => reader.read_samples(num_samples),
        }
    }

    /// Samples from the last read, interleaved for multi-channel sound.
    pub fn sample_data(&self) -> &[u8] {
        match self {
            InputReader::Raw(reader) => reader.sample_data(),
            InputReader::Wave(reader) => reader.sample_data(),
        }
    }

    pub fn num_samples(&self) -> u32 {
        match self {
            InputReader::Raw(reader) => reader.num_samples(),
            InputReader::Wave(reader) => reader.num_samples(),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        match self {
            InputReader::Raw(reader) => reader.reset(),
            InputReader::Wave(reader) => reader.reset(),
        }
    }
}

/// One physical essence input.
pub struct RawInput {
    pub kind: InputKind,
    pub essence_type: Option<EssenceType>,
    pub source: EssenceSource,
    pub max_length: Option<u64>,
    pub picture: PictureProps,
    pub sound: SoundProps,
    /// Constant frame size of ANC or VBI data.
    pub data_const_size: Option<u32>,
    /// Treat field coded 1080 line AVC-Intra as progressive (`Some(true)`) or interlaced.
    pub avci_guess_progressive: Option<bool>,
    pub d10_fixed_frame_size: bool,
    pub disabled: bool,
    sample_sequence: Vec<u32>,
    sample_sequence_offset: usize,
    reader: Option<InputReader>,
}

impl RawInput {
    pub fn new(kind: InputKind, source: EssenceSource) -> Self {
        let essence_type = match kind {
            InputKind::Essence(essence_type) => Some(essence_type),
            InputKind::Wave => Some(EssenceType::Pcm),
            InputKind::Group(_) => None,
        };
        Self {
            kind,
            essence_type,
            source,
            max_length: None,
            picture: PictureProps::default(),
            sound: SoundProps::default(),
            data_const_size: None,
            avci_guess_progressive: None,
            d10_fixed_frame_size: false,
            disabled: false,
            sample_sequence: vec![1],
            sample_sequence_offset: 0,
            reader: None,
        }
    }

    pub fn name(&self) -> String {
        self.source.name()
    }

    pub fn essence_group(&self) -> Option<EssenceTypeGroup> {
        match self.kind {
            InputKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn is_wave(&self) -> bool {
        self.kind == InputKind::Wave
    }

    pub fn resolved_type(&self) -> Result<EssenceType> {
        match self.essence_type {
            Some(essence_type) => Ok(essence_type),
            None => bail!(ResolveError::Unresolved(self.name())),
        }
    }

    pub fn data_def(&self) -> Option<DataDef> {
        self.essence_type.map(EssenceType::data_def)
    }

    /// Opens the reader, or rewinds it when already open. Wave inputs take
    /// their sound properties from the file header.
    pub fn open(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.as_mut() {
            reader.reset()?;
            self.sample_sequence_offset = 0;
            return Ok(());
        }

        let reader = if self.is_wave() {
            let reader = WaveReader::open(self.source.clone())?;
            let format = reader.format();
            self.sound.sampling_rate = format.sampling_rate();
            self.sound.bits_per_sample = format.bits_per_sample as u32;
            self.sound.channel_count = format.channel_count as u32;
            InputReader::Wave(reader)
        } else {
            InputReader::Raw(RawEssenceReader::open(
                self.source.clone(),
                self.max_length,
            )?)
        };
        self.reader = Some(reader);
        self.sample_sequence_offset = 0;
        Ok(())
    }

    /// Releases the reader.
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn reader(&self) -> Result<&InputReader> {
        match &self.reader {
            Some(reader) => Ok(reader),
            None => bail!(ReadError::NotOpen),
        }
    }

    pub fn raw_reader_mut(&mut self) -> Option<&mut RawEssenceReader> {
        match self.reader.as_mut() {
            Some(InputReader::Raw(reader)) => Some(reader),
            _ => None,
        }
    }

    pub fn sample_sequence(&self) -> &[u32] {
        &self.sample_sequence
    }

    pub fn set_sample_sequence(&mut self, sequence: Vec<u32>) {
        self.sample_sequence = if sequence.is_empty() {
            vec![1]
        } else {
            sequence
        };
        self.sample_sequence_offset = 0;
    }

    /// Whether the cadence is one sample per edit unit.
    pub fn has_unit_sample_sequence(&self) -> bool {
        self.sample_sequence == [1]
    }

    /// Reads the next edit unit.
    ///
    /// With `max_samples_per_read` of 1 this reads the next cadence entry and
    /// returns 1 if all of it was read, else 0. Larger values read a batch of
    /// up to that many samples and return the count.
    pub fn read_samples(&mut self, max_samples_per_read: u32) -> Result<u32> {
        let Some(reader) = self.reader.as_mut() else {
            bail!(ReadError::NotOpen);
        };

        if max_samples_per_read == 1 {
            let num_frame_samples = self.sample_sequence[self.sample_sequence_offset];
            self.sample_sequence_offset =
                (self.sample_sequence_offset + 1) % self.sample_sequence.len();
            let num_read = reader.read_samples(num_frame_samples)?;
            Ok(u32::from(num_read == num_frame_samples))
        } else {
            reader.read_samples(max_samples_per_read)
        }
    }

    /// Sets how the raw reader splits the stream into samples, for the
    /// resolved essence type at `frame_rate`.
    pub fn configure_reader(&mut self, frame_rate: Rational, regression_test: bool) -> Result<()> {
        let essence_type = self.resolved_type()?;
        let name = self.name();
        let d10_fixed = self.d10_fixed_frame_size || regression_test;
        let block_align = self.sound.block_align();
        let data_const_size = self.data_const_size;
        let Some(reader) = self.raw_reader_mut() else {
            return Ok(());
        };

        match essence_type {
            EssenceType::Dv(_) | EssenceType::Vc3(_) | EssenceType::Unc(_) => {
                if reader.fixed_sample_size().is_none() {
                    if let Some(size) = essence_type.fixed_sample_size(frame_rate) {
                        reader.set_fixed_sample_size(size as usize);
                    }
                }
            }
            EssenceType::D10(variant) => {
                if reader.fixed_sample_size().is_none() {
                    if d10_fixed {
                        reader.set_fixed_sample_size(variant.frame_size(frame_rate) as usize);
                    } else {
                        reader.set_essence_parser(Box::new(Mpeg2Parser::default()));
                        reader.set_check_max_sample_size(MAX_LONG_GOP_SAMPLE_SIZE);
                    }
                }
            }
            EssenceType::Avci(..) => {
                if !reader.has_framing() {
                    reader.set_essence_parser(Box::new(AvcParser::default()));
                    reader.set_check_max_sample_size(MAX_LONG_GOP_SAMPLE_SIZE);
                }
            }
            EssenceType::Avc(_) => {
                reader.set_essence_parser(Box::new(AvcParser::default()));
                reader.set_check_max_sample_size(MAX_LONG_GOP_SAMPLE_SIZE);
            }
            EssenceType::Mpeg2Lg(_) => {
                reader.set_essence_parser(Box::new(Mpeg2Parser::default()));
                reader.set_check_max_sample_size(MAX_LONG_GOP_SAMPLE_SIZE);
            }
            EssenceType::Rdd36(_) => {
                reader.set_essence_parser(Box::new(Rdd36Parser::default()));
                reader.set_check_max_sample_size(MAX_INTRA_SAMPLE_SIZE);
            }
            EssenceType::Vc2 => {
                reader.set_essence_parser(Box::new(Vc2Parser::default()));
                reader.set_check_max_sample_size(MAX_INTRA_SAMPLE_SIZE);
            }
            EssenceType::Pcm => reader.set_fixed_sample_size(block_align),
            EssenceType::Anc | EssenceType::Vbi => match data_const_size {
                Some(size) if size > 0 => reader.set_fixed_sample_size(size as usize),
                _ => bail!(GraphError::MissingConstSize(essence_type.name(), name)),
            },
        }
        debug!("{name}: reader configured for {essence_type}");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_prop_defaults_never_replace_set_values() {
        let mut prop = OptProp::default();
        assert_eq!(prop.value(), None);
        prop.set_default(3);
        assert_eq!(prop, OptProp::Default(3));
        prop.set_default(4);
        assert_eq!(prop.value(), Some(4));

        let mut prop = OptProp::Set(1);
        prop.set_default(2);
        assert_eq!(prop.value_or(0), 1);
    }

    #[test]
    fn input_kinds() -> Result<()> {
        assert_eq!(
            "DV".parse::<InputKind>()?,
            InputKind::Group(EssenceTypeGroup::Dv)
        );
        assert_eq!("wav".parse::<InputKind>()?, InputKind::Wave);
        assert_eq!(
            "vc3_1080i_1242".parse::<InputKind>()?,
            InputKind::Essence(EssenceType::Vc3(
                crate::structs::essence_type::Vc3Variant::Id1242
            ))
        );
        assert!("mjpeg".parse::<InputKind>().is_err());
        Ok(())
    }

    #[test]
    fn cadence_reads() -> Result<()> {
        // 16 bit mono, 5 samples
        let mut input = RawInput::new(
            InputKind::Essence(EssenceType::Pcm),
            EssenceSource::memory((0..10u8).collect::<Vec<_>>()),
        );
        input.open()?;
        input.configure_reader(Rational::new(25, 1), false)?;
        input.set_sample_sequence(vec![3, 2]);

        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.num_samples(), 3);
        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.sample_data(), &[6, 7, 8, 9]);
        assert_eq!(input.read_samples(1)?, 0);

        input.open()?;
        assert_eq!(input.read_samples(1920)?, 5);

        input.close();
        assert!(input.read_samples(1).is_err());
        Ok(())
    }

    #[test]
    fn data_inputs_need_a_const_size() -> Result<()> {
        let mut input = RawInput::new(
            InputKind::Essence(EssenceType::Anc),
            EssenceSource::memory(vec![0u8; 8]),
        );
        input.open()?;
        let err = input.configure_reader(Rational::new(25, 1), false).unwrap_err();
        assert!(err.downcast_ref::<GraphError>().is_some());

        input.data_const_size = Some(4);
        input.configure_reader(Rational::new(25, 1), false)?;
        assert_eq!(input.read_samples(1)?, 1);
        assert_eq!(input.reader()?.sample_data().len(), 4);
        Ok(())
    }
}

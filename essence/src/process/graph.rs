//! Input and output track arena.
//!
//! Built once from the track maps and never mutated afterwards. Input
//! tracks and output tracks refer to each other through index handles.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::debug;

use crate::process::cadence::shift_sample_sequence;
use crate::process::input::{PictureProps, RawInput};
use crate::process::track_map::{OutputTrackMap, TrackChannelMap};
use crate::process::writer::{ClipWriter, TrackHandle};
use crate::structs::avc::AVCI_HEADER_SIZE;
use crate::structs::avci_header::avci_header;
use crate::structs::essence_type::{DataDef, EssenceType};
use crate::structs::rational::Rational;
use crate::utils::errors::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputTrackId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputTrackId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub output: OutputTrackId,
    pub output_channel: u32,
    pub input_channel: u32,
}

/// An input used by at least one output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInputTrack {
    /// Index into the input list.
    pub input_index: usize,
    pub data_def: DataDef,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSlot {
    Input {
        track: InputTrackId,
        input_channel: u32,
    },
    Silence,
}

/// Sound track properties, taken from the first input feeding the track.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundInfo {
    pub sampling_rate: Rational,
    pub bits_per_sample: u32,
    pub channel_count: u32,
    pub sequence_offset: u8,
    pub locked: Option<bool>,
    pub audio_ref_level: Option<i8>,
    pub dial_norm: Option<i8>,
}

impl SoundInfo {
    fn from_input(input: &RawInput, channel_count: u32) -> Self {
        let sound = &input.sound;
        Self {
            sampling_rate: sound.sampling_rate,
            bits_per_sample: sound.bits_per_sample,
            channel_count,
            sequence_offset: sound.sequence_offset.unwrap_or(0),
            locked: sound.locked,
            audio_ref_level: sound.audio_ref_level,
            dial_norm: sound.dial_norm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTrack {
    pub essence_type: EssenceType,
    pub data_def: DataDef,
    pub handle: TrackHandle,
    pub slots: Vec<ChannelSlot>,
    pub sound: Option<SoundInfo>,
}

impl OutputTrack {
    pub fn is_silence_track(&self) -> bool {
        self.slots.iter().all(|slot| *slot == ChannelSlot::Silence)
    }
}

/// How AVC-Intra frames carry the parameter set header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AvciMode {
    /// No frame has a header; the track header must be supplied.
    NoFrameHeader,
    /// The first frame may or may not have a header.
    NoOrAllFrameHeader,
    /// Every frame has a header.
    #[default]
    AllFrameHeader,
}

/// File holding a 512 byte AVC-Intra header for one essence type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvciHeaderDonor {
    pub essence_type: EssenceType,
    pub path: PathBuf,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvciHeaderOptions {
    pub mode: AvciMode,
    pub donors: Vec<AvciHeaderDonor>,
    /// Use the built-in header, ahead of any donor.
    pub builtin: bool,
}

impl AvciHeaderOptions {
    fn header(&self, essence_type: EssenceType, frame_rate: Rational) -> Result<Option<Vec<u8>>> {
        if self.builtin {
            return avci_header(essence_type, frame_rate).map(Some);
        }
        match self.donors.iter().find(|d| d.essence_type == essence_type) {
            Some(donor) => read_avci_header(donor).map(Some),
            None => Ok(None),
        }
    }
}

fn read_avci_header(donor: &AvciHeaderDonor) -> Result<Vec<u8>> {
    let name = donor.path.display().to_string();
    let mut file = File::open(&donor.path)
        .with_context(|| format!("Failed to open AVC-Intra header file '{name}'"))?;
    file.seek(SeekFrom::Start(donor.offset))?;

    let mut header = vec![0u8; AVCI_HEADER_SIZE];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            bail!(GraphError::ShortAvciHeader(name))
        }
        Err(e) => Err(e.into()),
    }
}

/// Everything the writer needs to know about a track before writing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackConfig {
    pub picture: Option<PictureProps>,
    pub sound: Option<SoundInfo>,
    pub data_const_size: Option<u32>,
    pub avci_mode: Option<AvciMode>,
    pub avci_header: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackGraph {
    pub input_tracks: Vec<RawInputTrack>,
    pub output_tracks: Vec<OutputTrack>,
}

impl TrackGraph {
    /// Creates one writer track per map entry and links every real channel
    /// to the input track feeding it.
    pub fn build(
        maps: &[OutputTrackMap],
        inputs: &[RawInput],
        writer: &mut dyn ClipWriter,
    ) -> Result<Self> {
        let mut graph = Self::default();

        for map in maps {
            let output = OutputTrackId(graph.output_tracks.len());
            let handle = writer.create_track(map.essence_type)?;
            let mut slots = Vec::with_capacity(map.channels.len());
            let mut sound = None;

            for channel in &map.channels {
                match *channel {
                    TrackChannelMap::Input {
                        external_index,
                        input_channel,
                        output_channel,
                    } => {
                        let Some(input) = inputs.get(external_index) else {
                            bail!(GraphError::UnknownInput(external_index));
                        };
                        let track = graph.input_track(external_index, map.data_def);
                        graph.input_tracks[track.0].bindings.push(Binding {
                            output,
                            output_channel,
                            input_channel,
                        });
                        slots.push(ChannelSlot::Input {
                            track,
                            input_channel,
                        });
                        if map.data_def == DataDef::Sound && sound.is_none() {
                            sound = Some(SoundInfo::from_input(input, map.channels.len() as u32));
                        }
                    }
                    TrackChannelMap::Silence { .. } => slots.push(ChannelSlot::Silence),
                }
            }

            graph.output_tracks.push(OutputTrack {
                essence_type: map.essence_type,
                data_def: map.data_def,
                handle,
                slots,
                sound,
            });
        }

        graph.fill_silence_sound_info()?;
        Ok(graph)
    }

    fn input_track(&mut self, input_index: usize, data_def: DataDef) -> InputTrackId {
        match self
            .input_tracks
            .iter()
            .position(|t| t.input_index == input_index)
        {
            Some(i) => InputTrackId(i),
            None => {
                self.input_tracks.push(RawInputTrack {
                    input_index,
                    data_def,
                    bindings: Vec::new(),
                });
                InputTrackId(self.input_tracks.len() - 1)
            }
        }
    }

    fn fill_silence_sound_info(&mut self) -> Result<()> {
        let donor = self
            .output_tracks
            .iter()
            .find(|t| t.data_def == DataDef::Sound && !t.is_silence_track())
            .and_then(|t| t.sound.clone());

        for track in self
            .output_tracks
            .iter_mut()
            .filter(|t| t.data_def == DataDef::Sound && t.is_silence_track())
        {
            let Some(donor) = &donor else {
                bail!(GraphError::AllSoundSilence);
            };
            track.sound = Some(SoundInfo {
                channel_count: track.slots.len() as u32,
                ..donor.clone()
            });
        }
        Ok(())
    }

    pub fn output(&self, id: OutputTrackId) -> &OutputTrack {
        &self.output_tracks[id.0]
    }

    /// Sound tracks made of silence only.
    pub fn silence_tracks(&self) -> impl Iterator<Item = &OutputTrack> {
        self.output_tracks
            .iter()
            .filter(|t| t.data_def == DataDef::Sound && t.is_silence_track())
    }

    /// Pushes the input properties of every output track to the writer.
    pub fn configure_tracks(
        &self,
        inputs: &[RawInput],
        writer: &mut dyn ClipWriter,
        avci: &AvciHeaderOptions,
    ) -> Result<()> {
        let frame_rate = writer.frame_rate();

        for track in &self.output_tracks {
            let mut config = TrackConfig {
                sound: track.sound.clone(),
                ..Default::default()
            };
            let input = track.slots.iter().find_map(|slot| match *slot {
                ChannelSlot::Input { track, .. } => {
                    Some(&inputs[self.input_tracks[track.0].input_index])
                }
                ChannelSlot::Silence => None,
            });

            if let Some(input) = input {
                match track.data_def {
                    DataDef::Picture => {
                        let mut picture = input.picture.clone();
                        if let EssenceType::Rdd36(_) = track.essence_type {
                            picture.component_depth.set_default(10);
                        }
                        config.picture = Some(picture);
                    }
                    DataDef::Data => config.data_const_size = input.data_const_size,
                    DataDef::Sound => {}
                }
            }

            if let EssenceType::Avci(..) = track.essence_type {
                config.avci_mode = Some(avci.mode);
                config.avci_header = avci.header(track.essence_type, frame_rate)?;
            }

            writer.configure_track(track.handle, &config)?;
        }
        Ok(())
    }

    /// Sets the reader framing and the per-edit-unit sample cadence of every
    /// input in the graph.
    pub fn setup_readers(
        &self,
        inputs: &mut [RawInput],
        writer: &dyn ClipWriter,
        regression_test: bool,
    ) -> Result<()> {
        let frame_rate = writer.frame_rate();

        for track in &self.input_tracks {
            let input = &mut inputs[track.input_index];
            input.configure_reader(frame_rate, regression_test)?;

            let sequence = match (track.data_def, track.bindings.first()) {
                (DataDef::Sound, Some(binding)) => {
                    let output = self.output(binding.output);
                    let sequence =
                        writer.sound_sample_sequence(output.handle, input.sound.sampling_rate)?;
                    let offset = output.sound.as_ref().map_or(0, |s| s.sequence_offset);
                    shift_sample_sequence(&sequence, offset as usize)
                }
                _ => vec![1],
            };
            debug!("{}: sample sequence {sequence:?}", input.name());
            input.set_sample_sequence(sequence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::input::{EssenceSource, InputKind};
    use crate::process::track_map::{InputTrackInfo, TrackMapper};
    use crate::process::writer::memory::MemoryClipWriter;
    use crate::structs::essence_type::{AvciClass, DvVariant, HdScan, Rdd36Profile};
    use crate::structs::rational::{FRAME_RATE_25, FRAME_RATE_2997};

    fn pcm(channels: u32) -> RawInput {
        let mut input = RawInput::new(
            InputKind::Essence(EssenceType::Pcm),
            EssenceSource::memory(Vec::new()),
        );
        input.sound.channel_count = channels;
        input.sound.bits_per_sample = 24;
        input
    }

    fn picture(essence_type: EssenceType) -> RawInput {
        RawInput::new(InputKind::Essence(essence_type), EssenceSource::memory(Vec::new()))
    }

    fn map(expr: Option<&str>, inputs: &[RawInput]) -> Result<Vec<OutputTrackMap>> {
        let infos: Vec<InputTrackInfo> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| InputTrackInfo {
                external_index: i,
                essence_type: input.essence_type.unwrap_or(EssenceType::Pcm),
                channel_count: input.sound.channel_count,
                bits_per_sample: input.sound.bits_per_sample,
                name: input.name(),
            })
            .collect();
        let mapper = match expr {
            Some(expr) => expr.parse()?,
            None => TrackMapper::default(),
        };
        Ok(mapper.map_tracks(&infos)?.0)
    }

    #[test]
    fn bindings_link_both_sides() -> Result<()> {
        let inputs = [pcm(2), picture(EssenceType::Dv(DvVariant::Iec25))];
        let maps = map(Some("m0,1"), &inputs)?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = TrackGraph::build(&maps, &inputs, &mut writer)?;

        assert_eq!(writer.tracks.len(), 3);
        assert_eq!(graph.input_tracks.len(), 2);
        assert_eq!(
            graph.input_tracks[0].bindings,
            [
                Binding {
                    output: OutputTrackId(0),
                    output_channel: 0,
                    input_channel: 0,
                },
                Binding {
                    output: OutputTrackId(1),
                    output_channel: 0,
                    input_channel: 1,
                },
            ]
        );
        assert_eq!(graph.input_tracks[1].data_def, DataDef::Picture);
        assert_eq!(graph.output_tracks[2].handle, TrackHandle(2));
        assert_eq!(graph.output_tracks[1].sound.as_ref().map(|s| s.channel_count), Some(1));
        Ok(())
    }

    #[test]
    fn silence_tracks_borrow_sound_info() -> Result<()> {
        let mut inputs = [pcm(1)];
        inputs[0].sound.dial_norm = Some(-20);
        let maps = map(Some("0,s1;s2"), &inputs)?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = TrackGraph::build(&maps, &inputs, &mut writer)?;

        assert!(!graph.output_tracks[0].is_silence_track());
        assert_eq!(graph.silence_tracks().count(), 1);
        let sound = graph.output_tracks[1].sound.as_ref().unwrap();
        assert_eq!(sound.channel_count, 2);
        assert_eq!(sound.bits_per_sample, 24);
        assert_eq!(sound.dial_norm, Some(-20));

        let maps = map(Some("s2"), &[])?;
        let err = TrackGraph::build(&maps, &[], &mut writer).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GraphError>(),
            Some(GraphError::AllSoundSilence)
        ));
        Ok(())
    }

    #[test]
    fn track_configs() -> Result<()> {
        let avci = EssenceType::Avci(AvciClass::C100, HdScan::Interlaced1080);
        let mut inputs = [
            picture(EssenceType::Rdd36(Rdd36Profile::Std422)),
            picture(avci),
            picture(EssenceType::Anc),
        ];
        inputs[2].data_const_size = Some(24);
        let maps = map(None, &inputs)?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = TrackGraph::build(&maps, &inputs, &mut writer)?;
        let options = AvciHeaderOptions {
            mode: AvciMode::NoFrameHeader,
            builtin: true,
            ..Default::default()
        };
        graph.configure_tracks(&inputs, &mut writer, &options)?;

        let configs: Vec<&TrackConfig> =
            writer.tracks.iter().map(|t| t.config.as_ref().unwrap()).collect();
        let depth = configs[0].picture.as_ref().unwrap().component_depth;
        assert_eq!(depth.value(), Some(10));
        assert_eq!(configs[1].avci_mode, Some(AvciMode::NoFrameHeader));
        assert_eq!(configs[1].avci_header.as_ref().map(Vec::len), Some(AVCI_HEADER_SIZE));
        assert_eq!(configs[2].data_const_size, Some(24));

        inputs[0].picture.component_depth = crate::process::input::OptProp::Set(12);
        graph.configure_tracks(&inputs, &mut writer, &options)?;
        let config = writer.tracks[0].config.as_ref().unwrap();
        assert_eq!(config.picture.as_ref().unwrap().component_depth.value(), Some(12));
        Ok(())
    }

    #[test]
    fn short_avci_header_donor() -> Result<()> {
        let avci = EssenceType::Avci(AvciClass::C50, HdScan::Progressive720);
        let path = std::env::temp_dir().join(format!("essence-avci-head-{}", std::process::id()));
        std::fs::write(&path, vec![0u8; 600])?;

        let inputs = [picture(avci)];
        let maps = map(None, &inputs)?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = TrackGraph::build(&maps, &inputs, &mut writer)?;

        let mut options = AvciHeaderOptions {
            donors: vec![AvciHeaderDonor {
                essence_type: avci,
                path: path.clone(),
                offset: 88,
            }],
            ..Default::default()
        };
        graph.configure_tracks(&inputs, &mut writer, &options)?;
        let header = writer.tracks[0].config.as_ref().unwrap().avci_header.clone();
        assert_eq!(header.map(|h| h.len()), Some(AVCI_HEADER_SIZE));

        options.donors[0].offset = 89;
        let err = graph.configure_tracks(&inputs, &mut writer, &options).unwrap_err();
        std::fs::remove_file(&path)?;
        assert!(matches!(
            err.downcast_ref::<GraphError>(),
            Some(GraphError::ShortAvciHeader(_))
        ));
        Ok(())
    }

    #[test]
    fn reader_cadence() -> Result<()> {
        let mut inputs = [pcm(1), picture(EssenceType::Anc)];
        inputs[0].sound.sequence_offset = Some(2);
        inputs[1].data_const_size = Some(8);
        for input in inputs.iter_mut() {
            input.open()?;
        }
        let maps = map(None, &inputs)?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_2997);
        let graph = TrackGraph::build(&maps, &inputs, &mut writer)?;
        graph.setup_readers(&mut inputs, &writer, false)?;

        assert_eq!(inputs[0].sample_sequence(), [1602, 1601, 1602, 1602, 1601]);
        assert_eq!(inputs[1].sample_sequence(), [1]);
        Ok(())
    }
}

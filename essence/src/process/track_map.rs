//! Sound channel routing.
//!
//! Channel indexes in a routing expression are global: the channels of all
//! sound inputs numbered from 0 in input order.
//!
//! ```text
//! expr    := 'mono' | 'stereo' | 'singlemca' | group (';' group)*
//! group   := ['m'] item (',' item)*
//! item    := index | index '-' index | 's' count
//! ```
//!
//! Each group becomes one output track, or one mono track per channel when
//! prefixed with `m`. `sN` inserts N silent channels.

use std::fmt::Write;
use std::str::FromStr;

use anyhow::{Result, bail};

use crate::structs::essence_type::{DataDef, EssenceType};
use crate::utils::errors::MapError;

/// Most channels a single group of a map expression may produce.
pub const MAX_TRACK_CHANNELS: u32 = 64;

/// Input descriptor seen by the mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTrackInfo {
    /// Index of the input in the caller's input list.
    pub external_index: usize,
    pub essence_type: EssenceType,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    pub name: String,
}

impl InputTrackInfo {
    pub fn data_def(&self) -> DataDef {
        self.essence_type.data_def()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChannelMap {
    Input {
        external_index: usize,
        input_channel: u32,
        output_channel: u32,
    },
    Silence {
        output_channel: u32,
    },
}

impl TrackChannelMap {
    pub fn output_channel(&self) -> u32 {
        match *self {
            TrackChannelMap::Input { output_channel, .. }
            | TrackChannelMap::Silence { output_channel } => output_channel,
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, TrackChannelMap::Silence { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTrackMap {
    pub essence_type: EssenceType,
    pub data_def: DataDef,
    pub channels: Vec<TrackChannelMap>,
}

impl OutputTrackMap {
    fn sound(slots: &[Slot]) -> Self {
        let channels = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match *slot {
                Slot::Channel(global) => TrackChannelMap::Input {
                    external_index: global.external_index,
                    input_channel: global.input_channel,
                    output_channel: i as u32,
                },
                Slot::Silence => TrackChannelMap::Silence {
                    output_channel: i as u32,
                },
            })
            .collect();
        Self {
            essence_type: EssenceType::Pcm,
            data_def: DataDef::Sound,
            channels,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.channels.iter().all(TrackChannelMap::is_silence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapItem {
    Channel(u32),
    Range(u32, u32),
    Silence(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MapGroup {
    mono: bool,
    items: Vec<MapItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum MapRule {
    /// One track per sound input.
    #[default]
    PerInput,
    Mono,
    Stereo,
    SingleMca,
    Groups(Vec<MapGroup>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GlobalChannel {
    external_index: usize,
    input_channel: u32,
    bits_per_sample: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Channel(GlobalChannel),
    Silence,
}

/// Maps input tracks to output tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMapper {
    rule: MapRule,
}

impl FromStr for TrackMapper {
    type Err = anyhow::Error;

    fn from_str(expr: &str) -> Result<Self> {
        let invalid = |reason: &str| MapError::InvalidExpression {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let parse_index = |s: &str| -> Result<u32> {
            match s.trim().parse() {
                Ok(index) => Ok(index),
                Err(_) => bail!(invalid(&format!("'{s}' is not a channel index"))),
            }
        };

        let rule = match expr.trim().to_ascii_lowercase().as_str() {
            "mono" => MapRule::Mono,
            "stereo" => MapRule::Stereo,
            "singlemca" => MapRule::SingleMca,
            _ => {
                let mut groups = Vec::new();
                for group in expr.split(';') {
                    let group = group.trim();
                    let (mono, body) = match group.strip_prefix(['m', 'M']) {
                        Some(body) => (true, body),
                        None => (false, group),
                    };
                    if body.trim().is_empty() {
                        bail!(invalid("empty group"));
                    }

                    let mut items = Vec::new();
                    for item in body.split(',') {
                        let item = item.trim();
                        if let Some(count) = item.strip_prefix(['s', 'S']) {
                            items.push(MapItem::Silence(parse_index(count)?));
                        } else if let Some((first, last)) = item.split_once('-') {
                            let (first, last) = (parse_index(first)?, parse_index(last)?);
                            if first > last {
                                bail!(invalid(&format!("descending range '{item}'")));
                            }
                            items.push(MapItem::Range(first, last));
                        } else {
                            items.push(MapItem::Channel(parse_index(item)?));
                        }
                    }
                    let width: u64 = items
                        .iter()
                        .map(|item| match *item {
                            MapItem::Channel(_) => 1,
                            MapItem::Range(first, last) => u64::from(last - first) + 1,
                            MapItem::Silence(n) => u64::from(n),
                        })
                        .sum();
                    if width > u64::from(MAX_TRACK_CHANNELS) {
                        bail!(invalid(&format!(
                            "group '{group}' has more than {MAX_TRACK_CHANNELS} channels"
                        )));
                    }
                    groups.push(MapGroup { mono, items });
                }
                MapRule::Groups(groups)
            }
        };

        Ok(Self { rule })
    }
}

impl TrackMapper {
    /// Maps `inputs` to output tracks. Sound tracks come first, then every
    /// non-sound input 1:1 in input order.
    ///
    /// Returns the output tracks and the external indexes of sound inputs
    /// that no output references.
    pub fn map_tracks(&self, inputs: &[InputTrackInfo]) -> Result<(Vec<OutputTrackMap>, Vec<usize>)> {
        let sound_inputs: Vec<&InputTrackInfo> = inputs
            .iter()
            .filter(|input| input.data_def() == DataDef::Sound)
            .collect();
        let channels: Vec<GlobalChannel> = sound_inputs
            .iter()
            .flat_map(|input| {
                (0..input.channel_count).map(|input_channel| GlobalChannel {
                    external_index: input.external_index,
                    input_channel,
                    bits_per_sample: input.bits_per_sample,
                })
            })
            .collect();

        let track_slots = self.sound_track_slots(&sound_inputs, &channels)?;

        let mut outputs = Vec::with_capacity(track_slots.len() + inputs.len());
        for slots in &track_slots {
            let mut bits = slots.iter().filter_map(|slot| match slot {
                Slot::Channel(channel) => Some(channel.bits_per_sample),
                Slot::Silence => None,
            });
            if let Some(first) = bits.next() {
                if bits.any(|b| b != first) {
                    bail!(MapError::MixedBitDepth(outputs.len()));
                }
            }
            outputs.push(OutputTrackMap::sound(slots));
        }

        for input in inputs.iter().filter(|i| i.data_def() != DataDef::Sound) {
            outputs.push(OutputTrackMap {
                essence_type: input.essence_type,
                data_def: input.data_def(),
                channels: vec![TrackChannelMap::Input {
                    external_index: input.external_index,
                    input_channel: 0,
                    output_channel: 0,
                }],
            });
        }

        if outputs.is_empty() {
            bail!(MapError::NoOutputTracks);
        }

        let unused = sound_inputs
            .iter()
            .map(|input| input.external_index)
            .filter(|&index| {
                !track_slots
                    .iter()
                    .flatten()
                    .any(|slot| matches!(slot, Slot::Channel(c) if c.external_index == index))
            })
            .collect();

        Ok((outputs, unused))
    }

    fn sound_track_slots(
        &self,
        sound_inputs: &[&InputTrackInfo],
        channels: &[GlobalChannel],
    ) -> Result<Vec<Vec<Slot>>> {
        let all = || channels.iter().copied().map(Slot::Channel);

        Ok(match &self.rule {
            MapRule::PerInput => sound_inputs
                .iter()
                .map(|input| {
                    all()
                        .filter(|slot| {
                            matches!(slot, Slot::Channel(c) if c.external_index == input.external_index)
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|slots| !slots.is_empty())
                .collect(),
            MapRule::Mono => all().map(|slot| vec![slot]).collect(),
            MapRule::Stereo => all()
                .collect::<Vec<_>>()
                .chunks(2)
                .map(<[Slot]>::to_vec)
                .collect(),
            MapRule::SingleMca if channels.is_empty() => Vec::new(),
            MapRule::SingleMca => vec![all().collect()],
            MapRule::Groups(groups) => {
                let count = channels.len() as u32;
                let channel = |index: u32| -> Result<Slot> {
                    match channels.get(index as usize) {
                        Some(channel) => Ok(Slot::Channel(*channel)),
                        None => bail!(MapError::ChannelOutOfRange { index, count }),
                    }
                };

                let mut tracks = Vec::new();
                for group in groups {
                    let mut slots = Vec::new();
                    for item in &group.items {
                        match *item {
                            MapItem::Channel(index) => slots.push(channel(index)?),
                            MapItem::Range(first, last) => {
                                for index in first..=last {
                                    slots.push(channel(index)?);
                                }
                            }
                            MapItem::Silence(n) => {
                                slots.extend(std::iter::repeat_n(Slot::Silence, n as usize))
                            }
                        }
                    }
                    if group.mono {
                        tracks.extend(slots.into_iter().map(|slot| vec![slot]));
                    } else if !slots.is_empty() {
                        tracks.push(slots);
                    }
                }
                tracks
            }
        })
    }
}

/// Human readable listing of output tracks and where each channel comes from.
pub fn dump_track_map(outputs: &[OutputTrackMap], inputs: &[InputTrackInfo]) -> String {
    let mut text = String::new();
    for (i, output) in outputs.iter().enumerate() {
        let _ = writeln!(
            text,
            "Track {i}: {} ({}, {} channels)",
            output.essence_type,
            output.data_def,
            output.channels.len()
        );
        for channel in &output.channels {
            match *channel {
                TrackChannelMap::Input {
                    external_index,
                    input_channel,
                    output_channel,
                } => {
                    let name = inputs
                        .iter()
                        .find(|input| input.external_index == external_index)
                        .map_or("?", |input| input.name.as_str());
                    let _ = writeln!(text, "  {output_channel} <- {name}:{input_channel}");
                }
                TrackChannelMap::Silence { output_channel } => {
                    let _ = writeln!(text, "  {output_channel} <- silence");
                }
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::essence_type::DvVariant;

    fn sound(external_index: usize, channel_count: u32, bits_per_sample: u32) -> InputTrackInfo {
        InputTrackInfo {
            external_index,
            essence_type: EssenceType::Pcm,
            channel_count,
            bits_per_sample,
            name: format!("a{external_index}.wav"),
        }
    }

    fn video(external_index: usize) -> InputTrackInfo {
        InputTrackInfo {
            external_index,
            essence_type: EssenceType::Dv(DvVariant::Iec25),
            channel_count: 1,
            bits_per_sample: 0,
            name: format!("v{external_index}.dv"),
        }
    }

    fn input_channels(output: &OutputTrackMap) -> Vec<Option<(usize, u32)>> {
        output
            .channels
            .iter()
            .map(|c| match *c {
                TrackChannelMap::Input {
                    external_index,
                    input_channel,
                    ..
                } => Some((external_index, input_channel)),
                TrackChannelMap::Silence { .. } => None,
            })
            .collect()
    }

    #[test]
    fn default_map_is_one_track_per_sound_input() -> Result<()> {
        let inputs = [video(0), sound(1, 1, 24), sound(2, 2, 24)];
        let (outputs, unused) = TrackMapper::default().map_tracks(&inputs)?;

        assert_eq!(outputs.len(), 3);
        assert_eq!(input_channels(&outputs[0]), [Some((1, 0))]);
        assert_eq!(input_channels(&outputs[1]), [Some((2, 0)), Some((2, 1))]);
        assert_eq!(outputs[2].data_def, DataDef::Picture);
        assert_eq!(outputs[2].essence_type, EssenceType::Dv(DvVariant::Iec25));
        assert!(unused.is_empty());
        Ok(())
    }

    #[test]
    fn keyword_maps() -> Result<()> {
        let inputs = [sound(0, 3, 16), sound(1, 2, 16)];

        let (outputs, _) = "mono".parse::<TrackMapper>()?.map_tracks(&inputs)?;
        assert_eq!(outputs.len(), 5);

        let (outputs, _) = "stereo".parse::<TrackMapper>()?.map_tracks(&inputs)?;
        assert_eq!(outputs.len(), 3);
        assert_eq!(input_channels(&outputs[1]), [Some((0, 2)), Some((1, 0))]);
        assert_eq!(input_channels(&outputs[2]), [Some((1, 1))]);

        let (outputs, _) = "singlemca".parse::<TrackMapper>()?.map_tracks(&inputs)?;
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].channels.len(), 5);
        Ok(())
    }

    #[test]
    fn group_expressions() -> Result<()> {
        let inputs = [sound(0, 2, 24), video(1), sound(2, 4, 24)];

        let mapper: TrackMapper = "m0,1; 2-3,s2 ;5".parse()?;
        let (outputs, unused) = mapper.map_tracks(&inputs)?;
        assert_eq!(outputs.len(), 5);
        assert_eq!(input_channels(&outputs[0]), [Some((0, 0))]);
        assert_eq!(input_channels(&outputs[1]), [Some((0, 1))]);
        assert_eq!(
            input_channels(&outputs[2]),
            [Some((2, 0)), Some((2, 1)), None, None]
        );
        assert_eq!(input_channels(&outputs[3]), [Some((2, 3))]);
        assert_eq!(outputs[4].data_def, DataDef::Picture);
        for output in &outputs {
            let indexes: Vec<u32> = output.channels.iter().map(|c| c.output_channel()).collect();
            assert_eq!(indexes, (0..output.channels.len() as u32).collect::<Vec<_>>());
        }
        assert!(unused.is_empty());

        let (_, unused) = "0".parse::<TrackMapper>()?.map_tracks(&inputs)?;
        assert_eq!(unused, [2]);

        // the same expression always gives the same map
        assert_eq!(mapper.map_tracks(&inputs)?, mapper.map_tracks(&inputs)?);
        Ok(())
    }

    #[test]
    fn invalid_maps() {
        let inputs = [sound(0, 2, 16), sound(1, 1, 24)];

        for expr in ["", "0;;1", "m", "x", "3-1", "0,s", "s4000000000", "s65", "0-64", "s60,0-4"] {
            let err = expr.parse::<TrackMapper>().unwrap_err();
            assert!(
                matches!(err.downcast_ref::<MapError>(), Some(MapError::InvalidExpression { .. })),
                "{expr}"
            );
        }

        let err = "0-3".parse::<TrackMapper>().unwrap().map_tracks(&inputs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::ChannelOutOfRange { index: 3, count: 3 })
        ));

        let err = "0,2".parse::<TrackMapper>().unwrap().map_tracks(&inputs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::MixedBitDepth(0))
        ));

        let err = TrackMapper::default().map_tracks(&[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::NoOutputTracks)
        ));
    }

    #[test]
    fn dump_lists_every_channel() -> Result<()> {
        let inputs = [sound(0, 1, 16)];
        let (outputs, _) = "0,s1".parse::<TrackMapper>()?.map_tracks(&inputs)?;
        let text = dump_track_map(&outputs, &inputs);
        assert_eq!(
            text,
            "Track 0: WAVE_PCM (sound, 2 channels)\n  0 <- a0.wav:0\n  1 <- silence\n"
        );
        Ok(())
    }
}

use anyhow::Result;

use crate::process::cadence;
use crate::process::graph::TrackConfig;
use crate::structs::essence_type::EssenceType;
use crate::structs::rational::Rational;

/// Index of a track created on a [`ClipWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackHandle(pub usize);

/// Destination clip. The wrap driver owns the call order: tracks are
/// created and configured, then `prepare_write`, then any number of
/// sample writes, then `complete_write`.
pub trait ClipWriter {
    /// Clip edit rate.
    fn frame_rate(&self) -> Rational;

    fn is_supported(&self, essence_type: EssenceType, rate: Rational) -> bool {
        essence_type.is_supported(rate)
    }

    fn create_track(&mut self, essence_type: EssenceType) -> Result<TrackHandle>;

    fn configure_track(&mut self, track: TrackHandle, config: &TrackConfig) -> Result<()>;

    /// Sound samples per edit unit of `track` at `sampling_rate`, one entry
    /// per frame of the repeating cycle.
    fn sound_sample_sequence(
        &self,
        _track: TrackHandle,
        sampling_rate: Rational,
    ) -> Result<Vec<u32>> {
        cadence::sound_sample_sequence(sampling_rate, self.frame_rate())
    }

    fn prepare_write(&mut self) -> Result<()>;

    /// Writes `num_samples` samples of one channel. Sound channels are
    /// written separately; other tracks always use channel 0.
    fn write_samples(
        &mut self,
        track: TrackHandle,
        channel: u32,
        data: &[u8],
        num_samples: u32,
    ) -> Result<()>;

    /// Appends `num_samples` samples of silence to every channel of a sound track.
    fn write_silence_samples(&mut self, track: TrackHandle, num_samples: u32) -> Result<()>;

    fn complete_write(&mut self) -> Result<()>;

    /// Clip duration in edit units so far.
    fn duration(&self) -> u64;
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct MemoryTrack {
        pub essence_type: Option<EssenceType>,
        pub config: Option<TrackConfig>,
        pub data: BTreeMap<u32, Vec<u8>>,
        pub samples: BTreeMap<u32, u64>,
        pub silence: u64,
    }

    /// Writer that keeps every track in memory, for tests.
    #[derive(Debug)]
    pub(crate) struct MemoryClipWriter {
        pub frame_rate: Rational,
        pub tracks: Vec<MemoryTrack>,
        pub prepared: bool,
        pub completed: bool,
        pub sample_sequence: Option<Vec<u32>>,
    }

    impl MemoryClipWriter {
        pub fn new(frame_rate: Rational) -> Self {
            Self {
                frame_rate,
                tracks: Vec::new(),
                prepared: false,
                completed: false,
                sample_sequence: None,
            }
        }
    }

    impl ClipWriter for MemoryClipWriter {
        fn frame_rate(&self) -> Rational {
            self.frame_rate
        }

        fn create_track(&mut self, essence_type: EssenceType) -> Result<TrackHandle> {
            self.tracks.push(MemoryTrack {
                essence_type: Some(essence_type),
                ..Default::default()
            });
            Ok(TrackHandle(self.tracks.len() - 1))
        }

        fn configure_track(&mut self, track: TrackHandle, config: &TrackConfig) -> Result<()> {
            self.tracks[track.0].config = Some(config.clone());
            Ok(())
        }

        fn sound_sample_sequence(
            &self,
            _track: TrackHandle,
            sampling_rate: Rational,
        ) -> Result<Vec<u32>> {
            match &self.sample_sequence {
                Some(sequence) => Ok(sequence.clone()),
                None => cadence::sound_sample_sequence(sampling_rate, self.frame_rate),
            }
        }

        fn prepare_write(&mut self) -> Result<()> {
            self.prepared = true;
            Ok(())
        }

        fn write_samples(
            &mut self,
            track: TrackHandle,
            channel: u32,
            data: &[u8],
            num_samples: u32,
        ) -> Result<()> {
            let track = &mut self.tracks[track.0];
            track.data.entry(channel).or_default().extend_from_slice(data);
            *track.samples.entry(channel).or_default() += u64::from(num_samples);
            Ok(())
        }

        fn write_silence_samples(&mut self, track: TrackHandle, num_samples: u32) -> Result<()> {
            self.tracks[track.0].silence += u64::from(num_samples);
            Ok(())
        }

        fn complete_write(&mut self) -> Result<()> {
            self.completed = true;
            Ok(())
        }

        fn duration(&self) -> u64 {
            let edit_units = |(i, track): (usize, &MemoryTrack)| {
                let samples = track.samples.get(&0).copied().unwrap_or(0) + track.silence;
                let Some(sound) = track.config.as_ref().and_then(|c| c.sound.as_ref()) else {
                    return samples;
                };
                match self.sound_sample_sequence(TrackHandle(i), sound.sampling_rate) {
                    Ok(seq) => {
                        let cycle: u64 = seq.iter().map(|&n| u64::from(n)).sum();
                        samples * seq.len() as u64 / cycle.max(1)
                    }
                    Err(_) => 0,
                }
            };
            self.tracks.iter().enumerate().map(edit_units).min().unwrap_or(0)
        }
    }
}

//! Wrap driver.
//!
//! A [`WrapJob`] takes a list of inputs through resolution, the support
//! check, track mapping, graph construction and reader setup, then runs the
//! multiplex loop against a [`ClipWriter`].
//!
//! ```no_run
//! use essence::process::input::{EssenceSource, InputKind, RawInput};
//! use essence::process::wrap::{WrapJob, WrapOptions, WrapOutcome};
//! # use essence::process::writer::ClipWriter;
//! # fn writer_for(_: essence::structs::rational::Rational) -> Box<dyn ClipWriter> { unimplemented!() }
//!
//! # fn main() -> anyhow::Result<()> {
//! let inputs = vec![
//!     RawInput::new("dv".parse()?, EssenceSource::file("video.dv", 0)),
//!     RawInput::new(InputKind::Wave, EssenceSource::file("audio.wav", 0)),
//! ];
//! let mut job = WrapJob::new(inputs, WrapOptions::default())?;
//! job.resolve()?;
//!
//! let mut writer = writer_for(job.frame_rate());
//! if let WrapOutcome::Completed { duration } = job.run(writer.as_mut(), None)? {
//!     println!("{duration} frames");
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Result, bail};
use log::{debug, info};

use crate::process::cadence;
use crate::process::graph::{AvciHeaderOptions, TrackGraph};
use crate::process::input::RawInput;
use crate::process::mux::{MuxConfig, run_mux};
use crate::process::resolve::{ResolveState, resolve_input};
use crate::process::track_map::{InputTrackInfo, TrackMapper, dump_track_map};
use crate::process::writer::ClipWriter;
use crate::structs::rational::Rational;
use crate::utils::errors::{MapError, WrapError};

#[derive(Debug, Clone, PartialEq)]
pub struct WrapOptions {
    /// Clip frame rate. Without it the rate comes from the bitstream, or 25.
    pub frame_rate: Option<Rational>,
    /// Sound channel routing expression.
    pub track_map: Option<String>,
    /// Require explicit essence types, sort tracks by data kind and allow
    /// truncation with `regtest_end`.
    pub regression_test: bool,
    pub regtest_end: Option<u64>,
    /// Maximum clip duration in edit units.
    pub duration: Option<u64>,
    pub rt_factor: Option<f32>,
    /// Log the track map before wrapping.
    pub dump_track_map: bool,
    /// Return the track map without wrapping.
    pub dump_track_map_exit: bool,
    pub avci: AvciHeaderOptions,
    /// Informational mismatches at or above this level are fatal.
    pub fail_level: log::Level,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            frame_rate: None,
            track_map: None,
            regression_test: false,
            regtest_end: None,
            duration: None,
            rt_factor: None,
            dump_track_map: false,
            dump_track_map_exit: false,
            avci: AvciHeaderOptions::default(),
            fail_level: log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapOutcome {
    Completed { duration: u64 },
    /// Stopped at `regtest_end` without completing the clip.
    Truncated { duration: u64 },
    /// The track map text, returned instead of wrapping.
    TrackMapDumped(String),
}

pub struct WrapJob {
    inputs: Vec<RawInput>,
    options: WrapOptions,
    mapper: TrackMapper,
    state: ResolveState,
    resolved: bool,
}

impl WrapJob {
    pub fn new(inputs: Vec<RawInput>, options: WrapOptions) -> Result<Self> {
        if inputs.is_empty() {
            bail!(WrapError::NoInputs);
        }
        let mapper = match &options.track_map {
            Some(expr) => expr.parse()?,
            None => TrackMapper::default(),
        };
        let state = ResolveState {
            regression_test: options.regression_test,
            fail_level: options.fail_level,
            ..ResolveState::new(options.frame_rate)
        };

        Ok(Self {
            inputs,
            options,
            mapper,
            state,
            resolved: false,
        })
    }

    /// Resolves the essence type of every enabled input, settling the clip
    /// frame rate on the way.
    pub fn resolve(&mut self) -> Result<()> {
        for input in self.inputs.iter_mut().filter(|i| !i.disabled) {
            resolve_input(&mut self.state, input)?;
        }
        self.resolved = true;
        Ok(())
    }

    pub fn frame_rate(&self) -> Rational {
        self.state.frame_rate()
    }

    pub fn inputs(&self) -> &[RawInput] {
        &self.inputs
    }

    pub fn run(
        &mut self,
        writer: &mut dyn ClipWriter,
        progress: Option<&mut dyn FnMut(u64)>,
    ) -> Result<WrapOutcome> {
        if !self.resolved {
            self.resolve()?;
        }
        if self.inputs.iter().all(|i| i.disabled) {
            bail!(MapError::NoEnabledInputs);
        }

        self.check_support(writer)?;

        let infos = self.track_infos()?;
        let (mut maps, unused) = self.mapper.map_tracks(&infos)?;
        for index in unused {
            let input = &mut self.inputs[index];
            info!("{}: not used by the track map, disabling", input.name());
            input.disabled = true;
            input.close();
        }
        if self.options.regression_test {
            maps.sort_by_key(|map| map.data_def);
        }

        let dump = dump_track_map(&maps, &infos);
        if self.options.dump_track_map_exit {
            return Ok(WrapOutcome::TrackMapDumped(dump));
        }
        if self.options.dump_track_map {
            for line in dump.lines() {
                info!("{line}");
            }
        }

        let graph = TrackGraph::build(&maps, &self.inputs, writer)?;
        graph.configure_tracks(&self.inputs, writer, &self.options.avci)?;
        graph.setup_readers(&mut self.inputs, writer, self.options.regression_test)?;

        writer.prepare_write()?;
        let config = MuxConfig {
            duration: self.options.duration,
            regtest_end: self.options.regtest_end,
            rt_factor: self.options.rt_factor,
        };
        let total = run_mux(&mut self.inputs, &graph, writer, &config, progress)?;
        debug!("Multiplexed {total} edit units");

        let truncated = self.options.regtest_end.is_some_and(|end| total >= end);
        let outcome = if truncated {
            info!("Stopped at regression test end point {total}");
            WrapOutcome::Truncated { duration: total }
        } else {
            writer.complete_write()?;
            WrapOutcome::Completed {
                duration: writer.duration(),
            }
        };

        for input in &mut self.inputs {
            input.close();
        }
        Ok(outcome)
    }

    fn check_support(&self, writer: &dyn ClipWriter) -> Result<()> {
        let frame_rate = writer.frame_rate();
        for input in self.inputs.iter().filter(|i| !i.disabled) {
            let essence_type = input.resolved_type()?;
            let rate = if essence_type.is_sound() {
                input.sound.sampling_rate
            } else {
                frame_rate
            };
            if !writer.is_supported(essence_type, rate) {
                bail!(WrapError::UnsupportedEssence {
                    essence: essence_type.to_string(),
                    rate: rate.to_string(),
                });
            }
            if essence_type.is_sound() {
                cadence::sound_sample_sequence(rate, frame_rate)?;
            }
        }
        Ok(())
    }

    fn track_infos(&self) -> Result<Vec<InputTrackInfo>> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.disabled)
            .map(|(external_index, input)| {
                Ok(InputTrackInfo {
                    external_index,
                    essence_type: input.resolved_type()?,
                    channel_count: input.sound.channel_count,
                    bits_per_sample: input.sound.bits_per_sample,
                    name: input.name(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::input::{EssenceSource, InputKind};
    use crate::process::wave::synth_wave;
    use crate::process::writer::memory::MemoryClipWriter;
    use crate::structs::dv::synth_dv_frame;
    use crate::structs::essence_type::{DvVariant, EssenceType, EssenceTypeGroup};
    use crate::structs::rational::FRAME_RATE_25;

    fn dv(frames: usize) -> RawInput {
        let data = synth_dv_frame(0x00, true, 0, 2).repeat(frames);
        RawInput::new(
            InputKind::Group(EssenceTypeGroup::Dv),
            EssenceSource::memory(data),
        )
    }

    fn wave(channels: u16, samples: usize) -> RawInput {
        let data: Vec<u8> = (0..samples * channels as usize)
            .flat_map(|i| ((i % channels as usize) as u16 + 1).to_le_bytes())
            .collect();
        RawInput::new(
            InputKind::Wave,
            EssenceSource::memory(synth_wave(channels, 16, 48000, &data)),
        )
    }

    fn wrap(
        inputs: Vec<RawInput>,
        options: WrapOptions,
    ) -> Result<(WrapOutcome, MemoryClipWriter)> {
        let mut job = WrapJob::new(inputs, options)?;
        job.resolve()?;
        let mut writer = MemoryClipWriter::new(job.frame_rate());
        let outcome = job.run(&mut writer, None)?;
        Ok((outcome, writer))
    }

    #[test]
    fn default_map_wraps_sound_and_picture() -> Result<()> {
        let inputs = vec![wave(1, 1920 * 3), wave(1, 1920 * 4), dv(5)];
        let (outcome, writer) = wrap(inputs, WrapOptions::default())?;

        assert_eq!(outcome, WrapOutcome::Completed { duration: 3 });
        assert!(writer.prepared && writer.completed);
        assert_eq!(writer.tracks.len(), 3);
        assert_eq!(writer.tracks[0].samples[&0], 1920 * 3);
        assert_eq!(writer.tracks[1].samples[&0], 1920 * 3);
        assert_eq!(
            writer.tracks[2].essence_type,
            Some(EssenceType::Dv(DvVariant::Iec25))
        );
        assert_eq!(writer.tracks[2].samples[&0], 3);
        assert_eq!(writer.tracks[2].data[&0].len(), 3 * 144_000);
        Ok(())
    }

    #[test]
    fn stereo_split_into_mono_tracks() -> Result<()> {
        let options = WrapOptions {
            track_map: Some("m0-1".into()),
            ..Default::default()
        };
        let (outcome, writer) = wrap(vec![wave(2, 1920 * 2)], options)?;

        assert_eq!(outcome, WrapOutcome::Completed { duration: 2 });
        assert_eq!(writer.tracks.len(), 2);
        assert_eq!(writer.tracks[0].data[&0][..4], [1, 0, 1, 0]);
        assert_eq!(writer.tracks[1].data[&0][..4], [2, 0, 2, 0]);
        let sound = writer.tracks[1].config.as_ref().and_then(|c| c.sound.clone());
        assert_eq!(sound.map(|s| s.channel_count), Some(1));
        Ok(())
    }

    #[test]
    fn silence_channels_and_tracks() -> Result<()> {
        let options = WrapOptions {
            track_map: Some("0,s1;s2".into()),
            ..Default::default()
        };
        let (outcome, writer) = wrap(vec![wave(1, 1920 * 2), dv(2)], options)?;

        assert_eq!(outcome, WrapOutcome::Completed { duration: 2 });
        let mixed = &writer.tracks[0];
        assert_eq!(mixed.samples[&0], 3840);
        assert_eq!(mixed.data[&1], vec![0u8; 3840 * 2]);
        let silent = &writer.tracks[1];
        assert_eq!(silent.silence, 3840);
        let sound = silent.config.as_ref().and_then(|c| c.sound.clone());
        assert_eq!(sound.map(|s| (s.channel_count, s.bits_per_sample)), Some((2, 16)));
        Ok(())
    }

    #[test]
    fn dump_and_exit() -> Result<()> {
        let options = WrapOptions {
            track_map: Some("0".into()),
            dump_track_map_exit: true,
            ..Default::default()
        };
        let (outcome, writer) = wrap(vec![wave(1, 10), wave(1, 10)], options)?;

        let WrapOutcome::TrackMapDumped(text) = outcome else {
            panic!("expected a track map dump, got {outcome:?}");
        };
        assert!(text.starts_with("Track 0: WAVE_PCM (sound, 1 channels)\n  0 <- <memory>:0"));
        assert!(writer.tracks.is_empty());
        assert!(!writer.prepared);
        Ok(())
    }

    #[test]
    fn regression_mode_sorts_and_truncates() -> Result<()> {
        let mut video = dv(4);
        video.kind = InputKind::Essence(EssenceType::Dv(DvVariant::Iec25));
        video.essence_type = Some(EssenceType::Dv(DvVariant::Iec25));
        let options = WrapOptions {
            regression_test: true,
            regtest_end: Some(2),
            ..Default::default()
        };
        let (outcome, writer) = wrap(vec![wave(1, 1920 * 4), video], options)?;

        assert_eq!(outcome, WrapOutcome::Truncated { duration: 2 });
        assert!(!writer.completed);
        assert_eq!(
            writer.tracks[0].essence_type,
            Some(EssenceType::Dv(DvVariant::Iec25))
        );
        assert_eq!(writer.tracks[1].samples[&0], 3840);
        Ok(())
    }

    #[test]
    fn rejected_jobs() -> Result<()> {
        let err = WrapJob::new(Vec::new(), WrapOptions::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WrapError>(),
            Some(WrapError::NoInputs)
        ));

        let mut input = RawInput::new(
            InputKind::Wave,
            EssenceSource::memory(synth_wave(1, 16, 44100, &[0; 8])),
        );
        let err = wrap(vec![input], WrapOptions::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WrapError>(),
            Some(WrapError::UnsupportedEssence { .. })
        ));

        input = wave(1, 10);
        input.disabled = true;
        let err = wrap(vec![input], WrapOptions::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::NoEnabledInputs)
        ));

        let options = WrapOptions {
            track_map: Some("0;".into()),
            ..Default::default()
        };
        assert!(WrapJob::new(vec![wave(1, 10)], options).is_err());

        let mut job = WrapJob::new(vec![wave(1, 10)], WrapOptions::default())?;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        assert!(matches!(
            job.run(&mut writer, None)?,
            WrapOutcome::Completed { .. }
        ));
        Ok(())
    }
}

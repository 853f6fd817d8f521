//! Frame-synchronous multiplex loop.
//!
//! Every iteration reads one edit unit (or one batch of sound samples)
//! from every input before anything is written, so all output tracks stay
//! aligned to the shortest input.

use std::time::{Duration, Instant};

use anyhow::Result;
use log::debug;

use crate::process::graph::{ChannelSlot, TrackGraph};
use crate::process::input::RawInput;
use crate::process::pcm;
use crate::process::writer::ClipWriter;
use crate::structs::essence_type::DataDef;

/// Sound samples read per iteration when every input is sound with one
/// sample per edit unit.
pub const SOUND_BATCH_SIZE: u32 = 1920;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MuxConfig {
    /// Stop after this many edit units.
    pub duration: Option<u64>,
    /// Stop after this many edit units, leaving the clip incomplete.
    pub regtest_end: Option<u64>,
    /// Wrap no faster than this multiple of real time.
    pub rt_factor: Option<f32>,
}

impl MuxConfig {
    fn limit(&self) -> Option<u64> {
        match (self.duration, self.regtest_end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Samples requested from each input per iteration.
pub fn max_samples_per_read(inputs: &[RawInput], graph: &TrackGraph) -> u32 {
    let batch = graph.input_tracks.iter().all(|track| {
        let input = &inputs[track.input_index];
        track.data_def == DataDef::Sound && input.has_unit_sample_sequence()
    });
    if batch && !graph.input_tracks.is_empty() {
        SOUND_BATCH_SIZE
    } else {
        1
    }
}

/// Runs the loop until an input ends or a limit is reached and returns the
/// number of edit units written. `progress` receives the running total.
pub fn run_mux(
    inputs: &mut [RawInput],
    graph: &TrackGraph,
    writer: &mut dyn ClipWriter,
    config: &MuxConfig,
    mut progress: Option<&mut dyn FnMut(u64)>,
) -> Result<u64> {
    let max_read = max_samples_per_read(inputs, graph);
    let batch = max_read > 1;
    let frame_rate = writer.frame_rate();
    let limit = config.limit();
    let start = Instant::now();
    let mut written = vec![0u32; graph.output_tracks.len()];
    let mut total = 0u64;

    debug!(
        "Multiplexing {} input tracks, {max_read} samples per read",
        graph.input_tracks.len()
    );

    loop {
        let mut request = max_read;
        if let Some(limit) = limit {
            if total >= limit {
                break;
            }
            if batch {
                request = request.min((limit - total).min(u64::from(u32::MAX)) as u32);
            }
        }

        let mut num_read = request;
        for track in &graph.input_tracks {
            let count = inputs[track.input_index].read_samples(request)?;
            num_read = num_read.min(count);
        }
        if num_read == 0 {
            break;
        }

        written.fill(0);
        let mut first_sound_num_samples = 0;
        for track in &graph.input_tracks {
            let input = &inputs[track.input_index];
            let reader = input.reader()?;
            let mut num_samples = reader.num_samples();
            let mut data = reader.sample_data();

            if track.data_def == DataDef::Sound {
                if batch {
                    num_samples = num_samples.min(num_read);
                }
                let block_align = input.sound.block_align();
                data = &data[..(num_samples as usize * block_align).min(data.len())];
                if first_sound_num_samples == 0 {
                    first_sound_num_samples = num_samples;
                }
            }

            for binding in &track.bindings {
                let output = graph.output(binding.output);
                let channel_count = input.sound.channel_count;
                if track.data_def == DataDef::Sound && channel_count > 1 {
                    let channel = pcm::deinterleave(
                        data,
                        input.sound.bits_per_sample,
                        channel_count,
                        binding.input_channel,
                    );
                    writer.write_samples(
                        output.handle,
                        binding.output_channel,
                        &channel,
                        num_samples,
                    )?;
                } else {
                    writer.write_samples(
                        output.handle,
                        binding.output_channel,
                        data,
                        num_samples,
                    )?;
                }
                written[binding.output.0] = num_samples;
            }
        }

        for (i, output) in graph.output_tracks.iter().enumerate() {
            let Some(sound) = output.sound.as_ref() else {
                continue;
            };
            if output.is_silence_track() {
                writer.write_silence_samples(output.handle, first_sound_num_samples)?;
                continue;
            }
            let num_samples = written[i];
            let zeros = vec![0u8; num_samples as usize * pcm::sample_size(sound.bits_per_sample)];
            for (channel, slot) in output.slots.iter().enumerate() {
                if *slot == ChannelSlot::Silence {
                    writer.write_samples(output.handle, channel as u32, &zeros, num_samples)?;
                }
            }
        }

        total += u64::from(num_read);
        if let Some(progress) = progress.as_deref_mut() {
            progress(total);
        }

        if num_read < request {
            break;
        }

        if let Some(factor) = config.rt_factor.filter(|f| *f > 0.0) {
            let target_ms = 1000.0 * total as f64 * f64::from(frame_rate.den)
                / (f64::from(factor) * f64::from(frame_rate.num));
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            if target_ms > elapsed_ms {
                std::thread::sleep(Duration::from_secs_f64((target_ms - elapsed_ms) / 1000.0));
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::input::{EssenceSource, InputKind};
    use crate::process::track_map::{InputTrackInfo, TrackMapper};
    use crate::process::writer::memory::MemoryClipWriter;
    use crate::structs::essence_type::EssenceType;
    use crate::structs::rational::{FRAME_RATE_25, FRAME_RATE_2997, Rational};

    fn pcm_input(channels: u32, num_samples: usize) -> RawInput {
        // 16 bit samples valued by frame index
        let data: Vec<u8> = (0..num_samples)
            .flat_map(|i| std::iter::repeat_n((i % 256) as u8, 2 * channels as usize))
            .collect();
        let mut input = RawInput::new(
            InputKind::Essence(EssenceType::Pcm),
            EssenceSource::memory(data),
        );
        input.sound.channel_count = channels;
        input
    }

    fn anc_input(frames: usize) -> RawInput {
        let mut input = RawInput::new(
            InputKind::Essence(EssenceType::Anc),
            EssenceSource::memory(vec![7u8; frames * 4]),
        );
        input.data_const_size = Some(4);
        input
    }

    fn setup(
        inputs: &mut [RawInput],
        expr: Option<&str>,
        writer: &mut MemoryClipWriter,
    ) -> Result<TrackGraph> {
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
        let (maps, _) = mapper.map_tracks(&infos)?;
        for input in inputs.iter_mut() {
            input.open()?;
        }
        let graph = TrackGraph::build(&maps, inputs, writer)?;
        graph.configure_tracks(inputs, writer, &Default::default())?;
        graph.setup_readers(inputs, writer, false)?;
        Ok(graph)
    }

    #[test]
    fn outputs_stop_at_the_shortest_input() -> Result<()> {
        // 4 frames of sound at 1920 samples per frame, 6 frames of data
        let mut inputs = [pcm_input(2, 1920 * 4 + 100), anc_input(6)];
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = setup(&mut inputs, Some("0;s1;1,s1"), &mut writer)?;
        assert_eq!(max_samples_per_read(&inputs, &graph), 1);

        let mut reported = Vec::new();
        let mut progress = |total: u64| reported.push(total);
        let total = run_mux(
            &mut inputs,
            &graph,
            &mut writer,
            &MuxConfig::default(),
            Some(&mut progress),
        )?;

        assert_eq!(total, 4);
        assert_eq!(reported, [1, 2, 3, 4]);
        assert_eq!(writer.tracks[0].samples[&0], 1920 * 4);
        assert_eq!(writer.tracks[0].data[&0].len(), 1920 * 4 * 2);
        assert_eq!(writer.tracks[1].silence, 1920 * 4);
        assert_eq!(writer.tracks[2].samples[&0], 1920 * 4);
        assert_eq!(writer.tracks[2].data[&1], vec![0u8; 1920 * 4 * 2]);
        assert_eq!(writer.tracks[3].samples[&0], 4);
        assert_eq!(writer.duration(), 4);
        Ok(())
    }

    #[test]
    fn channels_are_deinterleaved() -> Result<()> {
        let data: Vec<u8> = (0..2).flat_map(|_| [1, 1, 2, 2]).collect();
        let mut inputs = [RawInput::new(
            InputKind::Essence(EssenceType::Pcm),
            EssenceSource::memory(data),
        )];
        inputs[0].sound.channel_count = 2;
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        writer.sample_sequence = Some(vec![1]);
        let graph = setup(&mut inputs, Some("m0-1"), &mut writer)?;

        let total = run_mux(&mut inputs, &graph, &mut writer, &MuxConfig::default(), None)?;
        assert_eq!(total, 2);
        assert_eq!(writer.tracks[0].data[&0], [1, 1, 1, 1]);
        assert_eq!(writer.tracks[1].data[&0], [2, 2, 2, 2]);
        Ok(())
    }

    #[test]
    fn sound_only_inputs_read_in_batches() -> Result<()> {
        let mut inputs = [pcm_input(1, 5000), pcm_input(1, 4000)];
        let mut writer = MemoryClipWriter::new(Rational::new(48000, 1));
        writer.sample_sequence = Some(vec![1]);
        let graph = setup(&mut inputs, None, &mut writer)?;
        assert_eq!(max_samples_per_read(&inputs, &graph), SOUND_BATCH_SIZE);

        let total = run_mux(&mut inputs, &graph, &mut writer, &MuxConfig::default(), None)?;
        assert_eq!(total, 4000);
        assert_eq!(writer.tracks[0].samples[&0], 4000);
        assert_eq!(writer.tracks[1].samples[&0], 4000);
        assert_eq!(writer.tracks[0].data[&0].len(), 8000);
        Ok(())
    }

    #[test]
    fn limits_stop_early() -> Result<()> {
        let mut inputs = [pcm_input(1, 5000)];
        let mut writer = MemoryClipWriter::new(Rational::new(48000, 1));
        writer.sample_sequence = Some(vec![1]);
        let graph = setup(&mut inputs, None, &mut writer)?;
        let config = MuxConfig {
            duration: Some(3000),
            regtest_end: Some(2500),
            rt_factor: None,
        };
        assert_eq!(run_mux(&mut inputs, &graph, &mut writer, &config, None)?, 2500);

        let mut inputs = [anc_input(10)];
        let mut writer = MemoryClipWriter::new(FRAME_RATE_25);
        let graph = setup(&mut inputs, None, &mut writer)?;
        let config = MuxConfig {
            duration: Some(3),
            rt_factor: Some(1000.0),
            ..Default::default()
        };
        assert_eq!(run_mux(&mut inputs, &graph, &mut writer, &config, None)?, 3);
        assert_eq!(writer.tracks[0].data[&0], vec![7u8; 12]);
        Ok(())
    }

    #[test]
    fn uneven_cadence_alternates_per_frame() -> Result<()> {
        let cumulative = [1602u64, 3203, 4805, 6406, 8008];
        for (frames, expected) in (1..=5u64).zip(cumulative) {
            let mut inputs = [pcm_input(1, 8008 + 1000), anc_input(10)];
            let mut writer = MemoryClipWriter::new(FRAME_RATE_2997);
            let graph = setup(&mut inputs, None, &mut writer)?;
            assert_eq!(inputs[0].sample_sequence(), [1602, 1601, 1602, 1601, 1602]);
            let config = MuxConfig {
                duration: Some(frames),
                ..Default::default()
            };
            assert_eq!(run_mux(&mut inputs, &graph, &mut writer, &config, None)?, frames);
            assert_eq!(writer.tracks[0].samples[&0], expected);
        }

        // a sixth frame would need 1602 samples, only 1000 remain
        let mut inputs = [pcm_input(1, 8008 + 1000), anc_input(10)];
        let mut writer = MemoryClipWriter::new(FRAME_RATE_2997);
        let graph = setup(&mut inputs, None, &mut writer)?;
        let total = run_mux(&mut inputs, &graph, &mut writer, &MuxConfig::default(), None)?;
        assert_eq!(total, 5);
        assert_eq!(writer.tracks[0].samples[&0], 8008);
        assert_eq!(writer.tracks[1].samples[&0], 5);
        assert_eq!(writer.duration(), 5);
        Ok(())
    }

    #[test]
    fn final_partial_batch_is_not_paced() -> Result<()> {
        let mut inputs = [pcm_input(1, 100)];
        let mut writer = MemoryClipWriter::new(Rational::new(48000, 1));
        writer.sample_sequence = Some(vec![1]);
        let graph = setup(&mut inputs, None, &mut writer)?;
        // pacing 100 samples at this factor would sleep about two seconds
        let config = MuxConfig {
            rt_factor: Some(0.001),
            ..Default::default()
        };

        let start = Instant::now();
        assert_eq!(run_mux(&mut inputs, &graph, &mut writer, &config, None)?, 100);
        assert!(start.elapsed() < Duration::from_secs(1));
        Ok(())
    }
}

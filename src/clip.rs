use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use essence::process::cadence;
use essence::process::graph::{AvciMode, TrackConfig};
use essence::process::pcm;
use essence::process::writer::{ClipWriter, TrackHandle};
use essence::structs::avc::has_avci_header;
use essence::structs::essence_type::EssenceType;
use essence::structs::rational::{ASPECT_RATIO_4_3, ASPECT_RATIO_16_9, Rational};

use crate::cli::command::ClipType;
use crate::wav::{FormatChunk, WaveFileWriter};

enum TrackFile {
    Raw(BufWriter<File>),
    Wave(WaveFileWriter<File>),
}

struct FileTrack {
    essence_type: EssenceType,
    config: TrackConfig,
    path: PathBuf,
    file: Option<TrackFile>,
    /// Pending sound samples, one buffer per channel.
    channels: Vec<Vec<u8>>,
    /// Edit units for picture and data, samples for sound.
    samples: u64,
}

impl FileTrack {
    fn block_align(&self) -> usize {
        self.config.sound.as_ref().map_or(0, |sound| {
            pcm::sample_size(sound.bits_per_sample) * sound.channel_count as usize
        })
    }

    /// Interleaves and writes the samples every channel has received.
    fn flush_channels(&mut self, complete: bool) -> Result<()> {
        let Some(sound) = &self.config.sound else {
            return Ok(());
        };
        let Some(TrackFile::Wave(wave)) = &mut self.file else {
            return Ok(());
        };
        let sample_size = pcm::sample_size(sound.bits_per_sample);
        let ready = if complete {
            self.channels.iter().map(Vec::len).max()
        } else {
            self.channels.iter().map(Vec::len).min()
        };
        let ready = ready.unwrap_or(0) / sample_size * sample_size;
        if ready == 0 {
            return Ok(());
        }

        let drained: Vec<Vec<u8>> = self
            .channels
            .iter_mut()
            .map(|c| c.drain(..ready.min(c.len())).collect())
            .collect();
        let refs: Vec<&[u8]> = drained.iter().map(Vec::as_slice).collect();
        wave.write_frames(&pcm::interleave(&refs, sound.bits_per_sample))?;
        Ok(())
    }
}

/// Writes every track to its own file, `PREFIX_<n>.<ext>`. Sound tracks are
/// WAVE files, all other tracks the raw sample stream.
pub struct FileClipWriter {
    prefix: PathBuf,
    clip_type: ClipType,
    frame_rate: Rational,
    tracks: Vec<FileTrack>,
}

impl FileClipWriter {
    /// `frame_rate` is the video frame rate for raw clips and the sampling
    /// rate for WAVE clips.
    pub fn new(prefix: impl Into<PathBuf>, clip_type: ClipType, frame_rate: Rational) -> Self {
        Self {
            prefix: prefix.into(),
            clip_type,
            frame_rate,
            tracks: Vec::new(),
        }
    }

    pub fn track_paths(&self) -> impl Iterator<Item = &Path> {
        self.tracks.iter().map(|t| t.path.as_path())
    }

    fn track_mut(&mut self, track: TrackHandle) -> Result<&mut FileTrack> {
        self.tracks
            .get_mut(track.0)
            .ok_or_else(|| anyhow!("Unknown track {}", track.0))
    }

    fn track_path(&self, index: usize, essence_type: EssenceType) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_owned();
        name.push(format!("_{index}.{}", extension(essence_type)));
        PathBuf::from(name)
    }
}

fn extension(essence_type: EssenceType) -> &'static str {
    match essence_type {
        EssenceType::Pcm => "wav",
        EssenceType::Dv(_) => "dv",
        EssenceType::D10(_) | EssenceType::Mpeg2Lg(_) => "m2v",
        EssenceType::Avci(..) | EssenceType::Avc(_) => "h264",
        EssenceType::Vc3(_) => "dnxhd",
        EssenceType::Vc2 => "vc2",
        EssenceType::Rdd36(_) => "prores",
        EssenceType::Unc(_) => "yuv",
        EssenceType::Anc => "anc",
        EssenceType::Vbi => "vbi",
    }
}

/// MPEG-2 aspect_ratio_information to write into D10 sequence headers.
fn d10_aspect_code(track: &FileTrack) -> Option<u8> {
    let EssenceType::D10(_) = track.essence_type else {
        return None;
    };
    let picture = track.config.picture.as_ref()?;
    if !picture.d10_bitstream_aspect {
        return None;
    }
    match picture.aspect_ratio.value()? {
        ASPECT_RATIO_4_3 => Some(2),
        ASPECT_RATIO_16_9 => Some(3),
        _ => None,
    }
}

/// Replaces the aspect ratio nibble of the sequence header at the start of a frame.
fn rewrite_d10_aspect(data: &[u8], code: u8) -> Vec<u8> {
    let mut frame = data.to_vec();
    if frame.len() > 7 && frame[..4] == [0, 0, 1, 0xb3] {
        frame[7] = (code << 4) | (frame[7] & 0x0f);
    }
    frame
}

impl ClipWriter for FileClipWriter {
    fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    fn is_supported(&self, essence_type: EssenceType, rate: Rational) -> bool {
        match self.clip_type {
            ClipType::Raw => essence_type.is_supported(rate),
            ClipType::Wave => essence_type == EssenceType::Pcm && rate == self.frame_rate,
        }
    }

    fn create_track(&mut self, essence_type: EssenceType) -> Result<TrackHandle> {
        if self.clip_type == ClipType::Wave && essence_type != EssenceType::Pcm {
            bail!("WAVE clips only take sound tracks, got {essence_type}");
        }
        let index = self.tracks.len();
        let path = self.track_path(index, essence_type);
        self.tracks.push(FileTrack {
            essence_type,
            config: TrackConfig::default(),
            path,
            file: None,
            channels: Vec::new(),
            samples: 0,
        });
        Ok(TrackHandle(index))
    }

    fn configure_track(&mut self, track: TrackHandle, config: &TrackConfig) -> Result<()> {
        let track = self.track_mut(track)?;
        if track.essence_type.is_sound() && config.sound.is_none() {
            bail!("Sound track {} has no sound properties", track.path.display());
        }
        if config.avci_mode == Some(AvciMode::NoFrameHeader) && config.avci_header.is_none() {
            bail!(
                "{}: AVC-Intra frames carry no header and none was given",
                track.path.display()
            );
        }
        track.config = config.clone();
        Ok(())
    }

    fn sound_sample_sequence(
        &self,
        _track: TrackHandle,
        sampling_rate: Rational,
    ) -> Result<Vec<u32>> {
        match self.clip_type {
            ClipType::Raw => cadence::sound_sample_sequence(sampling_rate, self.frame_rate),
            ClipType::Wave => Ok(vec![1]),
        }
    }

    fn prepare_write(&mut self) -> Result<()> {
        for track in &mut self.tracks {
            let file = File::create(&track.path)
                .with_context(|| format!("Failed to create '{}'", track.path.display()))?;
            track.file = Some(match &track.config.sound {
                Some(sound) => {
                    let format = FormatChunk::pcm(
                        sound.sampling_rate.rounded(),
                        sound.channel_count as u16,
                        sound.bits_per_sample as u16,
                    );
                    track.channels = vec![Vec::new(); sound.channel_count as usize];
                    TrackFile::Wave(WaveFileWriter::new(file, format)?)
                }
                None => TrackFile::Raw(BufWriter::new(file)),
            });
            log::debug!("Writing {} to {}", track.essence_type, track.path.display());
        }
        Ok(())
    }

    fn write_samples(
        &mut self,
        track: TrackHandle,
        channel: u32,
        data: &[u8],
        num_samples: u32,
    ) -> Result<()> {
        let track = self.track_mut(track)?;
        let first = track.samples == 0;
        let d10_aspect = d10_aspect_code(track);
        match track.file {
            Some(TrackFile::Wave(_)) => {
                let Some(buffer) = track.channels.get_mut(channel as usize) else {
                    bail!("{}: no channel {channel}", track.path.display());
                };
                buffer.extend_from_slice(data);
                if channel == 0 {
                    track.samples += u64::from(num_samples);
                }
                track.flush_channels(false)?;
            }
            Some(TrackFile::Raw(ref mut file)) => {
                if first && track.config.avci_mode.is_some() && !has_avci_header(data) {
                    match (&track.config.avci_header, track.config.avci_mode) {
                        (_, Some(AvciMode::AllFrameHeader)) => {
                            bail!("{}: first AVC-Intra frame has no header", track.path.display())
                        }
                        (Some(header), _) => file.write_all(header)?,
                        (None, _) => bail!(
                            "{}: first AVC-Intra frame has no header and none was given",
                            track.path.display()
                        ),
                    }
                }
                match d10_aspect {
                    Some(code) => file.write_all(&rewrite_d10_aspect(data, code))?,
                    None => file.write_all(data)?,
                }
                track.samples += u64::from(num_samples);
            }
            None => bail!("{}: write before prepare", track.path.display()),
        }
        Ok(())
    }

    fn write_silence_samples(&mut self, track: TrackHandle, num_samples: u32) -> Result<()> {
        let track = self.track_mut(track)?;
        let Some(sound) = &track.config.sound else {
            bail!("{}: silence on a non-sound track", track.path.display());
        };
        let size = pcm::sample_size(sound.bits_per_sample) * num_samples as usize;
        for buffer in &mut track.channels {
            buffer.resize(buffer.len() + size, 0);
        }
        track.samples += u64::from(num_samples);
        track.flush_channels(false)
    }

    fn complete_write(&mut self) -> Result<()> {
        for track in &mut self.tracks {
            track.flush_channels(true)?;
            match &mut track.file {
                Some(TrackFile::Wave(wave)) => wave.finish()?,
                Some(TrackFile::Raw(file)) => file.flush()?,
                None => {}
            }
            log::debug!(
                "{}: {} bytes per sample frame, {} samples",
                track.path.display(),
                track.block_align(),
                track.samples
            );
        }
        Ok(())
    }

    fn duration(&self) -> u64 {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, track)| match &track.config.sound {
                Some(sound) => match self.sound_sample_sequence(TrackHandle(i), sound.sampling_rate) {
                    Ok(sequence) => {
                        let cycle: u64 = sequence.iter().map(|&n| u64::from(n)).sum();
                        track.samples * sequence.len() as u64 / cycle.max(1)
                    }
                    Err(_) => 0,
                },
                None => track.samples,
            })
            .min()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use essence::process::graph::SoundInfo;
    use essence::structs::essence_type::{AvciClass, HdScan};
    use essence::structs::rational::{FRAME_RATE_25, SAMPLING_RATE_48K};
    use std::fs;

    fn temp_prefix(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("essmux-{name}-{}", std::process::id()))
    }

    fn stereo_16() -> TrackConfig {
        TrackConfig {
            sound: Some(SoundInfo {
                sampling_rate: SAMPLING_RATE_48K,
                bits_per_sample: 16,
                channel_count: 2,
                sequence_offset: 0,
                locked: None,
                audio_ref_level: None,
                dial_norm: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sound_channels_interleaved() -> Result<()> {
        let prefix = temp_prefix("sound");
        let mut writer = FileClipWriter::new(&prefix, ClipType::Raw, FRAME_RATE_25);
        let track = writer.create_track(EssenceType::Pcm)?;
        writer.configure_track(track, &stereo_16())?;
        writer.prepare_write()?;

        writer.write_samples(track, 1, &[3, 4, 7, 8], 2)?;
        writer.write_samples(track, 0, &[1, 2, 5, 6], 2)?;
        writer.write_silence_samples(track, 1)?;
        writer.complete_write()?;
        assert_eq!(writer.duration(), 0);

        let path = writer.track_paths().next().unwrap().to_path_buf();
        assert!(path.to_string_lossy().ends_with("_0.wav"));
        let wave = fs::read(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(u32::from_le_bytes(wave[40..44].try_into().unwrap()), 12);
        assert_eq!(&wave[44..], [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn avci_header_prepended() -> Result<()> {
        let mut header = vec![0, 0, 0, 1, 0x09, 0x10, 0, 0, 0, 1, 0x67, 0x7a];
        header.resize(512, 0);
        let frame = [0, 0, 0, 1, 0x65, 0x88, 0x80, 0x40];

        let prefix = temp_prefix("avci");
        let mut writer = FileClipWriter::new(&prefix, ClipType::Raw, FRAME_RATE_25);
        let essence_type = EssenceType::Avci(AvciClass::C100, HdScan::Interlaced1080);
        let track = writer.create_track(essence_type)?;

        let mut config = TrackConfig {
            avci_mode: Some(AvciMode::NoFrameHeader),
            ..Default::default()
        };
        assert!(writer.configure_track(track, &config).is_err());
        config.avci_header = Some(header.clone());
        writer.configure_track(track, &config)?;

        writer.prepare_write()?;
        writer.write_samples(track, 0, &frame, 1)?;
        writer.write_samples(track, 0, &frame, 1)?;
        writer.complete_write()?;
        assert_eq!(writer.duration(), 2);

        let path = writer.track_paths().next().unwrap().to_path_buf();
        let data = fs::read(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(data.len(), 512 + 2 * frame.len());
        assert_eq!(&data[..512], header.as_slice());
        assert_eq!(&data[512..520], frame);
        Ok(())
    }

    #[test]
    fn d10_aspect_rewritten() -> Result<()> {
        use essence::process::input::{OptProp, PictureProps};
        use essence::structs::essence_type::D10Variant;

        let frame = [0, 0, 1, 0xb3, 0x2d, 0x02, 0x60, 0x23, 0xff];
        let prefix = temp_prefix("d10");
        let mut writer = FileClipWriter::new(&prefix, ClipType::Raw, FRAME_RATE_25);
        let track = writer.create_track(EssenceType::D10(D10Variant::Mbps50))?;
        let picture = PictureProps {
            aspect_ratio: OptProp::Set(ASPECT_RATIO_16_9),
            d10_bitstream_aspect: true,
            ..Default::default()
        };
        let config = TrackConfig {
            picture: Some(picture),
            ..Default::default()
        };
        writer.configure_track(track, &config)?;
        writer.prepare_write()?;
        writer.write_samples(track, 0, &frame, 1)?;
        writer.complete_write()?;

        let path = writer.track_paths().next().unwrap().to_path_buf();
        assert!(path.to_string_lossy().ends_with("_0.m2v"));
        let data = fs::read(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(data[7], 0x33);
        assert_eq!(&data[8..], [0xff]);
        Ok(())
    }

    #[test]
    fn wave_clips_take_sound_only() -> Result<()> {
        let mut writer = FileClipWriter::new(temp_prefix("wave"), ClipType::Wave, SAMPLING_RATE_48K);
        assert!(writer.is_supported(EssenceType::Pcm, SAMPLING_RATE_48K));
        assert!(!writer.is_supported(EssenceType::Anc, FRAME_RATE_25));
        assert!(writer.create_track(EssenceType::Anc).is_err());

        let track = writer.create_track(EssenceType::Pcm)?;
        assert_eq!(writer.sound_sample_sequence(track, SAMPLING_RATE_48K)?, [1]);
        Ok(())
    }
}

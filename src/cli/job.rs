//! YAML job files and the merge of job and command line options.
//!
//! ```yaml
//! frame_rate: "25"
//! track_map: "m0-1"
//! inputs:
//!   - kind: dv
//!     path: video.dv
//!     aspect_ratio: "16:9"
//!   - kind: pcm
//!     path: audio.raw
//!     bits_per_sample: 24
//!     channel_count: 2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use essence::process::input::{EssenceSource, InputKind, OptProp, RawInput};
use essence::structs::essence_type::EssenceType;
use essence::structs::rational::Rational;
use serde::{Deserialize, Serialize};

use super::command::{AvciGuess, InputArgs};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobFile {
    pub frame_rate: Option<String>,
    pub track_map: Option<String>,
    pub duration: Option<u64>,
    pub inputs: Vec<JobInput>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobInput {
    pub kind: String,
    pub path: PathBuf,
    pub offset: u64,
    pub max_length: Option<u64>,
    pub disabled: bool,

    pub aspect_ratio: Option<String>,
    pub afd: Option<u8>,
    pub component_depth: Option<u32>,
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
    pub d10_bitstream_aspect: bool,
    pub d10_fixed_frame_size: bool,
    /// `i` or `p`.
    pub avci_guess: Option<String>,

    pub sampling_rate: Option<String>,
    pub bits_per_sample: Option<u32>,
    pub channel_count: Option<u32>,
    pub locked: Option<bool>,
    pub audio_ref_level: Option<i8>,
    pub dial_norm: Option<i8>,
    pub sequence_offset: Option<u8>,

    /// Constant frame size of ANC or VBI data.
    pub const_size: Option<u32>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file '{}'", path.display()))?;
        serde_yaml_ng::from_str(&text)
            .with_context(|| format!("Invalid job file '{}'", path.display()))
    }
}

/// Inputs and clip options after merging the job file with the command line.
#[derive(Default)]
pub struct LoadedJob {
    pub inputs: Vec<RawInput>,
    pub frame_rate: Option<Rational>,
    pub track_map: Option<String>,
    pub duration: Option<u64>,
}

/// Builds the input list: job file inputs first, then command line inputs.
/// Command line options override job file values.
pub fn load_job(args: &InputArgs) -> Result<LoadedJob> {
    let mut loaded = LoadedJob::default();

    if let Some(path) = &args.job {
        let job = JobFile::load(path)?;
        loaded.frame_rate = job.frame_rate.as_deref().map(str::parse).transpose()?;
        loaded.track_map = job.track_map;
        loaded.duration = job.duration;
        for input in &job.inputs {
            loaded.inputs.push(input.to_raw_input()?);
        }
    }

    for token in &args.inputs {
        let source = EssenceSource::file(&token.path, 0);
        loaded.inputs.push(RawInput::new(token.kind, source));
    }

    for input in &mut loaded.inputs {
        apply_args(args, input);
    }
    if let Some(frame_rate) = args.frame_rate {
        loaded.frame_rate = Some(frame_rate);
    }

    Ok(loaded)
}

impl JobInput {
    fn to_raw_input(&self) -> Result<RawInput> {
        let kind: InputKind = self
            .kind
            .parse()
            .with_context(|| format!("Invalid kind for input '{}'", self.path.display()))?;
        let mut input = RawInput::new(kind, EssenceSource::file(&self.path, self.offset));
        input.max_length = self.max_length;
        input.disabled = self.disabled;

        let picture = &mut input.picture;
        if let Some(aspect_ratio) = &self.aspect_ratio {
            picture.aspect_ratio = OptProp::Set(aspect_ratio.parse()?);
        }
        if let Some(depth) = self.component_depth {
            picture.component_depth = OptProp::Set(depth);
        }
        picture.afd = self.afd;
        picture.input_height = self.input_height;
        picture.signal_standard = self.signal_standard;
        picture.frame_layout = self.frame_layout;
        picture.field_dominance = self.field_dominance;
        picture.transfer_characteristic = self.transfer_characteristic;
        picture.coding_equations = self.coding_equations;
        picture.color_primaries = self.color_primaries;
        picture.color_siting = self.color_siting;
        picture.black_ref_level = self.black_ref_level;
        picture.white_ref_level = self.white_ref_level;
        picture.color_range = self.color_range;
        picture.vc2_mode_flags = self.vc2_mode_flags;
        picture.rdd36_opaque = self.rdd36_opaque;
        picture.d10_bitstream_aspect = self.d10_bitstream_aspect;
        input.d10_fixed_frame_size = self.d10_fixed_frame_size;
        input.avci_guess_progressive = match self.avci_guess.as_deref() {
            Some("p" | "P") => Some(true),
            Some("i" | "I") => Some(false),
            Some(other) => anyhow::bail!("Invalid AVC-Intra guess '{other}', expected i or p"),
            None => None,
        };

        let sound = &mut input.sound;
        if let Some(rate) = &self.sampling_rate {
            sound.sampling_rate = rate.parse()?;
        }
        if let Some(bits) = self.bits_per_sample {
            sound.bits_per_sample = bits;
        }
        if let Some(count) = self.channel_count {
            sound.channel_count = count;
        }
        sound.locked = self.locked;
        sound.audio_ref_level = self.audio_ref_level;
        sound.dial_norm = self.dial_norm;
        sound.sequence_offset = self.sequence_offset;

        input.data_const_size = self.const_size;
        Ok(input)
    }
}

fn apply_args(args: &InputArgs, input: &mut RawInput) {
    if let Some(off) = args.off {
        input.source = match &input.source {
            EssenceSource::File { path, .. } => EssenceSource::file(path, off),
            source => source.clone(),
        };
    }
    if args.maxlen.is_some() {
        input.max_length = args.maxlen;
    }

    let picture = &mut input.picture;
    if let Some(aspect_ratio) = args.aspect_ratio {
        picture.aspect_ratio = OptProp::Set(aspect_ratio);
    }
    if let Some(depth) = args.component_depth {
        picture.component_depth = OptProp::Set(depth);
    }
    picture.afd = args.afd.or(picture.afd);
    picture.input_height = args.input_height.or(picture.input_height);
    picture.d10_bitstream_aspect |= args.bsar;
    input.d10_fixed_frame_size |= args.d10_fixed;
    if let Some(guess) = args.avci_guess {
        input.avci_guess_progressive = Some(guess == AvciGuess::P);
    }

    let sound = &mut input.sound;
    if let Some(rate) = args.sampling_rate {
        sound.sampling_rate = rate;
    }
    if let Some(bits) = args.bits_per_sample {
        sound.bits_per_sample = bits;
    }
    if let Some(count) = args.audio_chan {
        sound.channel_count = count;
    }
    sound.locked = args.locked.or(sound.locked);
    sound.audio_ref_level = args.audio_ref_level.or(sound.audio_ref_level);
    sound.dial_norm = args.dial_norm.or(sound.dial_norm);
    sound.sequence_offset = args.seq_off.or(sound.sequence_offset);

    let const_size = match input.essence_type {
        Some(EssenceType::Anc) => args.anc_const,
        Some(EssenceType::Vbi) => args.vbi_const,
        _ => None,
    };
    if const_size.is_some() {
        input.data_const_size = const_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::command::{Cli, Commands};
    use clap::Parser;

    fn input_args(argv: &[&str]) -> InputArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Info(args) => args.input,
            Commands::Wrap(args) => args.input,
        }
    }

    #[test]
    fn job_file_with_overrides() -> Result<()> {
        let path = std::env::temp_dir().join(format!("essmux-job-{}.yaml", std::process::id()));
        fs::write(
            &path,
            "frame_rate: \"2997\"\n\
             track_map: stereo\n\
             inputs:\n\
             \x20 - kind: pcm\n\
             \x20   path: a.raw\n\
             \x20   bits_per_sample: 24\n\
             \x20   channel_count: 2\n\
             \x20   dial_norm: -12\n\
             \x20 - kind: anc\n\
             \x20   path: a.anc\n\
             \x20   const_size: 16\n",
        )?;

        let job_arg = path.display().to_string();
        let args = input_args(&[
            "essmux", "info", "--job", &job_arg, "-q", "16", "--anc-const", "32", "dv:v.dv",
        ]);
        let loaded = load_job(&args)?;
        fs::remove_file(&path)?;

        assert_eq!(loaded.frame_rate, Some(Rational::new(30000, 1001)));
        assert_eq!(loaded.track_map.as_deref(), Some("stereo"));
        assert_eq!(loaded.inputs.len(), 3);

        let pcm = &loaded.inputs[0];
        assert_eq!(pcm.sound.bits_per_sample, 16);
        assert_eq!(pcm.sound.channel_count, 2);
        assert_eq!(pcm.sound.dial_norm, Some(-12));
        assert_eq!(loaded.inputs[1].data_const_size, Some(32));
        assert_eq!(loaded.inputs[2].name(), "v.dv");
        Ok(())
    }

    #[test]
    fn unknown_job_fields_are_rejected() {
        assert!(serde_yaml_ng::from_str::<JobFile>("inputs: []\nframes: 3\n").is_err());
        assert!(serde_yaml_ng::from_str::<JobFile>("inputs: [{kind: dv, path: a.dv}]\n").is_ok());
    }
}

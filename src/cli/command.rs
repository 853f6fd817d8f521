use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use essence::process::graph::AvciHeaderDonor;
use essence::structs::rational::Rational;

use crate::input::{InputSpec, parse_avci_head};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for multiplexing raw essence streams into synchronized clips",
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("VERGEN_GIT_DESCRIBE"), ")",
        "\nessence ", env!("ESSENCE_VERSION"),
        "\nbuilt ", env!("BUILD_TIMESTAMP"),
    ),
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Wrap raw essence inputs into a clip.
    Wrap(WrapArgs),

    /// Resolve inputs and print what was found, without wrapping.
    Info(InfoArgs),
}

/// Inputs and the options applied to every input.
#[derive(Debug, Args)]
#[command(next_help_heading = "Inputs")]
pub struct InputArgs {
    /// Inputs as KIND:PATH, e.g. dv:video.dv, wave:audio.wav, vc3_1080i_1242:video.dnx.
    #[arg(value_name = "KIND:PATH")]
    pub inputs: Vec<InputSpec>,

    /// YAML job file with inputs, per-input overrides and clip options.
    #[arg(long, value_name = "FILE")]
    pub job: Option<PathBuf>,

    /// Clip frame rate, e.g. 25, 2997 or 30000/1001.
    #[arg(short = 'f', long, value_name = "RATE")]
    pub frame_rate: Option<Rational>,

    /// Picture aspect ratio, e.g. 16:9.
    #[arg(short = 'a', long, value_name = "RATIO")]
    pub aspect_ratio: Option<Rational>,

    /// Active format description code.
    #[arg(long, value_name = "CODE")]
    pub afd: Option<u8>,

    /// Picture component depth in bits.
    #[arg(long, value_name = "BITS")]
    pub component_depth: Option<u32>,

    /// Stored picture height of uncompressed input.
    #[arg(long, value_name = "LINES")]
    pub input_height: Option<u32>,

    /// Sampling rate of raw PCM input.
    #[arg(short = 's', long, value_name = "RATE")]
    pub sampling_rate: Option<Rational>,

    /// Bits per sample of raw PCM input.
    #[arg(short = 'q', long, value_name = "BITS")]
    pub bits_per_sample: Option<u32>,

    /// Channel count of raw PCM input.
    #[arg(long, value_name = "COUNT")]
    pub audio_chan: Option<u32>,

    /// Mark sound as locked to the video.
    #[arg(long, value_name = "BOOL")]
    pub locked: Option<bool>,

    /// Audio reference level in dBm.
    #[arg(long, value_name = "LEVEL", allow_negative_numbers = true)]
    pub audio_ref_level: Option<i8>,

    /// Dial norm in dB.
    #[arg(long, value_name = "LEVEL", allow_negative_numbers = true)]
    pub dial_norm: Option<i8>,

    /// Offset into the sound sample sequence.
    #[arg(long, value_name = "OFFSET")]
    pub seq_off: Option<u8>,

    /// Scan of field coded 1080 line AVC-Intra input.
    #[arg(long, value_enum, value_name = "SCAN")]
    pub avci_guess: Option<AvciGuess>,

    /// Constant frame size of ANC data input.
    #[arg(long, value_name = "BYTES")]
    pub anc_const: Option<u32>,

    /// Constant frame size of VBI data input.
    #[arg(long, value_name = "BYTES")]
    pub vbi_const: Option<u32>,

    /// Skip this many bytes at the start of every input.
    #[arg(long, value_name = "BYTES")]
    pub off: Option<u64>,

    /// Read at most this many bytes from every input.
    #[arg(long, value_name = "BYTES")]
    pub maxlen: Option<u64>,

    /// Read D10 input as constant size frames.
    #[arg(long)]
    pub d10_fixed: bool,

    /// Rewrite the aspect ratio in D10 sequence headers.
    #[arg(long)]
    pub bsar: bool,

    /// Regression test mode: explicit essence types only, tracks sorted by kind.
    #[arg(long)]
    pub regtest: bool,
}

#[derive(Debug, Args)]
pub struct WrapArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output prefix. Each track is written to PREFIX_<n>.<ext>.
    #[arg(short = 'o', long, value_name = "PREFIX")]
    pub output: PathBuf,

    /// Clip layout.
    #[arg(short = 't', long, value_enum, default_value_t = ClipType::Raw)]
    pub clip_type: ClipType,

    /// Sound channel routing: mono, stereo, singlemca, or groups such as "m0-1;2,3,s2".
    #[arg(long, value_name = "EXPR")]
    pub track_map: Option<String>,

    /// Stop after this many edit units.
    #[arg(long, value_name = "COUNT")]
    pub dur: Option<u64>,

    /// Wrap at this multiple of real time.
    #[arg(long, value_name = "FACTOR")]
    pub rt: Option<f32>,

    /// Stop after this many edit units and leave the clip incomplete (regression tests).
    #[arg(long, value_name = "COUNT")]
    pub regtest_end: Option<u64>,

    /// Log the track map before wrapping.
    #[arg(long)]
    pub dump_track_map: bool,

    /// Print the track map and exit.
    #[arg(long)]
    pub dump_track_map_exit: bool,

    /// AVC-Intra header donor for one essence type.
    #[arg(long, value_name = "TYPE:FILE:OFFSET", value_parser = parse_avci_head)]
    pub avcihead: Vec<AvciHeaderDonor>,

    /// Use the built-in AVC-Intra header.
    #[arg(long)]
    pub ps_avcihead: bool,

    /// AVC-Intra frames carry no header.
    #[arg(long, conflicts_with = "allow_no_avci_head")]
    pub no_avci_head: bool,

    /// AVC-Intra frames may or may not carry a header.
    #[arg(long)]
    pub allow_no_avci_head: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Report format.
    #[arg(long, value_enum, default_value_t = InfoFormat::Plain)]
    pub format: InfoFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClipType {
    /// One file per track, edit units are video frames.
    Raw,
    /// Sound only, one WAVE file per track, edit units are samples.
    Wave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AvciGuess {
    /// Interlaced.
    I,
    /// Progressive.
    P,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InfoFormat {
    /// Human-readable text.
    Plain,
    /// YAML document.
    Yaml,
}

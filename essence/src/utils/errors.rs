#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("{0}: access unit is too short")]
    Truncated(&'static str),

    #[error("MPEG-2 sequence header not found")]
    MissingSequenceHeader,

    #[error("AVC sequence parameter set not found")]
    MissingSps,

    #[error("Unsupported AVC chroma_format_idc {0}")]
    InvalidChromaFormat(u32),

    #[error("Invalid VC-2 parse info prefix {0:#010X}")]
    InvalidParseInfo(u32),

    #[error("VC-2 sequence header not found")]
    MissingVc2SequenceHeader,

    #[error("Unknown VC-2 base video format {0}")]
    UnknownBaseVideoFormat(u32),

    #[error("Invalid RDD-36 frame identifier {0:#010X}")]
    InvalidRdd36Identifier(u32),

    #[error("Invalid VC-3 header prefix")]
    InvalidVc3Prefix,

    #[error("Invalid DV DIF header section")]
    InvalidDifHeader,
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Unknown DV essence type (STYPE {stype:#04X}, APT {apt})")]
    UnknownDv { stype: u8, apt: u8 },

    #[error("Unknown VC-3 essence type, compression id {0}")]
    UnknownVc3CompressionId(u32),

    #[error("Unknown D10 essence type, bit rate {0}")]
    UnknownD10BitRate(u32),

    #[error(
        "Unknown MPEG-2 Long GOP essence type: {width}x{height} {scan}, profile and level {profile_level:#04X}"
    )]
    UnknownMpeg2Lg {
        width: u32,
        height: u32,
        scan: &'static str,
        profile_level: u8,
    },

    #[error("Failed to read the first AVC-Intra sample from '{0}'")]
    NoAvciSamples(String),

    #[error("Unknown AVC-Intra essence type")]
    UnknownAvci,

    #[error("Unknown AVC profile {profile_idc} (constraint flags {constraint_flags:#04X})")]
    UnknownAvcProfile {
        profile_idc: u8,
        constraint_flags: u8,
    },

    #[error("Forced AVC essence type {forced} differs from parsed essence type {parsed}")]
    AvcProfileMismatch { forced: String, parsed: String },

    #[error("Essence type group {0} is not allowed in regression test mode")]
    GroupInRegressionTest(String),

    #[error("Input '{0}' has not been resolved to an essence type")]
    Unresolved(String),
}

#[derive(thiserror::Error, Debug)]
pub enum MapError {
    #[error("Invalid track map '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("Track map references sound channel {index} but only {count} channels exist")]
    ChannelOutOfRange { index: u32, count: u32 },

    #[error("Output track {0} mixes sound channels with different bits per sample")]
    MixedBitDepth(usize),

    #[error("No output tracks are mapped")]
    NoOutputTracks,

    #[error("All inputs are disabled")]
    NoEnabledInputs,
}

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("All sound tracks containing silence is currently not supported")]
    AllSoundSilence,

    #[error("Track map references unknown input {0}")]
    UnknownInput(usize),

    #[error("AVC-Intra header file '{0}' is shorter than 512 bytes")]
    ShortAvciHeader(String),

    #[error("{0} input '{1}' needs a constant frame size")]
    MissingConstSize(String, String),
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("Sample size {size} exceeds the maximum {max}")]
    SampleTooLarge { size: usize, max: usize },

    #[error("Invalid essence sample at byte offset {0}")]
    InvalidSample(u64),

    #[error("Input reader is not open")]
    NotOpen,

    #[error("Input reader has neither a fixed sample size nor an essence parser")]
    NoSampleFraming,
}

#[derive(thiserror::Error, Debug)]
pub enum WaveError {
    #[error("Not a RIFF file")]
    NotRiff,

    #[error("RIFF form type is not WAVE")]
    NotWave,

    #[error("WAVE file has no 'fmt ' chunk before the 'data' chunk")]
    MissingFormat,

    #[error("WAVE file has no 'data' chunk")]
    MissingData,

    #[error("Unsupported WAVE format tag {0:#06X}")]
    UnsupportedFormat(u16),

    #[error("Invalid WAVE block align {block_align} for {channels} channels of {bits} bits")]
    InvalidBlockAlign {
        block_align: u16,
        channels: u16,
        bits: u16,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum WrapError {
    #[error("Essence type {essence} is not supported at rate {rate}")]
    UnsupportedEssence { essence: String, rate: String },

    #[error("Sound sample sequence for {sampling_rate} at {frame_rate} has {len} entries (max 32)")]
    CadenceTooLong {
        sampling_rate: String,
        frame_rate: String,
        len: usize,
    },

    #[error("No inputs given")]
    NoInputs,
}

//! Concrete essence types and pre-resolution essence groups.
//!
//! An [`EssenceType`] is a two-level tag: the codec family plus a
//! family-specific variant. Everything that depends on the variant
//! (data kind, supported rates, fixed access unit sizes) is answered here
//! so that later stages never branch on raw codec identifiers.

use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{Result, anyhow};

use crate::structs::rational::{
    FRAME_RATE_23976, FRAME_RATE_24, FRAME_RATE_25, FRAME_RATE_30, FRAME_RATE_50, FRAME_RATE_60,
    FRAME_RATE_2997, FRAME_RATE_5994, Rational, SAMPLING_RATE_48K, SAMPLING_RATE_96K,
    STANDARD_FRAME_RATES,
};

/// Data kind of a track. Ordering is picture, sound, data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataDef {
    Picture,
    Sound,
    Data,
}

impl Display for DataDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDef::Picture => write!(f, "picture"),
            DataDef::Sound => write!(f, "sound"),
            DataDef::Data => write!(f, "data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DvVariant {
    Iec25,
    DvBased25,
    Dv50,
    Dv100_1080i,
    Dv100_1080p,
    Dv100_720p,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D10Variant {
    Mbps30,
    Mbps40,
    Mbps50,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvciClass {
    C50,
    C100,
    C200,
}

/// HD raster and scan shared by the AVC-Intra classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdScan {
    Interlaced1080,
    Progressive1080,
    Progressive720,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvcProfile {
    Baseline,
    ConstrainedBaseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444,
    High10Intra,
    High422Intra,
    High444Intra,
    Cavlc444Intra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mpeg2LgVariant {
    P422Hl1080i,
    P422Hl1080p,
    P422Hl720p,
    MpHl1920_1080i,
    MpHl1920_1080p,
    MpHl1440_1080i,
    MpHl1440_1080p,
    MpHl720p,
    MpH14_1080i,
    MpH14_1080p,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vc3Variant {
    Id1235,
    Id1237,
    Id1238,
    Id1241,
    Id1242,
    Id1243,
    Id1244,
    Id1250,
    Id1251,
    Id1252,
    Id1253,
    Id1258,
    Id1259,
    Id1260,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rdd36Profile {
    Proxy422,
    Lt422,
    Std422,
    Hq422,
    Std4444,
    Xq4444,
}

/// Uncompressed 8-bit UYVY 4:2:2 rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UncVariant {
    Sd,
    Hd1080i,
    Hd1080p,
    Hd720p,
    Uhd3840,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceType {
    Dv(DvVariant),
    D10(D10Variant),
    Avci(AvciClass, HdScan),
    Avc(AvcProfile),
    Mpeg2Lg(Mpeg2LgVariant),
    Vc3(Vc3Variant),
    Vc2,
    Rdd36(Rdd36Profile),
    Unc(UncVariant),
    Pcm,
    Anc,
    Vbi,
}

impl D10Variant {
    pub fn bit_rate(self) -> u32 {
        match self {
            D10Variant::Mbps30 => 30_000_000,
            D10Variant::Mbps40 => 40_000_000,
            D10Variant::Mbps50 => 50_000_000,
        }
    }

    /// Bytes per frame of constant bit rate essence.
    pub fn frame_size(self, frame_rate: Rational) -> u32 {
        let bits = self.bit_rate() as u64 * frame_rate.den.max(1) as u64;
        (bits / (8 * frame_rate.num.max(1) as u64)) as u32
    }
}

impl Vc3Variant {
    pub const ALL: [Vc3Variant; 14] = [
        Vc3Variant::Id1235,
        Vc3Variant::Id1237,
        Vc3Variant::Id1238,
        Vc3Variant::Id1241,
        Vc3Variant::Id1242,
        Vc3Variant::Id1243,
        Vc3Variant::Id1244,
        Vc3Variant::Id1250,
        Vc3Variant::Id1251,
        Vc3Variant::Id1252,
        Vc3Variant::Id1253,
        Vc3Variant::Id1258,
        Vc3Variant::Id1259,
        Vc3Variant::Id1260,
    ];

    pub fn compression_id(self) -> u32 {
        match self {
            Vc3Variant::Id1235 => 1235,
            Vc3Variant::Id1237 => 1237,
            Vc3Variant::Id1238 => 1238,
            Vc3Variant::Id1241 => 1241,
            Vc3Variant::Id1242 => 1242,
            Vc3Variant::Id1243 => 1243,
            Vc3Variant::Id1244 => 1244,
            Vc3Variant::Id1250 => 1250,
            Vc3Variant::Id1251 => 1251,
            Vc3Variant::Id1252 => 1252,
            Vc3Variant::Id1253 => 1253,
            Vc3Variant::Id1258 => 1258,
            Vc3Variant::Id1259 => 1259,
            Vc3Variant::Id1260 => 1260,
        }
    }

    pub fn from_compression_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.compression_id() == id)
    }

    pub fn scan(self) -> HdScan {
        match self {
            Vc3Variant::Id1235
            | Vc3Variant::Id1237
            | Vc3Variant::Id1238
            | Vc3Variant::Id1253
            | Vc3Variant::Id1259 => HdScan::Progressive1080,
            Vc3Variant::Id1241
            | Vc3Variant::Id1242
            | Vc3Variant::Id1243
            | Vc3Variant::Id1244
            | Vc3Variant::Id1260 => HdScan::Interlaced1080,
            Vc3Variant::Id1250 | Vc3Variant::Id1251 | Vc3Variant::Id1252 | Vc3Variant::Id1258 => {
                HdScan::Progressive720
            }
        }
    }

    /// Bytes per coded frame.
    pub fn frame_size(self) -> u32 {
        match self {
            Vc3Variant::Id1235 | Vc3Variant::Id1238 | Vc3Variant::Id1241 => 917_504,
            Vc3Variant::Id1243 => 917_504,
            Vc3Variant::Id1237 | Vc3Variant::Id1242 | Vc3Variant::Id1244 => 606_208,
            Vc3Variant::Id1250 | Vc3Variant::Id1251 => 458_752,
            Vc3Variant::Id1252 => 303_104,
            Vc3Variant::Id1253 => 188_416,
            Vc3Variant::Id1258 => 212_992,
            Vc3Variant::Id1259 | Vc3Variant::Id1260 => 417_792,
        }
    }
}

impl HdScan {
    fn suffix(self) -> &'static str {
        match self {
            HdScan::Interlaced1080 => "1080I",
            HdScan::Progressive1080 => "1080P",
            HdScan::Progressive720 => "720P",
        }
    }
}

impl EssenceType {
    /// Every concrete essence type, in declaration order.
    pub fn all() -> Vec<EssenceType> {
        use AvcProfile::*;
        use D10Variant::*;
        use DvVariant::*;
        use Mpeg2LgVariant::*;
        use Rdd36Profile::*;
        use UncVariant::*;

        let mut all = vec![
            EssenceType::Dv(Iec25),
            EssenceType::Dv(DvBased25),
            EssenceType::Dv(Dv50),
            EssenceType::Dv(Dv100_1080i),
            EssenceType::Dv(Dv100_1080p),
            EssenceType::Dv(Dv100_720p),
            EssenceType::D10(Mbps30),
            EssenceType::D10(Mbps40),
            EssenceType::D10(Mbps50),
        ];
        for class in [AvciClass::C50, AvciClass::C100, AvciClass::C200] {
            for scan in [
                HdScan::Interlaced1080,
                HdScan::Progressive1080,
                HdScan::Progressive720,
            ] {
                all.push(EssenceType::Avci(class, scan));
            }
        }
        all.extend(
            [
                Baseline,
                ConstrainedBaseline,
                Main,
                Extended,
                High,
                High10,
                High422,
                High444,
                High10Intra,
                High422Intra,
                High444Intra,
                Cavlc444Intra,
            ]
            .map(EssenceType::Avc),
        );
        all.extend(
            [
                P422Hl1080i,
                P422Hl1080p,
                P422Hl720p,
                MpHl1920_1080i,
                MpHl1920_1080p,
                MpHl1440_1080i,
                MpHl1440_1080p,
                MpHl720p,
                MpH14_1080i,
                MpH14_1080p,
            ]
            .map(EssenceType::Mpeg2Lg),
        );
        all.extend(Vc3Variant::ALL.map(EssenceType::Vc3));
        all.push(EssenceType::Vc2);
        all.extend([Proxy422, Lt422, Std422, Hq422, Std4444, Xq4444].map(EssenceType::Rdd36));
        all.extend([Sd, Hd1080i, Hd1080p, Hd720p, Uhd3840].map(EssenceType::Unc));
        all.extend([EssenceType::Pcm, EssenceType::Anc, EssenceType::Vbi]);
        all
    }

    pub fn data_def(self) -> DataDef {
        match self {
            EssenceType::Pcm => DataDef::Sound,
            EssenceType::Anc | EssenceType::Vbi => DataDef::Data,
            _ => DataDef::Picture,
        }
    }

    pub fn is_sound(self) -> bool {
        self.data_def() == DataDef::Sound
    }

    pub fn name(self) -> String {
        match self {
            EssenceType::Dv(v) => match v {
                DvVariant::Iec25 => "IEC_DV25".into(),
                DvVariant::DvBased25 => "DVBASED_DV25".into(),
                DvVariant::Dv50 => "DV50".into(),
                DvVariant::Dv100_1080i => "DV100_1080I".into(),
                DvVariant::Dv100_1080p => "DV100_1080P".into(),
                DvVariant::Dv100_720p => "DV100_720P".into(),
            },
            EssenceType::D10(v) => match v {
                D10Variant::Mbps30 => "D10_30".into(),
                D10Variant::Mbps40 => "D10_40".into(),
                D10Variant::Mbps50 => "D10_50".into(),
            },
            EssenceType::Avci(class, scan) => {
                let class = match class {
                    AvciClass::C50 => 50,
                    AvciClass::C100 => 100,
                    AvciClass::C200 => 200,
                };
                format!("AVCI{class}_{}", scan.suffix())
            }
            EssenceType::Avc(p) => match p {
                AvcProfile::Baseline => "AVC_BASELINE".into(),
                AvcProfile::ConstrainedBaseline => "AVC_CONSTRAINED_BASELINE".into(),
                AvcProfile::Main => "AVC_MAIN".into(),
                AvcProfile::Extended => "AVC_EXTENDED".into(),
                AvcProfile::High => "AVC_HIGH".into(),
                AvcProfile::High10 => "AVC_HIGH_10".into(),
                AvcProfile::High422 => "AVC_HIGH_422".into(),
                AvcProfile::High444 => "AVC_HIGH_444".into(),
                AvcProfile::High10Intra => "AVC_HIGH_10_INTRA".into(),
                AvcProfile::High422Intra => "AVC_HIGH_422_INTRA".into(),
                AvcProfile::High444Intra => "AVC_HIGH_444_INTRA".into(),
                AvcProfile::Cavlc444Intra => "AVC_CAVLC_444_INTRA".into(),
            },
            EssenceType::Mpeg2Lg(v) => match v {
                Mpeg2LgVariant::P422Hl1080i => "MPEG2LG_422P_HL_1080I".into(),
                Mpeg2LgVariant::P422Hl1080p => "MPEG2LG_422P_HL_1080P".into(),
                Mpeg2LgVariant::P422Hl720p => "MPEG2LG_422P_HL_720P".into(),
                Mpeg2LgVariant::MpHl1920_1080i => "MPEG2LG_MP_HL_1920_1080I".into(),
                Mpeg2LgVariant::MpHl1920_1080p => "MPEG2LG_MP_HL_1920_1080P".into(),
                Mpeg2LgVariant::MpHl1440_1080i => "MPEG2LG_MP_HL_1440_1080I".into(),
                Mpeg2LgVariant::MpHl1440_1080p => "MPEG2LG_MP_HL_1440_1080P".into(),
                Mpeg2LgVariant::MpHl720p => "MPEG2LG_MP_HL_720P".into(),
                Mpeg2LgVariant::MpH14_1080i => "MPEG2LG_MP_H14_1080I".into(),
                Mpeg2LgVariant::MpH14_1080p => "MPEG2LG_MP_H14_1080P".into(),
            },
            EssenceType::Vc3(v) => format!("VC3_{}_{}", v.scan().suffix(), v.compression_id()),
            EssenceType::Vc2 => "VC2".into(),
            EssenceType::Rdd36(p) => match p {
                Rdd36Profile::Proxy422 => "RDD36_422_PROXY".into(),
                Rdd36Profile::Lt422 => "RDD36_422_LT".into(),
                Rdd36Profile::Std422 => "RDD36_422".into(),
                Rdd36Profile::Hq422 => "RDD36_422_HQ".into(),
                Rdd36Profile::Std4444 => "RDD36_4444".into(),
                Rdd36Profile::Xq4444 => "RDD36_4444_XQ".into(),
            },
            EssenceType::Unc(v) => match v {
                UncVariant::Sd => "UNC_SD".into(),
                UncVariant::Hd1080i => "UNC_HD_1080I".into(),
                UncVariant::Hd1080p => "UNC_HD_1080P".into(),
                UncVariant::Hd720p => "UNC_HD_720P".into(),
                UncVariant::Uhd3840 => "UNC_UHD_3840".into(),
            },
            EssenceType::Pcm => "WAVE_PCM".into(),
            EssenceType::Anc => "ANC_DATA".into(),
            EssenceType::Vbi => "VBI_DATA".into(),
        }
    }

    /// Whether the essence can be wrapped at `rate`. `rate` is the sampling
    /// rate for sound and the clip frame rate otherwise.
    pub fn is_supported(self, rate: Rational) -> bool {
        const INTERLACED: [Rational; 2] = [FRAME_RATE_25, FRAME_RATE_2997];
        const PROGRESSIVE_1080: [Rational; 5] = [
            FRAME_RATE_23976,
            FRAME_RATE_24,
            FRAME_RATE_25,
            FRAME_RATE_2997,
            FRAME_RATE_30,
        ];
        const HIGH_RATE: [Rational; 3] = [FRAME_RATE_50, FRAME_RATE_5994, FRAME_RATE_60];

        let scan_rates = |scan: HdScan| match scan {
            HdScan::Interlaced1080 => INTERLACED.contains(&rate),
            HdScan::Progressive1080 => PROGRESSIVE_1080.contains(&rate),
            HdScan::Progressive720 => STANDARD_FRAME_RATES.contains(&rate),
        };

        match self {
            EssenceType::Dv(DvVariant::Dv100_720p) => {
                [FRAME_RATE_50, FRAME_RATE_5994].contains(&rate)
            }
            EssenceType::Dv(_) | EssenceType::D10(_) => INTERLACED.contains(&rate),
            EssenceType::Avci(_, scan) => scan_rates(scan),
            EssenceType::Vc3(v) => scan_rates(v.scan()),
            EssenceType::Unc(UncVariant::Sd | UncVariant::Hd1080i) => INTERLACED.contains(&rate),
            EssenceType::Unc(UncVariant::Hd1080p) => {
                PROGRESSIVE_1080.contains(&rate) || HIGH_RATE.contains(&rate)
            }
            EssenceType::Avc(_)
            | EssenceType::Mpeg2Lg(_)
            | EssenceType::Vc2
            | EssenceType::Rdd36(_)
            | EssenceType::Unc(_)
            | EssenceType::Anc
            | EssenceType::Vbi => STANDARD_FRAME_RATES.contains(&rate),
            EssenceType::Pcm => rate == SAMPLING_RATE_48K || rate == SAMPLING_RATE_96K,
        }
    }

    /// Size in bytes of every access unit, for essence whose units never vary.
    pub fn fixed_sample_size(self, frame_rate: Rational) -> Option<u32> {
        let is_50hz = frame_rate == FRAME_RATE_25 || frame_rate == FRAME_RATE_50;
        match self {
            EssenceType::Dv(v) => {
                let dv25 = if is_50hz { 144_000 } else { 120_000 };
                Some(match v {
                    DvVariant::Iec25 | DvVariant::DvBased25 => dv25,
                    DvVariant::Dv50 => dv25 * 2,
                    DvVariant::Dv100_1080i | DvVariant::Dv100_1080p => dv25 * 4,
                    DvVariant::Dv100_720p => dv25 * 2,
                })
            }
            EssenceType::Vc3(v) => Some(v.frame_size()),
            EssenceType::Unc(v) => Some(match v {
                UncVariant::Sd if is_50hz => 720 * 576 * 2,
                UncVariant::Sd => 720 * 486 * 2,
                UncVariant::Hd1080i | UncVariant::Hd1080p => 1920 * 1080 * 2,
                UncVariant::Hd720p => 1280 * 720 * 2,
                UncVariant::Uhd3840 => 3840 * 2160 * 2,
            }),
            _ => None,
        }
    }
}

impl Display for EssenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EssenceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        EssenceType::all()
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("unknown essence type '{s}'"))
    }
}

/// Coarse essence tag used until the bitstream has been probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceTypeGroup {
    Dv,
    D10,
    Mpeg2Lg,
    Vc3,
    Avci,
    Avc,
}

impl EssenceTypeGroup {
    /// Type assumed when the input has no samples. AVC-Intra has none.
    pub fn default_type(self) -> Option<EssenceType> {
        match self {
            EssenceTypeGroup::Dv => Some(EssenceType::Dv(DvVariant::Iec25)),
            EssenceTypeGroup::D10 => Some(EssenceType::D10(D10Variant::Mbps50)),
            EssenceTypeGroup::Mpeg2Lg => Some(EssenceType::Mpeg2Lg(Mpeg2LgVariant::P422Hl1080i)),
            EssenceTypeGroup::Vc3 => Some(EssenceType::Vc3(Vc3Variant::Id1242)),
            EssenceTypeGroup::Avc => Some(EssenceType::Avc(AvcProfile::High422)),
            EssenceTypeGroup::Avci => None,
        }
    }

    pub fn contains(self, essence_type: EssenceType) -> bool {
        matches!(
            (self, essence_type),
            (EssenceTypeGroup::Dv, EssenceType::Dv(_))
                | (EssenceTypeGroup::D10, EssenceType::D10(_))
                | (EssenceTypeGroup::Mpeg2Lg, EssenceType::Mpeg2Lg(_))
                | (EssenceTypeGroup::Vc3, EssenceType::Vc3(_))
                | (EssenceTypeGroup::Avci, EssenceType::Avci(..))
                | (EssenceTypeGroup::Avc, EssenceType::Avc(_))
        )
    }
}

impl Display for EssenceTypeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EssenceTypeGroup::Dv => "DV",
            EssenceTypeGroup::D10 => "D10",
            EssenceTypeGroup::Mpeg2Lg => "MPEG2LG",
            EssenceTypeGroup::Vc3 => "VC3",
            EssenceTypeGroup::Avci => "AVCI",
            EssenceTypeGroup::Avc => "AVC",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_parse_back() {
        let all = EssenceType::all();
        for t in &all {
            assert_eq!(t.name().parse::<EssenceType>().unwrap(), *t);
        }
        let mut names: Vec<String> = all.iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn group_defaults() {
        assert_eq!(
            EssenceTypeGroup::Dv.default_type(),
            Some(EssenceType::Dv(DvVariant::Iec25))
        );
        assert_eq!(
            EssenceTypeGroup::D10.default_type(),
            Some(EssenceType::D10(D10Variant::Mbps50))
        );
        assert_eq!(EssenceTypeGroup::Avci.default_type(), None);
    }

    #[test]
    fn support_and_sizes() {
        let dv25 = EssenceType::Dv(DvVariant::Iec25);
        assert!(dv25.is_supported(FRAME_RATE_25));
        assert!(!dv25.is_supported(FRAME_RATE_50));
        assert_eq!(dv25.fixed_sample_size(FRAME_RATE_25), Some(144_000));
        assert_eq!(dv25.fixed_sample_size(FRAME_RATE_2997), Some(120_000));

        assert!(EssenceType::Pcm.is_supported(SAMPLING_RATE_48K));
        assert!(!EssenceType::Pcm.is_supported(Rational::new(44100, 1)));

        assert_eq!(
            EssenceType::Vc3(Vc3Variant::Id1242).fixed_sample_size(FRAME_RATE_25),
            Some(606_208)
        );
        assert_eq!(Vc3Variant::from_compression_id(9999), None);
        assert_eq!(D10Variant::Mbps50.frame_size(FRAME_RATE_25), 250_000);
        assert_eq!(D10Variant::Mbps50.frame_size(FRAME_RATE_2997), 208_541);
        assert_eq!(DataDef::Picture.cmp(&DataDef::Sound), std::cmp::Ordering::Less);
    }
}

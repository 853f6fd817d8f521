use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use essence::process::graph::AvciHeaderDonor;
use essence::process::input::InputKind;
use essence::structs::essence_type::EssenceType;

/// An input given on the command line as `KIND:PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub kind: InputKind,
    pub path: PathBuf,
}

impl FromStr for InputSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("input '{s}' is not of the form KIND:PATH"))?;
        if path.is_empty() {
            return Err(anyhow!("input '{s}' has no path"));
        }
        Ok(Self {
            kind: kind.parse()?,
            path: PathBuf::from(path),
        })
    }
}

/// Parses `TYPE:FILE:OFFSET`, or `TYPE:FILE` for offset 0.
pub fn parse_avci_head(s: &str) -> Result<AvciHeaderDonor> {
    let (essence_type, rest) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("AVC-Intra header '{s}' is not of the form TYPE:FILE:OFFSET"))?;
    let is_offset = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let (path, offset) = match rest.rsplit_once(':') {
        Some((path, offset)) if is_offset(offset) => (path, offset.parse::<u64>()?),
        _ => (rest, 0),
    };

    let essence_type: EssenceType = essence_type.parse()?;
    if !matches!(essence_type, EssenceType::Avci(..)) {
        return Err(anyhow!("{essence_type} is not an AVC-Intra essence type"));
    }
    Ok(AvciHeaderDonor {
        essence_type,
        path: PathBuf::from(path),
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use essence::structs::essence_type::EssenceTypeGroup;

    #[test]
    fn input_tokens() -> Result<()> {
        let token: InputSpec = "dv:C:/media/in.dv".parse()?;
        assert_eq!(token.kind, InputKind::Group(EssenceTypeGroup::Dv));
        assert_eq!(token.path, PathBuf::from("C:/media/in.dv"));

        let token: InputSpec = "wave:a.wav".parse()?;
        assert_eq!(token.kind, InputKind::Wave);

        assert!("in.dv".parse::<InputSpec>().is_err());
        assert!("dv:".parse::<InputSpec>().is_err());
        assert!("mjpeg:in.avi".parse::<InputSpec>().is_err());
        Ok(())
    }

    #[test]
    fn avci_head_tokens() -> Result<()> {
        let donor = parse_avci_head("AVCI100_1080i:head.bin:1024")?;
        assert!(matches!(donor.essence_type, EssenceType::Avci(..)));
        assert_eq!(donor.path, PathBuf::from("head.bin"));
        assert_eq!(donor.offset, 1024);

        let donor = parse_avci_head("AVCI100_1080i:head.bin")?;
        assert_eq!(donor.offset, 0);

        assert!(parse_avci_head("WAVE_PCM:head.bin:0").is_err());
        Ok(())
    }
}

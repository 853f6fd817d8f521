use std::io::Read;

use anyhow::{Result, bail};
use log::debug;

use crate::process::input::EssenceSource;
use crate::structs::avc::{AVCI_HEADER_SIZE, has_avci_header};
use crate::structs::{EssenceParser, FrameSize};
use crate::utils::errors::ReadError;

const CHUNK_SIZE: usize = 64 * 1024;

enum Framing {
    None,
    Fixed(usize),
    Parsed(Box<dyn EssenceParser>),
    /// AVC-Intra: constant coded frame size, plus a parameter set header on
    /// frames that carry one.
    Avci(usize),
}

/// Splits a header-less essence stream into samples.
///
/// Samples are either a fixed number of bytes, found by an
/// [`EssenceParser`], or AVC-Intra frames of constant size. Samples read by
/// one [`read_samples`](Self::read_samples) call are concatenated in
/// [`sample_data`](Self::sample_data).
pub struct RawEssenceReader {
    source: EssenceSource,
    max_read_length: Option<u64>,
    stream: Option<Box<dyn Read>>,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
    consumed: u64,
    framing: Framing,
    max_sample_size: Option<usize>,
    sample_data: Vec<u8>,
    num_samples: u32,
}

impl RawEssenceReader {
    pub fn open(source: EssenceSource, max_read_length: Option<u64>) -> Result<Self> {
        let mut reader = Self {
            source,
            max_read_length,
            stream: None,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            pos: 0,
            eof: false,
            consumed: 0,
            framing: Framing::None,
            max_sample_size: None,
            sample_data: Vec::new(),
            num_samples: 0,
        };
        reader.reset()?;
        Ok(reader)
    }

    /// Rewinds to the start of the source. Framing settings are kept.
    pub fn reset(&mut self) -> Result<()> {
        let stream = self.source.open()?;
        let stream: Box<dyn Read> = match self.max_read_length {
            Some(max) => Box::new(stream.take(max)),
            None => stream,
        };
        self.stream = Some(stream);
        self.buffer.clear();
        self.pos = 0;
        self.eof = false;
        self.consumed = 0;
        self.sample_data.clear();
        self.num_samples = 0;
        Ok(())
    }

    /// Applies from the next [`reset`](Self::reset).
    pub fn set_max_read_length(&mut self, max_read_length: Option<u64>) {
        self.max_read_length = max_read_length;
    }

    pub fn set_fixed_sample_size(&mut self, size: usize) {
        self.framing = Framing::Fixed(size);
    }

    pub fn fixed_sample_size(&self) -> Option<usize> {
        match self.framing {
            Framing::Fixed(size) => Some(size),
            _ => None,
        }
    }

    pub fn has_framing(&self) -> bool {
        !matches!(self.framing, Framing::None)
    }

    pub fn set_essence_parser(&mut self, parser: Box<dyn EssenceParser>) {
        self.framing = Framing::Parsed(parser);
    }

    /// Reads AVC-Intra frames of `frame_size` bytes, plus the 512 byte
    /// header when a frame starts with one.
    pub fn set_avci_frame_size(&mut self, frame_size: usize) {
        self.framing = Framing::Avci(frame_size);
    }

    /// Samples found by a parser larger than `max` are a read error.
    pub fn set_check_max_sample_size(&mut self, max: usize) {
        self.max_sample_size = Some(max);
    }

    pub fn sample_data(&self) -> &[u8] {
        &self.sample_data
    }

    pub fn sample_data_size(&self) -> usize {
        self.sample_data.len()
    }

    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// Returns up to `size` bytes from the current position without consuming them.
    pub fn peek(&mut self, size: usize) -> Result<&[u8]> {
        self.fill(size)?;
        let end = self.buffer.len().min(self.pos + size);
        Ok(&self.buffer[self.pos..end])
    }

    /// Reads up to `num_samples` samples and returns how many were read.
    /// Fewer than requested means the stream ended.
    pub fn read_samples(&mut self, num_samples: u32) -> Result<u32> {
        self.sample_data.clear();
        self.num_samples = 0;
        while self.num_samples < num_samples {
            let Some(size) = self.next_sample_size()? else {
                break;
            };
            let start = self.pos;
            self.sample_data
                .extend_from_slice(&self.buffer[start..start + size]);
            self.pos += size;
            self.consumed += size as u64;
            self.num_samples += 1;
        }
        Ok(self.num_samples)
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Size of the next sample, with at least that many bytes buffered.
    fn next_sample_size(&mut self) -> Result<Option<usize>> {
        let size = match self.framing {
            Framing::None => bail!(ReadError::NoSampleFraming),
            Framing::Fixed(size) => size,
            Framing::Avci(frame_size) => {
                self.fill(AVCI_HEADER_SIZE)?;
                if has_avci_header(&self.buffer[self.pos..]) {
                    frame_size + AVCI_HEADER_SIZE
                } else {
                    frame_size
                }
            }
            Framing::Parsed(_) => match self.parse_sample_size()? {
                Some(size) => size,
                None => return Ok(None),
            },
        };
        if size == 0 {
            return Ok(None);
        }

        self.fill(size)?;
        if self.available() < size {
            if self.available() > 0 {
                debug!(
                    "Discarding {} trailing bytes, short of a {size} byte sample",
                    self.available()
                );
            }
            return Ok(None);
        }
        Ok(Some(size))
    }

    fn parse_sample_size(&mut self) -> Result<Option<usize>> {
        loop {
            let Framing::Parsed(parser) = &mut self.framing else {
                bail!(ReadError::NoSampleFraming);
            };
            let result = parser.parse_frame_size(&self.buffer[self.pos..]);
            let available = self.buffer.len() - self.pos;
            match result {
                FrameSize::Known(size) if size > 0 => {
                    self.check_sample_size(size)?;
                    return Ok(Some(size));
                }
                FrameSize::Known(_) | FrameSize::Invalid => {
                    if available == 0 && self.eof {
                        return Ok(None);
                    }
                    bail!(ReadError::InvalidSample(self.consumed));
                }
                FrameSize::Unknown if self.eof => {
                    return Ok((available > 0).then_some(available));
                }
                FrameSize::Unknown => {
                    self.check_sample_size(available)?;
                    self.fill(available + CHUNK_SIZE)?;
                }
            }
        }
    }

    fn check_sample_size(&self, size: usize) -> Result<()> {
        if let Some(max) = self.max_sample_size {
            if size > max {
                bail!(ReadError::SampleTooLarge { size, max });
            }
        }
        Ok(())
    }

    /// Buffers until `size` bytes are available or the stream ends.
    fn fill(&mut self, size: usize) -> Result<()> {
        if self.pos > 0 && self.pos >= self.buffer.len() / 2 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        let Some(stream) = self.stream.as_mut() else {
            bail!(ReadError::NotOpen);
        };

        let mut chunk = [0u8; CHUNK_SIZE];
        while !self.eof && self.buffer.len() - self.pos < size {
            let bytes_read = stream.read(&mut chunk)?;
            if bytes_read == 0 {
                self.eof = true;
            }
            self.buffer.extend_from_slice(&chunk[..bytes_read]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::mpeg2::{Mpeg2Parser, synth_mpeg2_frame};

    fn memory_reader(data: Vec<u8>) -> RawEssenceReader {
        RawEssenceReader::open(EssenceSource::memory(data), None).unwrap()
    }

    #[test]
    fn fixed_size_samples() -> Result<()> {
        let mut reader = memory_reader((0..10u8).collect());
        reader.set_fixed_sample_size(4);

        assert_eq!(reader.read_samples(1)?, 1);
        assert_eq!(reader.sample_data(), &[0, 1, 2, 3]);
        assert_eq!(reader.read_samples(3)?, 1);
        assert_eq!(reader.sample_data(), &[4, 5, 6, 7]);
        // 2 trailing bytes do not make a sample
        assert_eq!(reader.read_samples(1)?, 0);

        reader.reset()?;
        assert_eq!(reader.read_samples(2)?, 2);
        assert_eq!(reader.sample_data_size(), 8);
        Ok(())
    }

    #[test]
    fn max_read_length_limits_samples() -> Result<()> {
        let mut reader = memory_reader(vec![7u8; 100]);
        reader.set_max_read_length(Some(30));
        reader.reset()?;
        reader.set_fixed_sample_size(10);
        assert_eq!(reader.read_samples(10)?, 3);
        Ok(())
    }

    #[test]
    fn parsed_samples() -> Result<()> {
        let frame = synth_mpeg2_frame(1920, 1080, false, 0x82, 125_000, 3);
        let mut stream = frame.clone();
        stream.extend(&frame);
        let mut reader = memory_reader(stream);
        reader.set_essence_parser(Box::new(Mpeg2Parser::default()));

        assert_eq!(reader.read_samples(1)?, 1);
        assert_eq!(reader.sample_data(), frame.as_slice());
        assert_eq!(reader.read_samples(1)?, 1);
        assert_eq!(reader.sample_data(), frame.as_slice());
        assert_eq!(reader.read_samples(1)?, 0);
        Ok(())
    }

    #[test]
    fn oversized_and_invalid_samples() {
        let frame = synth_mpeg2_frame(1920, 1080, false, 0x82, 125_000, 3);
        let mut reader = memory_reader([frame.clone(), frame.clone()].concat());
        reader.set_essence_parser(Box::new(Mpeg2Parser::default()));
        reader.set_check_max_sample_size(8);
        let err = reader.read_samples(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReadError>(),
            Some(ReadError::SampleTooLarge { max: 8, .. })
        ));

        let mut reader = memory_reader(vec![0xff; 64]);
        reader.set_essence_parser(Box::new(Mpeg2Parser::default()));
        let err = reader.read_samples(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReadError>(),
            Some(ReadError::InvalidSample(0))
        ));
    }

    #[test]
    fn unframed_reader_fails() {
        let mut reader = memory_reader(vec![0; 4]);
        assert!(reader.read_samples(1).is_err());
    }
}

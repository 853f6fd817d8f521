use std::io::{self, Read};

use anyhow::{Result, bail};
use log::debug;

use crate::process::input::EssenceSource;
use crate::structs::rational::Rational;
use crate::utils::errors::WaveError;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub channel_count: u16,
    pub sampling_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    fn read(chunk: &[u8]) -> Result<Self> {
        if chunk.len() < 16 {
            bail!(WaveError::MissingFormat);
        }
        let u16_at = |i: usize| u16::from_le_bytes([chunk[i], chunk[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);

        let mut format_tag = u16_at(0);
        if format_tag == WAVE_FORMAT_EXTENSIBLE && chunk.len() >= 40 {
            // first two bytes of the sub-format GUID
            format_tag = u16_at(24);
        }
        if format_tag != WAVE_FORMAT_PCM {
            bail!(WaveError::UnsupportedFormat(format_tag));
        }

        let format = Self {
            channel_count: u16_at(2),
            sampling_rate: u32_at(4),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        };
        let expected = format.channel_count as u32 * format.bits_per_sample.div_ceil(8) as u32;
        if format.channel_count == 0
            || format.bits_per_sample == 0
            || format.block_align == 0
            || format.block_align as u32 != expected
        {
            bail!(WaveError::InvalidBlockAlign {
                block_align: format.block_align,
                channels: format.channel_count,
                bits: format.bits_per_sample,
            });
        }
        Ok(format)
    }

    pub fn sampling_rate(&self) -> Rational {
        Rational::new(self.sampling_rate as i32, 1)
    }
}

/// Reads interleaved PCM sample frames from a RIFF/WAVE source.
pub struct WaveReader {
    source: EssenceSource,
    stream: Box<dyn Read>,
    format: WaveFormat,
    data_remaining: u64,
    sample_data: Vec<u8>,
    num_samples: u32,
}

impl WaveReader {
    pub fn open(source: EssenceSource) -> Result<Self> {
        let mut stream = source.open()?;
        let (format, data_size) = read_header(&mut stream)?;
        debug!(
            "{}: {} channels, {} Hz, {} bits, {data_size} data bytes",
            source.name(),
            format.channel_count,
            format.sampling_rate,
            format.bits_per_sample
        );

        Ok(Self {
            source,
            stream,
            format,
            data_remaining: data_size,
            sample_data: Vec::new(),
            num_samples: 0,
        })
    }

    pub fn reset(&mut self) -> Result<()> {
        let mut stream = self.source.open()?;
        let (_, data_size) = read_header(&mut stream)?;
        self.stream = stream;
        self.data_remaining = data_size;
        self.sample_data.clear();
        self.num_samples = 0;
        Ok(())
    }

    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    pub fn sample_data(&self) -> &[u8] {
        &self.sample_data
    }

    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// Reads up to `num_samples` sample frames (one sample per channel).
    pub fn read_samples(&mut self, num_samples: u32) -> Result<u32> {
        let block_align = self.format.block_align as u64;
        let wanted = (num_samples as u64 * block_align).min(self.data_remaining);

        self.sample_data.clear();
        self.stream
            .by_ref()
            .take(wanted)
            .read_to_end(&mut self.sample_data)?;
        self.data_remaining -= self.sample_data.len() as u64;

        let whole = self.sample_data.len() - self.sample_data.len() % block_align as usize;
        self.sample_data.truncate(whole);
        self.num_samples = (whole as u64 / block_align) as u32;
        Ok(self.num_samples)
    }
}

fn read_header(stream: &mut Box<dyn Read>) -> Result<(WaveFormat, u64)> {
    let mut riff = [0u8; 12];
    stream.read_exact(&mut riff).map_err(|_| WaveError::NotRiff)?;
    if &riff[0..4] != b"RIFF" {
        bail!(WaveError::NotRiff);
    }
    if &riff[8..12] != b"WAVE" {
        bail!(WaveError::NotWave);
    }

    let mut format = None;
    loop {
        let mut header = [0u8; 8];
        if stream.read_exact(&mut header).is_err() {
            bail!(WaveError::MissingData);
        }
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
        match &header[0..4] {
            b"fmt " => {
                let mut chunk = vec![0u8; size as usize];
                stream.read_exact(&mut chunk)?;
                if size % 2 == 1 {
                    skip(stream, 1)?;
                }
                format = Some(WaveFormat::read(&chunk)?);
            }
            b"data" => {
                let Some(format) = format else {
                    bail!(WaveError::MissingFormat);
                };
                // streamed files leave the size unset
                let size = if size == 0 || size == u32::MAX as u64 {
                    u64::MAX
                } else {
                    size
                };
                return Ok((format, size));
            }
            _ => skip(stream, size + size % 2)?,
        }
    }
}

fn skip(stream: &mut Box<dyn Read>, len: u64) -> io::Result<()> {
    io::copy(&mut stream.by_ref().take(len), &mut io::sink())?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn synth_wave(channels: u16, bits: u16, sampling_rate: u32, data: &[u8]) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut wave = b"RIFF".to_vec();
    wave.extend((4 + 8 + 16 + 8 + 6 + 8 + data.len() as u32).to_le_bytes());
    wave.extend(b"WAVE");
    wave.extend(b"fmt ");
    wave.extend(16u32.to_le_bytes());
    wave.extend(WAVE_FORMAT_PCM.to_le_bytes());
    wave.extend(channels.to_le_bytes());
    wave.extend(sampling_rate.to_le_bytes());
    wave.extend((sampling_rate * block_align as u32).to_le_bytes());
    wave.extend(block_align.to_le_bytes());
    wave.extend(bits.to_le_bytes());
    // an odd sized chunk the reader must skip, with its pad byte
    wave.extend(b"junk");
    wave.extend(5u32.to_le_bytes());
    wave.extend([0u8; 6]);
    wave.extend(b"data");
    wave.extend((data.len() as u32).to_le_bytes());
    wave.extend(data);
    wave
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_stereo_frames() -> Result<()> {
        let data: Vec<u8> = (0..40u8).collect();
        let source = EssenceSource::memory(synth_wave(2, 16, 48_000, &data));
        let mut reader = WaveReader::open(source)?;
        assert_eq!(reader.format().channel_count, 2);
        assert_eq!(reader.format().block_align, 4);
        assert_eq!(reader.format().sampling_rate(), Rational::new(48_000, 1));

        assert_eq!(reader.read_samples(3)?, 3);
        assert_eq!(reader.sample_data(), &data[..12]);
        assert_eq!(reader.read_samples(100)?, 7);
        assert_eq!(reader.read_samples(1)?, 0);

        reader.reset()?;
        assert_eq!(reader.read_samples(1)?, 1);
        assert_eq!(reader.sample_data(), &data[..4]);
        Ok(())
    }

    #[test]
    fn rejects_bad_headers() {
        let err = WaveReader::open(EssenceSource::memory(b"RIFX\0\0\0\0WAVE".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<WaveError>(), Some(WaveError::NotRiff)));

        let mut wave = synth_wave(2, 16, 48_000, &[]);
        // block align 4 -> 3
        wave[32] = 3;
        let err = WaveReader::open(EssenceSource::memory(wave)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WaveError>(),
            Some(WaveError::InvalidBlockAlign { block_align: 3, .. })
        ));

        let wave = synth_wave(1, 0, 48_000, &[1, 2, 3, 4]);
        let err = WaveReader::open(EssenceSource::memory(wave)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<WaveError>(),
            Some(WaveError::InvalidBlockAlign { bits: 0, .. })
        ));
    }
}

use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use essmux_macros::{ToBytes, wave_chunk};

use crate::byteorder::WriteBytesLe;

const WAVE_FORMAT_PCM: u16 = 1;

/// Body of a RIFF chunk with a fixed id.
pub trait WaveChunk {
    const CHUNK_ID: [u8; 4];

    fn chunk_data(&self) -> Vec<u8>;

    /// Id, size and body, padded to an even length.
    fn chunk_bytes(&self) -> Vec<u8> {
        let data = self.chunk_data();
        let mut bytes = Vec::with_capacity(data.len() + 9);
        bytes.extend_from_slice(&Self::CHUNK_ID);
        (data.len() as u32).write_le(&mut bytes);
        bytes.extend_from_slice(&data);
        if data.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }
}

#[derive(Debug, Clone, ToBytes)]
#[wave_chunk(b"fmt ")]
pub struct FormatChunk {
    format_tag: u16,
    channels: u16,
    sampling_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl FormatChunk {
    pub fn pcm(sampling_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels,
            sampling_rate,
            byte_rate: sampling_rate * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }
}

/// RIFF/WAVE PCM writer. Sizes are patched in by [`WaveFileWriter::finish`].
pub struct WaveFileWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: FormatChunk,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
}

impl<W: Write + Seek> WaveFileWriter<W> {
    pub fn new(writer: W, format: FormatChunk) -> io::Result<Self> {
        let mut writer = BufWriter::new(writer);
        writer.write_all(b"RIFF")?;
        let riff_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(b"WAVE")?;
        writer.write_all(&format.chunk_bytes())?;
        writer.write_all(b"data")?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self {
            writer,
            format,
            riff_size_position,
            data_size_position,
            data_written: 0,
        })
    }

    /// Appends interleaved sample frames.
    pub fn write_frames(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.data_written += data.len() as u64;
        Ok(())
    }

    pub fn num_frames(&self) -> u64 {
        self.data_written / u64::from(self.format.block_align.max(1))
    }

    pub fn finish(&mut self) -> io::Result<()> {
        if self.data_written % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.writer.flush()?;
        let end = self.writer.stream_position()?;

        // sizes above 4 GiB are clamped
        let data_size = self.data_written.min(u64::from(u32::MAX)) as u32;
        let riff_size = (end - 8).min(u64::from(u32::MAX)) as u32;
        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_and_sizes() -> io::Result<()> {
        let format = FormatChunk::pcm(48000, 2, 24);
        let mut writer = WaveFileWriter::new(Cursor::new(Vec::new()), format)?;
        writer.write_frames(&[1, 2, 3, 4, 5, 6])?;
        assert_eq!(writer.num_frames(), 1);
        writer.finish()?;
        let wave = writer.into_inner()?.into_inner();

        assert_eq!(&wave[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wave[4..8].try_into().unwrap()), 44 - 8 + 6);
        assert_eq!(&wave[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(wave[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes([wave[32], wave[33]]), 6);
        assert_eq!(u32::from_le_bytes(wave[28..32].try_into().unwrap()), 288_000);
        assert_eq!(&wave[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wave[40..44].try_into().unwrap()), 6);
        assert_eq!(&wave[44..], [1, 2, 3, 4, 5, 6]);
        Ok(())
    }
}

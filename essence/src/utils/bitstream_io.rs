//! Bit-level reading and writing for essence header probing.
//!
//! Thin wrappers over `bitstream_io` big-endian readers/writers with the
//! variable length codes used by the probed codecs: H.264 exp-Golomb and
//! VC-2 interleaved exp-Golomb.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Unsigned exp-Golomb code, `ue(v)`.
    pub fn get_ue(&mut self) -> io::Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.get()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "get_ue: exp-Golomb code longer than 32 bits",
                ));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix: u32 = self.get_n(leading_zeros)?;
        Ok((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Signed exp-Golomb code, `se(v)`.
    pub fn get_se(&mut self) -> io::Result<i32> {
        let code = self.get_ue()? as i64;
        let value = if code & 1 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Ok(value as i32)
    }

    /// VC-2 interleaved exp-Golomb unsigned integer.
    pub fn get_vc2_uint(&mut self) -> io::Result<u32> {
        let mut value = 1u64;
        while !self.get()? {
            value <<= 1;
            if self.get()? {
                value += 1;
            }
            if value > u32::MAX as u64 + 1 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "get_vc2_uint: value exceeds 32 bits",
                ));
            }
        }
        Ok((value - 1) as u32)
    }

    #[inline(always)]
    pub fn byte_align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n <= 64 {
            self.bs.skip(n)
        } else {
            self.available().and_then(|avail| {
                if n as u64 > avail {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "skip_n: out of bounds bits",
                    ))
                } else {
                    self.bs.skip(n)
                }
            })
        }
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Big-endian bit writer into a growable byte vector.
pub struct BsIoVecWriter {
    bs: BitWriter<Vec<u8>, BigEndian>,
}

impl Default for BsIoVecWriter {
    fn default() -> Self {
        Self {
            bs: BitWriter::new(Vec::new()),
        }
    }
}

impl BsIoVecWriter {
    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bs.write_bit(bit)
    }

    #[inline(always)]
    pub fn put_n<U: UnsignedInteger>(&mut self, n: u32, value: U) -> io::Result<()> {
        self.bs.write_unsigned_var(n, value)
    }

    pub fn put_ue(&mut self, value: u32) -> io::Result<()> {
        let code = value as u64 + 1;
        let bits = 64 - code.leading_zeros();
        if bits > 1 {
            self.put_n::<u32>(bits - 1, 0)?;
        }
        self.put_n::<u64>(bits, code)
    }

    pub fn put_se(&mut self, value: i32) -> io::Result<()> {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.put_ue(code)
    }

    /// Writes `rbsp_trailing_bits()`: a stop bit then zero bits to the byte boundary.
    pub fn put_trailing_bits(&mut self) -> io::Result<()> {
        self.put(true)?;
        self.bs.byte_align()
    }

    pub fn byte_aligned(&self) -> bool {
        self.bs.byte_aligned()
    }

    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        self.bs.byte_align()?;
        Ok(self.bs.into_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_golomb_codes() -> io::Result<()> {
        let mut writer = BsIoVecWriter::default();
        for value in [0u32, 1, 2, 7, 255, 1919] {
            writer.put_ue(value)?;
        }
        for value in [0i32, 1, -1, 26, -26] {
            writer.put_se(value)?;
        }
        let bytes = writer.into_bytes()?;

        let mut reader = BsIoSliceReader::from_slice(&bytes);
        for value in [0u32, 1, 2, 7, 255, 1919] {
            assert_eq!(reader.get_ue()?, value);
        }
        for value in [0i32, 1, -1, 26, -26] {
            assert_eq!(reader.get_se()?, value);
        }
        Ok(())
    }

    #[test]
    fn vc2_interleaved_codes() -> io::Result<()> {
        // 1 -> 0, 001 -> 1, 011 -> 2, 00001 -> 3
        let bytes = [0b1001_0110, 0b0001_0000];
        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert_eq!(reader.get_vc2_uint()?, 0);
        assert_eq!(reader.get_vc2_uint()?, 1);
        assert_eq!(reader.get_vc2_uint()?, 2);
        assert_eq!(reader.get_vc2_uint()?, 3);
        Ok(())
    }
}

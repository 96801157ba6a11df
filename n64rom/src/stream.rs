use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::SeekFrom;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Access of {len} bytes at offset 0x{offset:X} is outside buffer of length 0x{size:X}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("Seek to a position before the start of the buffer")]
    SeekBeforeStart,
}

type Result<T> = ::std::result::Result<T, Error>;

fn checked_range(offset: usize, len: usize, size: usize) -> Result<std::ops::Range<usize>> {
    let end = offset.checked_add(len).filter(|&end| end <= size);
    match end {
        Some(end) => Ok(offset..end),
        None => Err(Error::OutOfRange { offset, len, size }),
    }
}

fn resolve_seek(pos: SeekFrom, cursor: usize, size: usize) -> Result<usize> {
    let target = match pos {
        SeekFrom::Start(n) => n as i128,
        SeekFrom::Current(n) => cursor as i128 + n as i128,
        SeekFrom::End(n) => size as i128 + n as i128,
    };
    if target < 0 {
        Err(Error::SeekBeforeStart)
    } else {
        Ok(target as usize)
    }
}

/// Bounded cursor over a read-only byte buffer.
///
/// Big-endian is the native order of everything on an N64 cartridge, so the
/// unsuffixed integer reads decode big-endian; `_le` variants exist for the
/// odd little-endian field. Absolute (`_at`) reads leave the cursor alone,
/// cursor reads advance by the size read.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn from(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the cursor is at or past the end of the buffer.
    pub fn eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Remaining bytes from the cursor to the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// The cursor may be placed past the end; only reads are range-checked.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<usize> {
        self.pos = resolve_seek(pos, self.pos, self.buf.len())?;
        Ok(self.pos)
    }

    pub fn read_bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let range = checked_range(offset, len, self.buf.len())?;
        Ok(&self.buf[range])
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.read_bytes_at(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.read_bytes_at(offset, 1)?[0])
    }

    pub fn read_u16_at(&self, offset: usize) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes_at(offset, 2)?))
    }

    pub fn read_u24_at(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read_bytes_at(offset, 3)?))
    }

    pub fn read_u32_at(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes_at(offset, 4)?))
    }

    pub fn read_u16_le_at(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes_at(offset, 2)?))
    }

    pub fn read_u32_le_at(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes_at(offset, 4)?))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.read_u8_at(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.read_u16_at(self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let value = self.read_u24_at(self.pos)?;
        self.pos += 3;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.read_u32_at(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let value = self.read_u16_le_at(self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let value = self.read_u32_le_at(self.pos)?;
        self.pos += 4;
        Ok(value)
    }
}

/// Bounded cursor over a mutable byte buffer. Same addressing rules as
/// [`Reader`].
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn from(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<usize> {
        self.pos = resolve_seek(pos, self.pos, self.buf.len())?;
        Ok(self.pos)
    }

    pub fn write_bytes_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = checked_range(offset, bytes.len(), self.buf.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_bytes_at(self.pos, bytes)?;
        self.pos += bytes.len();
        Ok(())
    }

    /// Write `len` copies of `value` at `offset`, cursor untouched.
    pub fn fill(&mut self, value: u8, len: usize, offset: usize) -> Result<()> {
        let range = checked_range(offset, len, self.buf.len())?;
        self.buf[range].fill(value);
        Ok(())
    }

    pub fn write_u8_at(&mut self, offset: usize, value: u8) -> Result<()> {
        self.write_bytes_at(offset, &[value])
    }

    pub fn write_u16_at(&mut self, offset: usize, value: u16) -> Result<()> {
        self.write_bytes_at(offset, &value.to_be_bytes())
    }

    pub fn write_u24_at(&mut self, offset: usize, value: u32) -> Result<()> {
        let mut bytes = [0; 3];
        BigEndian::write_u24(&mut bytes, value & 0xFF_FFFF);
        self.write_bytes_at(offset, &bytes)
    }

    pub fn write_u32_at(&mut self, offset: usize, value: u32) -> Result<()> {
        self.write_bytes_at(offset, &value.to_be_bytes())
    }

    pub fn write_u16_le_at(&mut self, offset: usize, value: u16) -> Result<()> {
        self.write_bytes_at(offset, &value.to_le_bytes())
    }

    pub fn write_u32_le_at(&mut self, offset: usize, value: u32) -> Result<()> {
        self.write_bytes_at(offset, &value.to_le_bytes())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_u8_at(self.pos, value)?;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_u16_at(self.pos, value)?;
        self.pos += 2;
        Ok(())
    }

    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        self.write_u24_at(self.pos, value)?;
        self.pos += 3;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_u32_at(self.pos, value)?;
        self.pos += 4;
        Ok(())
    }
}

use std::io::{self, Read, SeekFrom};
use thiserror::Error;

use flate2::read::ZlibDecoder;
use n64rom::rom::Rom as N64Rom;
use n64rom::stream::{self, Reader, Writer};

use crate::dma::{self, Entry, ENTRY_SIZE};
use crate::rom::{self, Rom};

/// Patch payload magic, after the outer zlib container is removed.
const MAGIC: &[u8; 5] = b"ZPFv1";

/// Config block follows the magic; the DMA update table follows the config.
const DMA_UPDATES_OFFSET: usize = 21;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Patch magic does not match {:?}", MAGIC)]
    BadMagic,
    #[error("Patch data ended mid-record")]
    Truncated,
    #[error("Failed to inflate the patch container: {0}")]
    ContainerError(#[from] io::Error),
    #[error("Patch references unknown source file 0x{0:08X}")]
    UnknownSourceFile(u32),
    #[error("Patch addresses 0x{0:08X}..0x{1:08X} fall outside the rom")]
    AddressOutOfRange(u32, u32),
    #[error("No nonzero key bytes in the XOR range")]
    ExhaustedKeystream,
    #[error("{0}")]
    DmaError(#[from] dma::Error),
    #[error("{0}")]
    RomError(#[from] rom::Error),
    #[error("{0}")]
    N64Error(#[from] n64rom::rom::Error),
    #[error("{0}")]
    StreamError(#[from] stream::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

/// Nonzero key bytes drawn by scanning a window of the source rom.
///
/// The address steps forward through `[lo, hi]`, wrapping at the top, and
/// zero bytes are skipped; a patch encodes a literal zero as a zero source
/// byte instead of consuming a key.
struct Keystream<'a> {
    rom: &'a [u8],
    lo: u32,
    hi: u32,
    address: u32,
}

impl<'a> Keystream<'a> {
    fn from(rom: &'a [u8], lo: u32, hi: u32, address: u32) -> Self {
        Self {
            rom,
            lo,
            hi,
            address,
        }
    }

    fn next(&mut self) -> Result<u8> {
        // Bound the walk: one approach to the window plus a full cycle. A
        // window with no nonzero byte would otherwise never yield.
        let cycle = self.hi.saturating_sub(self.lo) as u64 + 2;
        let approach = self.hi.saturating_sub(self.address) as u64;
        for _ in 0..approach + cycle {
            self.address = self.address.wrapping_add(1);
            if self.address > self.hi {
                self.address = self.lo;
            }
            let key = *self
                .rom
                .get(self.address as usize)
                .ok_or(Error::AddressOutOfRange(
                    self.address,
                    self.address.wrapping_add(1),
                ))?;
            if key != 0 {
                return Ok(key);
            }
        }
        Err(Error::ExhaustedKeystream)
    }
}

/// A parsed ZPFv1 patch.
pub struct Patch {
    data: Vec<u8>,
    pub dma_offset: u32,
    pub xor_range_lo: u32,
    pub xor_range_hi: u32,
    pub xor_address: u32,
}

impl Patch {
    /// Inflate the container and parse magic and config.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let mut data = Vec::new();
        ZlibDecoder::new(bytes).read_to_end(&mut data)?;

        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(Error::BadMagic);
        }

        let mut reader = Reader::from(&data);
        reader.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        let dma_offset = reader.read_u32().map_err(|_| Error::Truncated)?;
        let xor_range_lo = reader.read_u32().map_err(|_| Error::Truncated)?;
        let xor_range_hi = reader.read_u32().map_err(|_| Error::Truncated)?;
        let xor_address = reader.read_u32().map_err(|_| Error::Truncated)?;

        Ok(Self {
            data,
            dma_offset,
            xor_range_lo,
            xor_range_hi,
            xor_address,
        })
    }

    /// Apply to a decompressed rom, producing a new rom of the same size.
    pub fn apply(&self, rom: &Rom) -> Result<Rom> {
        let input = rom.image();
        let mut output = input.to_vec();

        let mut reader = Reader::from(&self.data);
        reader.seek(SeekFrom::Start(DMA_UPDATES_OFFSET as u64))?;

        self.apply_dma_updates(&mut reader, rom, input, &mut output)?;
        self.apply_blocks(&mut reader, input, &mut output)?;

        let mut n64 = N64Rom::from_vec(output)?;
        n64.correct_crc()?;
        Ok(Rom::from(n64, rom.table))
    }

    /// Phase A: rewrite DMA entries and import or clear their file bytes.
    fn apply_dma_updates(
        &self,
        reader: &mut Reader<'_>,
        rom: &Rom,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<()> {
        loop {
            let index = reader.read_u16().map_err(|_| Error::Truncated)?;
            if index == 0xFFFF {
                return Ok(());
            }
            let from_file = reader.read_u32().map_err(|_| Error::Truncated)?;
            let start = reader.read_u32().map_err(|_| Error::Truncated)?;
            let size = reader.read_u24().map_err(|_| Error::Truncated)?;

            let end = start
                .checked_add(size)
                .ok_or(Error::AddressOutOfRange(start, u32::MAX))?;
            let entry = Entry::from_uncompressed(start, end);
            let at = self.dma_offset as usize + index as usize * ENTRY_SIZE;
            let mut writer = Writer::from(&mut *output);
            writer.seek(SeekFrom::Start(at as u64))?;
            entry.write(&mut writer)?;

            let dst = output
                .get_mut(start as usize..end as usize)
                .ok_or(Error::AddressOutOfRange(start, end))?;

            if from_file != u32::MAX {
                let source = rom
                    .find_by_key(from_file)?
                    .ok_or(Error::UnknownSourceFile(from_file))?;
                // ZPFv1 caps the import length with the source entry's
                // physical start, odd as that reads.
                let copy_len = size.min(source.physical_start) as usize;
                let src = input
                    .get(from_file as usize..from_file as usize + copy_len)
                    .ok_or(Error::AddressOutOfRange(
                        from_file,
                        from_file.saturating_add(size),
                    ))?;
                dst[..copy_len].copy_from_slice(src);
                dst[copy_len..].fill(0);
            } else {
                dst.fill(0);
            }
        }
    }

    /// Phase B: XOR-keyed data blocks to the end of the patch.
    fn apply_blocks(
        &self,
        reader: &mut Reader<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<()> {
        let mut keys = Keystream::from(input, self.xor_range_lo, self.xor_range_hi, self.xor_address);
        let mut block_start = 0usize;

        while !reader.eof() {
            let first = reader.read_u8().map_err(|_| Error::Truncated)?;
            let block_size = if first != 0xFF {
                // New block: the byte just read is the top of blockStart.
                // Valid block addresses stay below 0xFF000000, so the
                // sentinel is unambiguous.
                reader.seek(SeekFrom::Current(-1))?;
                block_start = reader.read_u32().map_err(|_| Error::Truncated)? as usize;
                reader.read_u16().map_err(|_| Error::Truncated)? as usize
            } else {
                let key_skip = reader.read_u8().map_err(|_| Error::Truncated)?;
                let size = reader.read_u16().map_err(|_| Error::Truncated)? as usize;
                for _ in 0..key_skip {
                    keys.next()?;
                }
                size
            };

            let src = reader.read_bytes(block_size).map_err(|_| Error::Truncated)?;
            let dst = output
                .get_mut(block_start..block_start + block_size)
                .ok_or(Error::AddressOutOfRange(
                    block_start as u32,
                    (block_start + block_size) as u32,
                ))?;
            for (out, &coded) in dst.iter_mut().zip(src) {
                *out = if coded == 0 { 0 } else { coded ^ keys.next()? };
            }
            block_start += block_size;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;

    fn deflate(payload: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn config(dma_offset: u32, lo: u32, hi: u32, address: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(MAGIC);
        payload.extend_from_slice(&dma_offset.to_be_bytes());
        payload.extend_from_slice(&lo.to_be_bytes());
        payload.extend_from_slice(&hi.to_be_bytes());
        payload.extend_from_slice(&address.to_be_bytes());
        payload
    }

    #[test]
    fn read_parses_config() {
        let mut payload = config(0x1060, 0x100, 0x102, 0x100);
        payload.extend_from_slice(&0xFFFFu16.to_be_bytes());
        let patch = Patch::read(&deflate(&payload)).unwrap();
        assert_eq!(patch.dma_offset, 0x1060);
        assert_eq!(patch.xor_range_lo, 0x100);
        assert_eq!(patch.xor_range_hi, 0x102);
        assert_eq!(patch.xor_address, 0x100);
    }

    #[test]
    fn wrong_magic_version() {
        let mut payload = config(0, 0, 0, 0);
        payload[4] = b'2';
        assert!(matches!(
            Patch::read(&deflate(&payload)),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn truncated_config() {
        let payload = &config(0, 0, 0, 0)[..9];
        assert!(matches!(
            Patch::read(&deflate(payload)),
            Err(Error::Truncated)
        ));
    }

    #[test]
    fn keystream_skips_zero_and_wraps() {
        let mut rom = vec![0u8; 0x200];
        rom[0x100] = 0x22;
        rom[0x101] = 0x11;
        rom[0x102] = 0x00;
        let mut keys = Keystream::from(&rom, 0x100, 0x102, 0x100);
        assert_eq!(keys.next().unwrap(), 0x11);
        // 0x102 holds zero; the stream wraps to 0x100.
        assert_eq!(keys.next().unwrap(), 0x22);
        assert_eq!(keys.next().unwrap(), 0x11);
    }

    #[test]
    fn keystream_decodes_block() {
        let mut rom = vec![0u8; 0x200];
        rom[0x100] = 0x22;
        rom[0x101] = 0x11;
        let mut keys = Keystream::from(&rom, 0x100, 0x102, 0x100);
        let coded = [0x05u8, 0x00, 0x06];
        let decoded: Vec<u8> = coded
            .iter()
            .map(|&s| {
                if s == 0 {
                    0
                } else {
                    s ^ keys.next().unwrap()
                }
            })
            .collect();
        assert_eq!(decoded, [0x14, 0x00, 0x24]);
    }

    #[test]
    fn keystream_without_keys_fails() {
        let rom = vec![0u8; 0x200];
        let mut keys = Keystream::from(&rom, 0x100, 0x102, 0x100);
        assert!(matches!(keys.next(), Err(Error::ExhaustedKeystream)));
    }
}

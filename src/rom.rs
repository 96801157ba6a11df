use thiserror::Error;

use n64rom::rom::Rom as N64Rom;

use crate::dma::{self, Entry, Table};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    DmaError(#[from] dma::Error),
    #[error("{0}")]
    RomError(#[from] n64rom::rom::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

/// Zelda64 rom: an N64 rom normalized to big-endian plus its located DMA
/// table.
pub struct Rom {
    /// Underlying N64 rom.
    pub rom: N64Rom,
    pub table: Table,
}

impl Rom {
    /// Take ownership of an image, normalize its byte order and locate the
    /// DMA table. Normalization is the one place the incoming bytes are
    /// rewritten.
    pub fn read(image: Vec<u8>) -> Result<Self> {
        let mut rom = N64Rom::from_vec(image)?;
        rom.normalize()?;
        let table = Table::read(rom.image())?;
        Ok(Self { rom, table })
    }

    pub fn from(rom: N64Rom, table: Table) -> Self {
        Self { rom, table }
    }

    pub fn image(&self) -> &[u8] {
        self.rom.image()
    }

    pub fn image_mut(&mut self) -> &mut [u8] {
        self.rom.image_mut()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.rom.into_vec()
    }

    pub fn entry(&self, index: usize) -> Result<Entry> {
        Ok(self.table.entry(self.rom.image(), index)?)
    }

    /// First entry whose virtual start equals `key`.
    pub fn find_by_key(&self, key: u32) -> Result<Option<Entry>> {
        Ok(self.table.find_by_key(self.rom.image(), key)?)
    }

    /// Check that no two live DMA entries share virtual bytes.
    pub fn verify_non_overlapping(&self) -> Result<()> {
        Ok(self.table.validate(self.rom.image())?)
    }

    /// Recompute and write the header checksums.
    pub fn correct_crc(&mut self) -> Result<bool> {
        Ok(self.rom.correct_crc()?)
    }
}

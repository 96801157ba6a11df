use std::fmt;
use std::ops::Range;
use thiserror::Error;

use n64rom::stream::{self, Reader, Writer};

/// Table entry size.
pub const ENTRY_SIZE: usize = 0x10;

/// Index of the entry describing the table itself.
pub const INFO_INDEX: usize = 2;

/// First entry carrying game file data; 0..=2 are makerom, boot and the
/// table itself.
pub const FILE_BASE_INDEX: usize = 3;

/// Word index where the signature scan begins (byte offset 0x1060).
const SCAN_START_WORD: usize = 1048;

/// The table always sits in the first 16 MiB.
const SCAN_LIMIT: usize = 0x0100_0000;

/// Big-endian word pair marking entry 0 of the table.
const SIGNATURE: (u32, u32) = (0x0000_0000, 0x6010_0000);

#[derive(Debug, Error)]
pub enum Error {
    #[error("DMA table signature not found within the first 16 MiB")]
    TableNotFound,
    #[error("Entry 2 does not describe a valid table: (0x{0:08X}, 0x{1:08X})")]
    BadInfoEntry(u32, u32),
    #[error("Entry index {0} out of range for table of {1} entries")]
    IndexOutOfRange(usize, usize),
    #[error("Entries at 0x{0:08X} and 0x{1:08X} overlap in virtual space")]
    Overlap(u32, u32),
    #[error("{0}")]
    StreamError(#[from] stream::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub virtual_start: u32,
    pub virtual_end: u32,
    pub physical_start: u32,
    pub physical_end: u32,
}

pub enum EntryType {
    /// Entry file is compressed: stored bytes are `phys()`.
    Compressed,

    /// Entry file is stored raw at `physical_start`, `virt().len()` bytes.
    Uncompressed,

    /// Entry file does not exist (physical addresses are both 0xFFFFFFFF).
    DoesNotExist,

    /// Entry is all zero.
    Empty,
}

impl Entry {
    pub fn from(
        virtual_start: u32,
        virtual_end: u32,
        physical_start: u32,
        physical_end: u32,
    ) -> Self {
        Self {
            virtual_start,
            virtual_end,
            physical_start,
            physical_end,
        }
    }

    /// Entry for a file stored raw at its own virtual address.
    pub fn from_uncompressed(virtual_start: u32, virtual_end: u32) -> Self {
        Self::from(virtual_start, virtual_end, virtual_start, 0)
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let virtual_start = reader.read_u32()?;
        let virtual_end = reader.read_u32()?;
        let physical_start = reader.read_u32()?;
        let physical_end = reader.read_u32()?;
        Ok(Self {
            virtual_start,
            virtual_end,
            physical_start,
            physical_end,
        })
    }

    pub fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_u32(self.virtual_start)?;
        writer.write_u32(self.virtual_end)?;
        writer.write_u32(self.physical_start)?;
        writer.write_u32(self.physical_end)?;
        Ok(())
    }

    /// Get virtual start and end addresses.
    pub fn virt(&self) -> Range<u32> {
        self.virtual_start..self.virtual_end
    }

    /// Get physical start and end addresses.
    pub fn phys(&self) -> Range<u32> {
        self.physical_start..self.physical_end
    }

    pub fn virt_len(&self) -> u32 {
        self.virtual_end.wrapping_sub(self.virtual_start)
    }

    /// Get the respective EntryType.
    pub fn kind(&self) -> EntryType {
        if self.virtual_start == 0
            && self.virtual_end == 0
            && self.physical_start == 0
            && self.physical_end == 0
        {
            EntryType::Empty
        } else if self.physical_start == u32::MAX && self.physical_end == u32::MAX {
            EntryType::DoesNotExist
        } else if self.physical_end == 0 {
            EntryType::Uncompressed
        } else {
            EntryType::Compressed
        }
    }

    /// Entries with a zero virtual range terminate iteration over the table.
    pub fn is_terminator(&self) -> bool {
        self.virtual_start == 0 && self.virtual_end == 0
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "virt: 0x{:08X}..0x{:08X}  phys: 0x{:08X}..0x{:08X}",
            self.virtual_start, self.virtual_end, self.physical_start, self.physical_end
        )
    }
}

/// Located DMA table: an offset into the image plus the entry count derived
/// from the table's own entry at [`INFO_INDEX`].
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub address: usize,
    pub count: usize,
}

impl Table {
    /// Scan big-endian words for the entry-0 signature.
    pub fn find_offset(image: &[u8]) -> Result<usize> {
        let limit = image.len().min(SCAN_LIMIT);
        let reader = Reader::from(image);
        let mut offset = SCAN_START_WORD * 4;
        while offset + 8 <= limit {
            if reader.read_u32_at(offset)? == SIGNATURE.0
                && reader.read_u32_at(offset + 4)? == SIGNATURE.1
            {
                return Ok(offset);
            }
            offset += 4;
        }
        Err(Error::TableNotFound)
    }

    /// Locate the table and size it from its own entry.
    pub fn read(image: &[u8]) -> Result<Self> {
        let address = Self::find_offset(image)?;
        let mut reader = Reader::from(image);
        reader.seek(std::io::SeekFrom::Start(
            (address + INFO_INDEX * ENTRY_SIZE) as u64,
        ))?;
        let info = Entry::read(&mut reader)?;
        if info.virtual_end <= info.virtual_start {
            return Err(Error::BadInfoEntry(info.virtual_start, info.virtual_end));
        }
        let size = (info.virtual_end - info.virtual_start) as usize;
        Ok(Self {
            address,
            count: size / ENTRY_SIZE,
        })
    }

    /// Total table size in bytes.
    pub fn size(&self) -> usize {
        self.count * ENTRY_SIZE
    }

    fn entry_offset(&self, index: usize) -> Result<usize> {
        if index < self.count {
            Ok(self.address + index * ENTRY_SIZE)
        } else {
            Err(Error::IndexOutOfRange(index, self.count))
        }
    }

    pub fn entry(&self, image: &[u8], index: usize) -> Result<Entry> {
        let offset = self.entry_offset(index)?;
        let mut reader = Reader::from(image);
        reader.seek(std::io::SeekFrom::Start(offset as u64))?;
        Entry::read(&mut reader)
    }

    pub fn write_entry(&self, image: &mut [u8], index: usize, entry: &Entry) -> Result<()> {
        let offset = self.entry_offset(index)?;
        let mut writer = Writer::from(image);
        writer.seek(std::io::SeekFrom::Start(offset as u64))?;
        entry.write(&mut writer)
    }

    /// The entry describing the table itself.
    pub fn info(&self, image: &[u8]) -> Result<Entry> {
        self.entry(image, INFO_INDEX)
    }

    /// First entry whose virtual start equals `key`, scanning in table
    /// order. Stops at the all-zero terminator.
    pub fn find_by_key(&self, image: &[u8], key: u32) -> Result<Option<Entry>> {
        for index in 0..self.count {
            let entry = self.entry(image, index)?;
            if entry.is_terminator() {
                return Ok(None);
            }
            if entry.virtual_start == key {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Check that no two live entries share virtual bytes.
    ///
    /// Entry 0 carries the table locator signature rather than a usable
    /// span, so it is not part of the layout check.
    pub fn validate(&self, image: &[u8]) -> Result<()> {
        let mut entries = Vec::new();
        for index in 1..self.count {
            let entry = self.entry(image, index)?;
            if entry.is_terminator() {
                break;
            }
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.virtual_start);
        for pair in entries.windows(2) {
            if pair[0].virtual_end > pair[1].virtual_start {
                return Err(Error::Overlap(
                    pair[0].virtual_start,
                    pair[1].virtual_start,
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DMA table at 0x{:08X}, {} entries",
            self.address, self.count
        )
    }
}

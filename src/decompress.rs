use std::ops::Range;
use thiserror::Error;

use n64rom::rom::Rom as N64Rom;

use crate::dma::{self, Entry, FILE_BASE_INDEX};
use crate::rom::Rom;
use crate::util::ConvertRangeExt;
use crate::yaz0;
use crate::DECOMPRESSED_CAPACITY;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    DmaError(#[from] dma::Error),
    #[error("{0}")]
    N64Error(#[from] n64rom::rom::Error),
    #[error("Entry address range out of bounds: (0x{:08X}, 0x{:08X})", .0.start, .0.end)]
    OutOfRangeError(Range<u32>),
    #[error("Yaz0 decompression error: {0}")]
    Yaz0Error(#[from] yaz0::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

/// A fully decompressed rom plus the entries that were already stored raw.
///
/// The exclusion indices are handed back to [`crate::compress`] so a later
/// recompression leaves those files uncompressed again.
pub struct Decompressed {
    pub rom: Rom,
    pub exclusions: Vec<i32>,
}

/// Expand every file to its virtual address in a 64 MiB image.
pub fn decompress(rom: &Rom) -> Result<Decompressed> {
    let input = rom.image();
    let table = rom.table;

    let mut data = vec![0u8; DECOMPRESSED_CAPACITY];
    data[..input.len()].copy_from_slice(input);
    // Everything past the DMA table gets rebuilt at virtual addresses.
    let info = table.info(input)?;
    let tail = (info.virtual_end as usize).min(data.len());
    data[tail..].fill(0);

    let mut exclusions = Vec::new();
    for index in FILE_BASE_INDEX..table.count {
        let entry = table.entry(input, index)?;
        if entry.physical_start as usize >= DECOMPRESSED_CAPACITY || entry.physical_end == u32::MAX
        {
            continue;
        }

        let virt = entry.virt();
        let out = data
            .get_mut(virt.to_usize())
            .ok_or_else(|| Error::OutOfRangeError(virt.clone()))?;
        let phys_start = entry.physical_start as usize;

        if entry.physical_end == 0 {
            // Already raw; remember it so recompression keeps it that way.
            exclusions.push(index as i32);
            let src = input
                .get(phys_start..phys_start + out.len())
                .ok_or_else(|| Error::OutOfRangeError(entry.phys()))?;
            out.copy_from_slice(src);
        } else {
            let src = input
                .get(phys_start + yaz0::HEADER_SIZE..)
                .ok_or(yaz0::Error::SourceOverrun)?;
            yaz0::decompress_into(src, out)?;
        }

        table.write_entry(
            &mut data,
            index,
            &Entry::from_uncompressed(entry.virtual_start, entry.virtual_end),
        )?;
    }

    let mut n64 = N64Rom::from_vec(data)?;
    n64.correct_crc()?;
    Ok(Decompressed {
        rom: Rom::from(n64, table),
        exclusions,
    })
}

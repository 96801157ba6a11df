use std::ops::Range;
use thiserror::Error;

use n64rom::rom::Rom as N64Rom;

use crate::dma::{self, FILE_BASE_INDEX};
use crate::rom::Rom;
use crate::util::ConvertRangeExt;
use crate::yaz0;
use crate::COMPRESSED_CAPACITY;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    DmaError(#[from] dma::Error),
    #[error("{0}")]
    N64Error(#[from] n64rom::rom::Error),
    #[error("Entry address range out of bounds: (0x{:08X}, 0x{:08X})", .0.start, .0.end)]
    OutOfRangeError(Range<u32>),
    #[error("Compression cancelled")]
    Cancelled,
}

type Result<T> = ::std::result::Result<T, Error>;

/// How a file entry is carried into the compressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOp {
    /// Yaz0-encode the file (the default).
    Compress,
    /// Store the file raw; used for files the source rom also stored raw.
    Copy,
    /// Drop the file and mark its entry absent.
    Null,
}

/// Build the per-entry operation table from an exclusion list. Non-negative
/// indices keep that file raw; negative indices erase file `-index`.
fn file_ops(exclusions: &[i32], count: usize) -> Vec<FileOp> {
    let mut ops = vec![FileOp::Compress; count];
    for &e in exclusions {
        let (index, op) = if e >= 0 {
            (e as usize, FileOp::Copy)
        } else {
            (e.wrapping_neg() as usize, FileOp::Null)
        };
        if index >= count {
            log::warn!("Ignoring out-of-range exclusion index {}", e);
            continue;
        }
        if index < FILE_BASE_INDEX {
            continue;
        }
        ops[index] = op;
    }
    ops
}

/// Pack every file back into a 32 MiB image.
pub fn compress(rom: &Rom, exclusions: &[i32]) -> Result<Rom> {
    compress_with(rom, exclusions, |_, _| true)
}

/// Like [`compress`], invoking `on_entry(index, count)` after each DMA
/// entry. Returning `false` aborts and drops the partial output.
pub fn compress_with<F>(rom: &Rom, exclusions: &[i32], mut on_entry: F) -> Result<Rom>
where
    F: FnMut(usize, usize) -> bool,
{
    let input = rom.image();
    let table = rom.table;
    let ops = file_ops(exclusions, table.count);

    let mut output = vec![0u8; COMPRESSED_CAPACITY];
    // Header, boot code and the table as laid out in the source image.
    let prefix = table.address + table.size();
    if prefix > input.len() || prefix > output.len() {
        return Err(Error::OutOfRangeError(0..prefix as u32));
    }
    output[..prefix].copy_from_slice(&input[..prefix]);

    // Physical layout cursor.
    let mut prev = prefix;

    for index in FILE_BASE_INDEX..table.count {
        let mut entry = table.entry(input, index)?;
        if entry.virtual_start == entry.virtual_end {
            if !on_entry(index, table.count) {
                return Err(Error::Cancelled);
            }
            continue;
        }

        let virt = entry.virt();
        let src = input
            .get(virt.to_usize())
            .ok_or_else(|| Error::OutOfRangeError(virt.clone()))?;

        let encoded;
        let payload: &[u8] = match ops[index] {
            FileOp::Copy => src,
            FileOp::Compress => {
                encoded = yaz0::compress(src);
                &encoded
            }
            FileOp::Null => &[],
        };

        entry.physical_start = prev as u32;
        entry.physical_end = match ops[index] {
            FileOp::Compress => (prev + payload.len()) as u32,
            FileOp::Copy => 0,
            FileOp::Null => {
                entry.physical_start = u32::MAX;
                u32::MAX
            }
        };

        if !payload.is_empty() {
            // Writes past the 32 MiB boundary are absorbed; the entry keeps
            // its computed addresses either way.
            let end = (prev + payload.len()).min(output.len());
            if end > prev.min(output.len()) {
                output[prev..end].copy_from_slice(&payload[..end - prev]);
            }
            if prev + payload.len() > output.len() {
                log::warn!(
                    "Entry {} extends past the compressed capacity; truncated",
                    index
                );
            }
        }

        table.write_entry(&mut output, index, &entry)?;
        prev += payload.len();

        if !on_entry(index, table.count) {
            return Err(Error::Cancelled);
        }
    }

    let mut n64 = N64Rom::from_vec(output)?;
    n64.correct_crc()?;
    Ok(Rom::from(n64, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_default_to_compress() {
        let ops = file_ops(&[], 6);
        assert!(ops.iter().all(|&op| op == FileOp::Compress));
    }

    #[test]
    fn ops_exclusion_signs() {
        let ops = file_ops(&[4, -5], 6);
        assert_eq!(ops[3], FileOp::Compress);
        assert_eq!(ops[4], FileOp::Copy);
        assert_eq!(ops[5], FileOp::Null);
    }

    #[test]
    fn ops_out_of_range_skipped() {
        let ops = file_ops(&[99, -99, 1], 6);
        // Indices below the file base stay untouched too.
        assert!(ops.iter().all(|&op| op == FileOp::Compress));
    }
}

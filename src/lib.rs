#![warn(rust_2018_idioms)]

pub mod compress;
pub mod decompress;
pub mod dma;
pub mod patch;
pub mod rom;
pub mod util;
pub mod yaz0;

/// Compressed cartridge capacity is 32 MiB.
pub const COMPRESSED_CAPACITY: usize = 1024 * 1024 * 32;

/// Decompressed rom capacity is 64 MiB.
pub const DECOMPRESSED_CAPACITY: usize = 1024 * 1024 * 64;

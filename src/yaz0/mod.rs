//! The Yaz0 back-reference compression scheme used by Zelda64 file payloads.
//!
//! A frame is a 16-byte header (`"Yaz0"`, big-endian uncompressed size, 8
//! reserved bytes) followed by groups of up to 8 tokens, each group led by a
//! code byte whose bits select literal (1) or back-reference (0) tokens.

use thiserror::Error;

pub mod deflate;
pub mod inflate;

pub use deflate::compress;
pub use inflate::{decompress, decompress_into};

pub const MAGIC: [u8; 4] = *b"Yaz0";

/// Frame header size.
pub const HEADER_SIZE: usize = 0x10;

/// Back-references reach at most 0x1000 bytes back.
pub const MAX_DISTANCE: usize = 0x1000;

/// Longest span a single token can cover.
pub const MAX_LENGTH: usize = 0x111;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing Yaz0 magic")]
    InvalidMagic,
    #[error("Yaz0 stream ended before the output was complete")]
    SourceOverrun,
    #[error("Yaz0 stream writes past the end of the output")]
    DestinationOverflow,
    #[error("Back-reference at output position 0x{0:X} reaches before the start of the output")]
    BadBackReference(usize),
}

type Result<T> = ::std::result::Result<T, Error>;

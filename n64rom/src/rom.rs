use std::fmt;
use thiserror::Error;

use crate::convert::{self, ConvertStatus};
use crate::crc;
use crate::header::{self, Header};

/// Header plus IPL3 boot code.
pub const HEAD_SIZE: usize = 0x1000;

/// Largest image handled (a fully decompressed Zelda64 cartridge).
pub const MAX_SIZE: usize = 1024 * 1024 * 64;

#[derive(Debug, Error)]
pub enum Error {
    #[error("First byte 0x{0:02X} does not match any known ROM byte order")]
    UnknownMagic(u8),
    #[error("Image of length 0x{0:X} is too small to be an N64 ROM")]
    ImageTooSmall(usize),
    #[error("Image of length 0x{0:X} is too large to be an N64 ROM")]
    ImageTooBig(usize),
    #[error("{0}")]
    ConvertError(#[from] convert::Error),
    #[error("{0}")]
    CrcError(#[from] crc::Error),
    #[error("{0}")]
    HeaderError(#[from] header::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

/// On-disk byte ordering of a ROM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Native cartridge order ("z64"), first byte 0x80.
    Big,
    /// Swapped within 16-bit words ("v64"), first byte 0x37.
    Mixed,
    /// Reversed 32-bit words ("n64"), first byte 0x40.
    Little,
}

impl Endianness {
    /// Infer the ordering from the first header byte.
    pub fn infer(magic: u8) -> Option<Self> {
        match magic {
            0x80 => Some(Self::Big),
            0x37 => Some(Self::Mixed),
            0x40 => Some(Self::Little),
            _ => None,
        }
    }

    /// Conventional file extension for this ordering.
    pub fn file_ext(&self) -> &'static str {
        match self {
            Self::Big => "z64",
            Self::Mixed => "v64",
            Self::Little => "n64",
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Big => write!(f, "big"),
            Self::Mixed => write!(f, "mixed"),
            Self::Little => write!(f, "little"),
        }
    }
}

/// An owned N64 ROM image.
///
/// The image is kept contiguous; callers address header, boot code and
/// payload through offsets into one buffer.
pub struct Rom {
    image: Vec<u8>,
    order: Endianness,
}

impl Rom {
    /// Take ownership of an image, inferring its byte order from the first
    /// byte. No conversion is performed; see [`Rom::normalize`].
    pub fn from_vec(image: Vec<u8>) -> Result<Self> {
        if image.len() < HEAD_SIZE {
            return Err(Error::ImageTooSmall(image.len()));
        }
        if image.len() > MAX_SIZE {
            return Err(Error::ImageTooBig(image.len()));
        }
        let order = Endianness::infer(image[0]).ok_or(Error::UnknownMagic(image[0]))?;
        Ok(Self { image, order })
    }

    /// Current byte order of the buffer.
    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.image
    }

    /// Convert the buffer to big-endian in place. Returns whether any work
    /// was done.
    pub fn normalize(&mut self) -> Result<ConvertStatus> {
        let status = convert::convert(&mut self.image, self.order, Endianness::Big)?;
        self.order = Endianness::Big;
        Ok(status)
    }

    /// Convert the buffer to `target` in place.
    pub fn convert(&mut self, target: Endianness) -> Result<ConvertStatus> {
        let status = convert::convert(&mut self.image, self.order, target)?;
        self.order = target;
        Ok(status)
    }

    /// Parse the cartridge header. Only meaningful in big-endian order.
    pub fn header(&self) -> Result<Header> {
        Ok(Header::read(&self.image)?)
    }

    /// Whether the header checksums match a fresh computation.
    pub fn check_crc(&self) -> Result<(bool, (u32, u32))> {
        Ok(crc::check(&self.image)?)
    }

    /// Recompute and write the header checksums. Returns `true` when they
    /// were already correct.
    pub fn correct_crc(&mut self) -> Result<bool> {
        let before = crc::read(&self.image);
        let after = crc::correct(&mut self.image)?;
        Ok(before == after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_magic(magic: u8) -> Vec<u8> {
        let mut image = vec![0u8; HEAD_SIZE];
        image[0] = magic;
        image
    }

    #[test]
    fn infer_orderings() {
        assert_eq!(Endianness::infer(0x80), Some(Endianness::Big));
        assert_eq!(Endianness::infer(0x37), Some(Endianness::Mixed));
        assert_eq!(Endianness::infer(0x40), Some(Endianness::Little));
        assert_eq!(Endianness::infer(0x12), None);
    }

    #[test]
    fn from_vec_detects_order() {
        let rom = Rom::from_vec(image_with_magic(0x37)).unwrap();
        assert_eq!(rom.order(), Endianness::Mixed);
        assert!(matches!(
            Rom::from_vec(image_with_magic(0x00)),
            Err(Error::UnknownMagic(0x00))
        ));
    }

    #[test]
    fn rejects_undersized_image() {
        assert!(matches!(
            Rom::from_vec(vec![0x80; 0x100]),
            Err(Error::ImageTooSmall(0x100))
        ));
    }

    #[test]
    fn normalize_mixed_image() {
        let mut image = image_with_magic(0x37);
        image[1] = 0x80;
        image[2] = 0x40;
        image[3] = 0x12;
        let mut rom = Rom::from_vec(image).unwrap();
        rom.normalize().unwrap();
        assert_eq!(rom.order(), Endianness::Big);
        assert_eq!(&rom.image()[..4], &[0x80, 0x37, 0x12, 0x40]);
    }

    #[test]
    fn extensions() {
        assert_eq!(Endianness::Big.file_ext(), "z64");
        assert_eq!(Endianness::Mixed.file_ext(), "v64");
        assert_eq!(Endianness::Little.file_ext(), "n64");
    }
}

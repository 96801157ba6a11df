use std::fmt;
use thiserror::Error;

use crate::stream::{self, Reader, Writer};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    StreamError(#[from] stream::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

/// The 0x40-byte cartridge header at the start of every ROM image.
#[derive(Debug, Clone)]
pub struct Header {
    /// PI BSD DOM1 configuration, first byte doubling as the byte-order magic.
    pub device_config: u32,
    pub clock_rate: u32,
    pub entry_point: u32,
    pub release: u32,
    pub crc1: u32,
    pub crc2: u32,
    reserved1: [u8; 8],
    pub name: [u8; 20],
    reserved2: [u8; 7],
    pub manufacturer: u8,
    pub cart_id: [u8; 2],
    pub region_code: u8,
    reserved3: u8,
}

impl Header {
    pub const SIZE: usize = 0x40;

    /// Parse a big-endian header from the front of `image`.
    pub fn read(image: &[u8]) -> Result<Self> {
        let mut reader = Reader::from(image);
        let device_config = reader.read_u32()?;
        let clock_rate = reader.read_u32()?;
        let entry_point = reader.read_u32()?;
        let release = reader.read_u32()?;
        let crc1 = reader.read_u32()?;
        let crc2 = reader.read_u32()?;
        let mut reserved1 = [0; 8];
        reserved1.copy_from_slice(reader.read_bytes(8)?);
        let mut name = [0; 20];
        name.copy_from_slice(reader.read_bytes(20)?);
        let mut reserved2 = [0; 7];
        reserved2.copy_from_slice(reader.read_bytes(7)?);
        let manufacturer = reader.read_u8()?;
        let mut cart_id = [0; 2];
        cart_id.copy_from_slice(reader.read_bytes(2)?);
        let region_code = reader.read_u8()?;
        let reserved3 = reader.read_u8()?;

        Ok(Self {
            device_config,
            clock_rate,
            entry_point,
            release,
            crc1,
            crc2,
            reserved1,
            name,
            reserved2,
            manufacturer,
            cart_id,
            region_code,
            reserved3,
        })
    }

    /// Serialize back over the front of `image`.
    pub fn write(&self, image: &mut [u8]) -> Result<()> {
        let mut writer = Writer::from(image);
        writer.write_u32(self.device_config)?;
        writer.write_u32(self.clock_rate)?;
        writer.write_u32(self.entry_point)?;
        writer.write_u32(self.release)?;
        writer.write_u32(self.crc1)?;
        writer.write_u32(self.crc2)?;
        writer.write_bytes(&self.reserved1)?;
        writer.write_bytes(&self.name)?;
        writer.write_bytes(&self.reserved2)?;
        writer.write_u8(self.manufacturer)?;
        writer.write_bytes(&self.cart_id)?;
        writer.write_u8(self.region_code)?;
        writer.write_u8(self.reserved3)?;
        Ok(())
    }

    /// Image name with trailing padding stripped.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn cart_id_str(&self) -> String {
        String::from_utf8_lossy(&self.cart_id).into_owned()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Name: {}", self.name_str())?;
        writeln!(
            f,
            "  Cart: {}{}{}",
            self.manufacturer as char,
            self.cart_id_str(),
            self.region_code as char
        )?;
        writeln!(f, "  Entry Point: 0x{:08X}", self.entry_point)?;
        write!(f, "  CRC: (0x{:08X}, 0x{:08X})", self.crc1, self.crc2)
    }
}

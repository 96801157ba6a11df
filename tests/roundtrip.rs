//! End-to-end transformations over a synthetic 32 MiB cartridge image whose
//! boot block is patched to carry the CIC-6102 signature CRC.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write as _;

use z64patch::dma::ENTRY_SIZE;
use z64patch::patch::Patch;
use z64patch::rom::Rom;
use z64patch::{compress, decompress, yaz0, COMPRESSED_CAPACITY, DECOMPRESSED_CAPACITY};

const TABLE_ADDRESS: usize = 0x1060;
const TABLE_COUNT: usize = 6;

const FILE3_VIRT: usize = 0x2000;
const FILE3_LEN: usize = 0x800;
const FILE3_PHYS: usize = 0x4000;

const FILE4_VIRT: usize = 0x3000;
const FILE4_LEN: usize = 0x400;
const FILE4_PHYS: usize = 0x8000;

// Reflected CRC-32 helpers for forging the boot block signature. Four free
// trailing bytes are enough to steer the CRC to any value: processing bytes
// B from state S equals processing four zero bytes from S ^ B.
const POLYNOMIAL: u32 = 0xEDB8_8320;

fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *slot = crc;
    }
    table
}

fn forge_crc32(region: &mut [u8], target: u32) {
    let table = crc_table();
    let split = region.len() - 4;

    let mut state = !0u32;
    for &byte in &region[..split] {
        state = (state >> 8) ^ table[((state ^ byte as u32) & 0xFF) as usize];
    }

    // Walk the final state backwards through four zero-byte steps.
    let mut want = !target;
    for _ in 0..4 {
        let i = (0..256)
            .find(|&i| table[i] >> 24 == want >> 24)
            .unwrap() as u32;
        want = ((want ^ table[i as usize]) << 8) | i;
    }

    let patch = state ^ want;
    region[split..].copy_from_slice(&patch.to_le_bytes());
}

fn write_entry(image: &mut [u8], index: usize, fields: (u32, u32, u32, u32)) {
    let at = TABLE_ADDRESS + index * ENTRY_SIZE;
    image[at..at + 4].copy_from_slice(&fields.0.to_be_bytes());
    image[at + 4..at + 8].copy_from_slice(&fields.1.to_be_bytes());
    image[at + 8..at + 12].copy_from_slice(&fields.2.to_be_bytes());
    image[at + 12..at + 16].copy_from_slice(&fields.3.to_be_bytes());
}

fn file3_data() -> Vec<u8> {
    let mut data = Vec::with_capacity(FILE3_LEN);
    while data.len() < FILE3_LEN {
        data.extend_from_slice(b"actor table \x00\x01\x02\x03");
    }
    data.truncate(FILE3_LEN);
    data
}

fn file4_data() -> Vec<u8> {
    (0..FILE4_LEN).map(|i| (i * 13 + 7) as u8).collect()
}

/// A compressed cartridge: boot at 0x40, table at 0x1060, one Yaz0 file,
/// one raw file, one terminator.
fn build_cartridge() -> Vec<u8> {
    let mut image = vec![0u8; COMPRESSED_CAPACITY];
    image[0..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
    image[0x20..0x29].copy_from_slice(b"ROUNDTRIP");

    for i in 0x40..0x1000 {
        image[i] = (i * 7 + 3) as u8;
    }
    forge_crc32(&mut image[0x40..0x1000], 0x90BB_6CB5);

    let table_end = (TABLE_ADDRESS + TABLE_COUNT * ENTRY_SIZE) as u32;
    let encoded = yaz0::compress(&file3_data());

    write_entry(&mut image, 0, (0, 0x6010_0000, 0, 0));
    write_entry(&mut image, 1, (0x40, 0x1000, 0x40, 0));
    write_entry(
        &mut image,
        2,
        (TABLE_ADDRESS as u32, table_end, TABLE_ADDRESS as u32, 0),
    );
    write_entry(
        &mut image,
        3,
        (
            FILE3_VIRT as u32,
            (FILE3_VIRT + FILE3_LEN) as u32,
            FILE3_PHYS as u32,
            (FILE3_PHYS + encoded.len()) as u32,
        ),
    );
    write_entry(
        &mut image,
        4,
        (FILE4_VIRT as u32, (FILE4_VIRT + FILE4_LEN) as u32, FILE4_PHYS as u32, 0),
    );
    write_entry(&mut image, 5, (0, 0, 0, 0));

    image[FILE3_PHYS..FILE3_PHYS + encoded.len()].copy_from_slice(&encoded);
    image[FILE4_PHYS..FILE4_PHYS + FILE4_LEN].copy_from_slice(&file4_data());

    image
}

#[test]
fn boot_block_forgery_holds() {
    let image = build_cartridge();
    assert_eq!(n64rom::crc::crc32(&image[0x40..0x1000]), 0x90BB_6CB5);
}

#[test]
fn decompress_then_recompress() {
    let rom = Rom::read(build_cartridge()).unwrap();
    let result = decompress::decompress(&rom).unwrap();

    // The raw file and the terminator come back as exclusions.
    assert_eq!(result.exclusions, vec![4, 5]);

    let image = result.rom.image();
    assert_eq!(image.len(), DECOMPRESSED_CAPACITY);
    assert_eq!(&image[FILE3_VIRT..FILE3_VIRT + FILE3_LEN], &file3_data()[..]);
    assert_eq!(&image[FILE4_VIRT..FILE4_VIRT + FILE4_LEN], &file4_data()[..]);

    // Every live entry now points at its virtual address, uncompressed.
    let entry = result.rom.entry(3).unwrap();
    assert_eq!(entry.physical_start, FILE3_VIRT as u32);
    assert_eq!(entry.physical_end, 0);
    result.rom.verify_non_overlapping().unwrap();

    let (crc_ok, _) = n64rom::crc::check(image).unwrap();
    assert!(crc_ok);

    // Pack it back down and compare per-entry contents with the source.
    let packed = compress::compress(&result.rom, &result.exclusions).unwrap();
    let packed_image = packed.image();
    assert_eq!(packed_image.len(), COMPRESSED_CAPACITY);
    packed.verify_non_overlapping().unwrap();

    let entry = packed.entry(3).unwrap();
    let stored = &packed_image[entry.physical_start as usize..entry.physical_end as usize];
    assert_eq!(yaz0::decompress(stored).unwrap(), file3_data());

    let entry = packed.entry(4).unwrap();
    assert_eq!(entry.physical_end, 0);
    let start = entry.physical_start as usize;
    assert_eq!(&packed_image[start..start + FILE4_LEN], &file4_data()[..]);

    let (crc_ok, _) = n64rom::crc::check(packed_image).unwrap();
    assert!(crc_ok);
}

#[test]
fn compress_can_erase_files() {
    let rom = Rom::read(build_cartridge()).unwrap();
    let result = decompress::decompress(&rom).unwrap();

    // Negative exclusion index erases the file.
    let packed = compress::compress(&result.rom, &[-4, 5]).unwrap();
    let entry = packed.entry(4).unwrap();
    assert_eq!(entry.physical_start, u32::MAX);
    assert_eq!(entry.physical_end, u32::MAX);
    // The virtual span survives for later patching.
    assert_eq!(entry.virtual_start, FILE4_VIRT as u32);
}

#[test]
fn crc_recompute_is_deterministic() {
    let image = {
        let rom = Rom::read(build_cartridge()).unwrap();
        decompress::decompress(&rom).unwrap().rom.into_vec()
    };
    let mut a = image.clone();
    let mut b = image;
    n64rom::crc::correct(&mut a).unwrap();
    n64rom::crc::correct(&mut b).unwrap();
    assert_eq!(&a[0x10..0x18], &b[0x10..0x18]);
}

#[test]
fn byte_orders_normalize_identically() {
    let big = build_cartridge();

    let mut mixed = big.clone();
    for pair in mixed.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    let mut little = big.clone();
    for word in little.chunks_exact_mut(4) {
        word.reverse();
    }

    let from_big = Rom::read(big.clone()).unwrap();
    let from_mixed = Rom::read(mixed).unwrap();
    let from_little = Rom::read(little).unwrap();
    assert_eq!(from_big.image(), &big[..]);
    assert_eq!(from_mixed.image(), &big[..]);
    assert_eq!(from_little.image(), &big[..]);
}

// Replicates the keystream rule so the fixture can encode payloads the
// patcher is expected to decode.
struct Keys<'a> {
    rom: &'a [u8],
    lo: u32,
    hi: u32,
    address: u32,
}

impl<'a> Keys<'a> {
    fn next(&mut self) -> u8 {
        loop {
            self.address += 1;
            if self.address > self.hi {
                self.address = self.lo;
            }
            let key = self.rom[self.address as usize];
            if key != 0 {
                return key;
            }
        }
    }
}

#[test]
fn patch_rewrites_dma_and_blocks() {
    let rom = Rom::read(build_cartridge()).unwrap();
    let decompressed = decompress::decompress(&rom).unwrap().rom;
    let input = decompressed.image().to_vec();

    let (xor_lo, xor_hi, xor_address) = (0x40u32, 0x4Fu32, 0x40u32);
    let mut payload = Vec::new();
    payload.extend_from_slice(b"ZPFv1");
    payload.extend_from_slice(&(TABLE_ADDRESS as u32).to_be_bytes());
    payload.extend_from_slice(&xor_lo.to_be_bytes());
    payload.extend_from_slice(&xor_hi.to_be_bytes());
    payload.extend_from_slice(&xor_address.to_be_bytes());

    // Move file 4: import the first 0x400 bytes of file 3's region, which
    // the p_start copy cap happens to allow in full.
    payload.extend_from_slice(&4u16.to_be_bytes());
    payload.extend_from_slice(&(FILE3_VIRT as u32).to_be_bytes());
    payload.extend_from_slice(&(FILE4_VIRT as u32).to_be_bytes());
    payload.extend_from_slice(&(FILE4_LEN as u32).to_be_bytes()[1..]);
    payload.extend_from_slice(&0xFFFFu16.to_be_bytes());

    let mut keys = Keys {
        rom: &input,
        lo: xor_lo,
        hi: xor_hi,
        address: xor_address,
    };
    let plain_a = [0xDEu8, 0x00, 0xAD, 0xBE];
    let plain_b = [0x01u8, 0x02];

    // New block at file 3's start.
    payload.extend_from_slice(&(FILE3_VIRT as u32).to_be_bytes());
    payload.extend_from_slice(&(plain_a.len() as u16).to_be_bytes());
    for &p in &plain_a {
        payload.push(if p == 0 { 0 } else { p ^ keys.next() });
    }
    // Continuation with two skipped keys.
    payload.push(0xFF);
    payload.push(2);
    for _ in 0..2 {
        keys.next();
    }
    payload.extend_from_slice(&(plain_b.len() as u16).to_be_bytes());
    for &p in &plain_b {
        payload.push(if p == 0 { 0 } else { p ^ keys.next() });
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload).unwrap();
    let zpf = encoder.finish().unwrap();

    let patch = Patch::read(&zpf).unwrap();
    let patched = patch.apply(&decompressed).unwrap();
    let out = patched.image();

    // Phase A: entry 4 now mirrors file 3's first 0x400 bytes.
    let entry = patched.entry(4).unwrap();
    assert_eq!(entry.virtual_start, FILE4_VIRT as u32);
    assert_eq!(entry.virtual_end, (FILE4_VIRT + FILE4_LEN) as u32);
    assert_eq!(entry.physical_start, FILE4_VIRT as u32);
    assert_eq!(entry.physical_end, 0);
    assert_eq!(
        &out[FILE4_VIRT..FILE4_VIRT + FILE4_LEN],
        &input[FILE3_VIRT..FILE3_VIRT + FILE4_LEN]
    );

    // Phase B: both blocks landed in sequence.
    assert_eq!(&out[FILE3_VIRT..FILE3_VIRT + 4], &plain_a);
    assert_eq!(&out[FILE3_VIRT + 4..FILE3_VIRT + 6], &plain_b);

    let (crc_ok, _) = n64rom::crc::check(out).unwrap();
    assert!(crc_ok);

    // Patching is a pure function of the two inputs.
    let again = patch.apply(&decompressed).unwrap();
    assert_eq!(again.image(), out);
}

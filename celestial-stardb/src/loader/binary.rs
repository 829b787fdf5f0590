//! Binary star files.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 8 | magic `CELSTARS` |
//! | 8 | 2 | version, little-endian `0x0100` |
//! | 10 | 4 | record count, little-endian `u32` |
//! | 14 | 20·n | star records |
//!
//! Each star record is, little-endian throughout:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | catalog number (`u32`) |
//! | 4 | 12 | position x, y, z in light years (`f32`) |
//! | 16 | 2 | absolute magnitude × 256 (`i16`) |
//! | 18 | 2 | details index (`u16`) |

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::star::CatalogNumber;

pub const STAR_FILE_MAGIC: &[u8; 8] = b"CELSTARS";
pub const STAR_FILE_VERSION: u16 = 0x0100;
pub const STAR_RECORD_SIZE: usize = 20;
const FILE_TYPE: &str = "star file";
const MAG_SCALE: f32 = 256.0;

/// One fixed-layout record of a binary star file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryStarRecord {
    pub catalog_number: CatalogNumber,
    pub position: Vector3<f32>,
    pub abs_mag: f32,
    pub details_index: u16,
}

impl BinaryStarRecord {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let catalog_number = reader.read_u32::<LittleEndian>()?;
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        let abs_mag = reader.read_i16::<LittleEndian>()? as f32 / MAG_SCALE;
        let details_index = reader.read_u16::<LittleEndian>()?;
        Ok(Self {
            catalog_number,
            position: Vector3::new(x, y, z),
            abs_mag,
            details_index,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.catalog_number)?;
        writer.write_f32::<LittleEndian>(self.position.x)?;
        writer.write_f32::<LittleEndian>(self.position.y)?;
        writer.write_f32::<LittleEndian>(self.position.z)?;
        let packed = (self.abs_mag * MAG_SCALE)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_i16::<LittleEndian>(packed)?;
        writer.write_u16::<LittleEndian>(self.details_index)
    }
}

/// Decodes a whole binary star file.
///
/// All records are decoded before returning, so a truncated stream yields an
/// error and no partial result.
pub fn read_star_file<R: Read>(mut reader: R) -> Result<Vec<BinaryStarRecord>> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| Error::from_read(e, FILE_TYPE, "the header"))?;
    if &magic != STAR_FILE_MAGIC {
        return Err(Error::BadMagic {
            file_type: FILE_TYPE,
            expected: STAR_FILE_MAGIC,
            found: magic.to_vec(),
        });
    }

    let version = reader
        .read_u16::<LittleEndian>()
        .map_err(|e| Error::from_read(e, FILE_TYPE, "the header"))?;
    if version != STAR_FILE_VERSION {
        return Err(Error::UnsupportedVersion {
            file_type: FILE_TYPE,
            expected: STAR_FILE_VERSION,
            found: version,
        });
    }

    let count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::from_read(e, FILE_TYPE, "the header"))?;

    // Cap the preallocation; the count comes from untrusted input.
    let mut records = Vec::with_capacity((count as usize).min(1 << 20));
    for i in 0..count {
        let record = BinaryStarRecord::read_from(&mut reader)
            .map_err(|e| Error::from_read(e, FILE_TYPE, &format!("record #{} of {}", i, count)))?;
        records.push(record);
    }
    Ok(records)
}

/// Encodes records as a binary star file.
pub fn write_star_file<W: Write>(mut writer: W, records: &[BinaryStarRecord]) -> Result<()> {
    let count = u32::try_from(records.len())
        .map_err(|_| Error::malformed("count", format!("{} records", records.len())))?;
    writer.write_all(STAR_FILE_MAGIC)?;
    writer.write_u16::<LittleEndian>(STAR_FILE_VERSION)?;
    writer.write_u32::<LittleEndian>(count)?;
    for record in records {
        record.write_to(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

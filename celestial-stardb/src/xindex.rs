//! Cross indexes between external star catalogs and our catalog numbers.
//!
//! # Binary Format
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 8 | magic `CELINDEX` |
//! | 8 | 2 | version, little-endian `0x0100` |
//! | 10 | 8·n | `(external: u32 LE, internal: u32 LE)` pairs until end of stream |
//!
//! There is no record count; a stream whose payload is not a multiple of
//! eight bytes is rejected. The ASCII form accepted by [`convert_ascii`] is
//! whitespace-separated decimal pairs in the same order.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::star::CatalogNumber;

pub const XINDEX_MAGIC: &[u8; 8] = b"CELINDEX";
pub const XINDEX_VERSION: u16 = 0x0100;
const HEADER_SIZE: usize = 10;
const ENTRY_SIZE: usize = 8;
const FILE_TYPE: &str = "cross index";

/// External catalogs with a cross index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrossIndexCatalog {
    HenryDraper,
    Gliese,
    Sao,
}

impl CrossIndexCatalog {
    pub const ALL: [CrossIndexCatalog; 3] = [
        CrossIndexCatalog::HenryDraper,
        CrossIndexCatalog::Gliese,
        CrossIndexCatalog::Sao,
    ];

    /// Designation prefix, e.g. `HD` in `HD 48915`.
    pub fn prefix(self) -> &'static str {
        match self {
            CrossIndexCatalog::HenryDraper => "HD",
            CrossIndexCatalog::Gliese => "Gliese",
            CrossIndexCatalog::Sao => "SAO",
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }

    /// Splits a designation such as `"SAO 151881"` into catalog and number.
    ///
    /// Prefixes match case-insensitively; the separating whitespace is optional.
    pub fn parse_designation(name: &str) -> Option<(CrossIndexCatalog, u32)> {
        let name = name.trim();
        Self::ALL.into_iter().find_map(|catalog| {
            let prefix = catalog.prefix();
            let head = name.get(..prefix.len())?;
            if !head.eq_ignore_ascii_case(prefix) {
                return None;
            }
            let number = name[prefix.len()..].trim_start().parse().ok()?;
            Some((catalog, number))
        })
    }
}

impl fmt::Display for CrossIndexCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for CrossIndexCatalog {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hd" | "henrydraper" => Ok(CrossIndexCatalog::HenryDraper),
            "gliese" | "gl" => Ok(CrossIndexCatalog::Gliese),
            "sao" => Ok(CrossIndexCatalog::Sao),
            other => Err(format!("unknown cross index catalog: {}", other)),
        }
    }
}

/// One `(external, internal)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossIndexEntry {
    /// Number in the external catalog.
    pub catalog_number: u32,
    /// Our catalog number.
    pub cel_catalog_number: CatalogNumber,
}

/// Sorted lookup table for one external catalog.
#[derive(Debug, Clone, Default)]
pub struct CrossIndex {
    entries: Vec<CrossIndexEntry>,
}

impl CrossIndex {
    /// Builds a table from entries in any order.
    pub fn from_entries(mut entries: Vec<CrossIndexEntry>) -> Self {
        entries.sort_by_key(|e| e.catalog_number);
        Self { entries }
    }

    /// Reads and sorts a binary cross index.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        read_entries(reader).map(Self::from_entries)
    }

    /// Our catalog number for external number `catalog_number`.
    ///
    /// With duplicate external numbers, the first entry in file order wins.
    pub fn lookup(&self, catalog_number: u32) -> Option<CatalogNumber> {
        let idx = self
            .entries
            .partition_point(|e| e.catalog_number < catalog_number);
        self.entries
            .get(idx)
            .filter(|e| e.catalog_number == catalog_number)
            .map(|e| e.cel_catalog_number)
    }

    /// External number for one of our catalog numbers. Linear scan.
    pub fn reverse_lookup(&self, cel_catalog_number: CatalogNumber) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.cel_catalog_number == cel_catalog_number)
            .map(|e| e.catalog_number)
    }

    pub fn entries(&self) -> &[CrossIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the table in the binary format.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        write_entries(writer, &self.entries)
    }
}

/// Reads a binary cross index, keeping file order.
pub fn read_entries<R: Read>(mut reader: R) -> Result<Vec<CrossIndexEntry>> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|e| Error::from_read(e, FILE_TYPE, "the header"))?;

    if &header[0..8] != XINDEX_MAGIC {
        return Err(Error::BadMagic {
            file_type: FILE_TYPE,
            expected: XINDEX_MAGIC,
            found: header[0..8].to_vec(),
        });
    }

    let version = LittleEndian::read_u16(&header[8..10]);
    if version != XINDEX_VERSION {
        return Err(Error::UnsupportedVersion {
            file_type: FILE_TYPE,
            expected: XINDEX_VERSION,
            found: version,
        });
    }

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    if payload.len() % ENTRY_SIZE != 0 {
        return Err(Error::Truncated {
            file_type: FILE_TYPE,
            message: format!(
                "{} trailing bytes after record #{}",
                payload.len() % ENTRY_SIZE,
                payload.len() / ENTRY_SIZE
            ),
        });
    }

    Ok(payload
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| CrossIndexEntry {
            catalog_number: LittleEndian::read_u32(&chunk[0..4]),
            cel_catalog_number: LittleEndian::read_u32(&chunk[4..8]),
        })
        .collect())
}

/// Writes entries in the binary format, in the order given.
pub fn write_entries<W: Write>(mut writer: W, entries: &[CrossIndexEntry]) -> Result<()> {
    writer.write_all(XINDEX_MAGIC)?;
    writer.write_u16::<LittleEndian>(XINDEX_VERSION)?;
    for entry in entries {
        writer.write_u32::<LittleEndian>(entry.catalog_number)?;
        writer.write_u32::<LittleEndian>(entry.cel_catalog_number)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses whitespace-separated `external internal` pairs.
///
/// End of input between pairs is success. A pair missing its second field,
/// or any token that is not a decimal `u32`, fails with the index of the
/// offending record.
pub fn parse_ascii(text: &str) -> Result<Vec<CrossIndexEntry>> {
    let mut tokens = text.split_whitespace();
    let mut entries = Vec::new();

    while let Some(first) = tokens.next() {
        let record = entries.len();
        let catalog_number = parse_field(first, record)?;
        let cel_catalog_number = match tokens.next() {
            Some(second) => parse_field(second, record)?,
            None => {
                return Err(Error::RecordParse {
                    record,
                    message: "missing second field".to_string(),
                })
            }
        };
        entries.push(CrossIndexEntry {
            catalog_number,
            cel_catalog_number,
        });
    }

    Ok(entries)
}

fn parse_field(token: &str, record: usize) -> Result<u32> {
    token.parse().map_err(|e| Error::RecordParse {
        record,
        message: format!("'{}': {}", token, e),
    })
}

/// Converts an ASCII cross index to the binary format. Returns the number of
/// records written.
///
/// Nothing is written when the input fails to parse.
pub fn convert_ascii<R: Read, W: Write>(mut input: R, output: W) -> Result<usize> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    let entries = parse_ascii(&text)?;
    write_entries(output, &entries)?;
    Ok(entries.len())
}

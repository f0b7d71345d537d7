//! Section framing: the 76-byte descriptor that precedes every section in
//! a segment file, Adler-32 computation/verification, and the `table`
//! entry codec.
//!
//! Grounded on the teacher's `EwfSectionDescriptor`/`parse_table` in
//! `ewf.rs`, with the checksum now actually verified (the teacher reads
//! the field but discards it) and `table2` redundancy added, per
//! spec.md §4.4 / §6.

use crate::error::{EwfError, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// Size of the section descriptor header, including its trailing Adler-32.
pub const SECTION_DESCRIPTOR_SIZE: u64 = 76;
const KIND_LEN: usize = 16;

/// Adler-32 (RFC 1950), used throughout EWF for section- and table-level
/// integrity. Small enough, and universal enough, to not warrant pulling
/// in a dependency for it.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    Header2,
    XHeader,
    Volume,
    Disk,
    Sectors,
    Table,
    Table2,
    Sector,
    Data,
    Digest,
    Hash,
    Error2,
    Session,
    LType,
    LTree,
    Done,
    Next,
    Other(String),
}

impl SectionKind {
    pub fn parse(raw: &str) -> SectionKind {
        match raw {
            "header" => SectionKind::Header,
            "header2" => SectionKind::Header2,
            "xheader" => SectionKind::XHeader,
            "volume" => SectionKind::Volume,
            "disk" => SectionKind::Disk,
            "sectors" => SectionKind::Sectors,
            "table" => SectionKind::Table,
            "table2" => SectionKind::Table2,
            "sector" => SectionKind::Sector,
            "data" => SectionKind::Data,
            "digest" => SectionKind::Digest,
            "hash" => SectionKind::Hash,
            "error2" => SectionKind::Error2,
            "session" => SectionKind::Session,
            "ltype" => SectionKind::LType,
            "ltree" => SectionKind::LTree,
            "done" => SectionKind::Done,
            "next" => SectionKind::Next,
            other => SectionKind::Other(other.to_string()),
        }
    }

    pub fn as_wire_str(&self) -> &str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Header2 => "header2",
            SectionKind::XHeader => "xheader",
            SectionKind::Volume => "volume",
            SectionKind::Disk => "disk",
            SectionKind::Sectors => "sectors",
            SectionKind::Table => "table",
            SectionKind::Table2 => "table2",
            SectionKind::Sector => "sector",
            SectionKind::Data => "data",
            SectionKind::Digest => "digest",
            SectionKind::Hash => "hash",
            SectionKind::Error2 => "error2",
            SectionKind::Session => "session",
            SectionKind::LType => "ltype",
            SectionKind::LTree => "ltree",
            SectionKind::Done => "done",
            SectionKind::Next => "next",
            SectionKind::Other(s) => s.as_str(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, SectionKind::Done | SectionKind::Next)
    }
}

/// The 76-byte descriptor that precedes every section's payload.
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub kind: SectionKind,
    /// Absolute offset, from the start of the segment, of the *next*
    /// section descriptor (self-referential for the terminator).
    pub next_section_offset: u64,
    /// Total size of this section including the 76-byte header.
    pub section_size: u64,
    pub checksum: u32,
}

impl SectionDescriptor {
    /// Read and verify the descriptor at `offset` within `file`. A CRC
    /// mismatch is a format error the caller propagates (segment-fatal
    /// per spec.md §4.4/§7), never silently ignored.
    pub fn read_at<F: Read + Seek>(file: &mut F, offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
        file.read_exact(&mut header)?;

        let kind_bytes = &header[0..KIND_LEN];
        let kind_str = kind_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>();
        let next_section_offset = u64::from_le_bytes(header[16..24].try_into().unwrap());
        let section_size = u64::from_le_bytes(header[24..32].try_into().unwrap());
        let checksum = u32::from_le_bytes(header[72..76].try_into().unwrap());

        let computed = adler32(&header[0..72]);
        if computed != checksum {
            return Err(EwfError::SectionCrcMismatch {
                kind: kind_str,
                offset,
            });
        }

        Ok(SectionDescriptor {
            kind: SectionKind::parse(&kind_str),
            next_section_offset,
            section_size,
            checksum,
        })
    }

    /// Serialize and write a descriptor at the file's current position.
    pub fn write<F: Write>(
        file: &mut F,
        kind: &SectionKind,
        next_section_offset: u64,
        section_size: u64,
    ) -> Result<()> {
        let mut header = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
        let kind_bytes = kind.as_wire_str().as_bytes();
        header[0..kind_bytes.len().min(KIND_LEN)]
            .copy_from_slice(&kind_bytes[..kind_bytes.len().min(KIND_LEN)]);
        header[16..24].copy_from_slice(&next_section_offset.to_le_bytes());
        header[24..32].copy_from_slice(&section_size.to_le_bytes());
        let checksum = adler32(&header[0..72]);
        header[72..76].copy_from_slice(&checksum.to_le_bytes());
        file.write_all(&header)?;
        Ok(())
    }
}

/// One decoded `table` entry: whether the chunk is DEFLATE-compressed and
/// its raw (segment-relative, pre-`base_offset`) offset.
#[derive(Debug, Clone, Copy)]
pub struct TableEntry {
    pub compressed: bool,
    pub raw_offset: u32,
}

const COMPRESSED_BIT: u32 = 0x8000_0000;

impl TableEntry {
    pub fn decode(word: u32) -> Self {
        TableEntry {
            compressed: word & COMPRESSED_BIT != 0,
            raw_offset: word & !COMPRESSED_BIT,
        }
    }

    pub fn encode(&self) -> u32 {
        let bit = if self.compressed { COMPRESSED_BIT } else { 0 };
        bit | (self.raw_offset & !COMPRESSED_BIT)
    }
}

/// Policy for deriving the on-disk size of the last table entry, per
/// spec.md §4.4's "implementers must pick policy (b) by format version"
/// open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastEntrySizePolicy {
    /// The table's own trailer records the last chunk's size explicitly
    /// (ENCASE6 / EWF2 convention).
    TrailerField,
    /// Derive it from where the enclosing `sectors` section ends (older
    /// EnCase format convention, and the teacher's approach).
    SectorsSectionEnd,
}

/// Parsed `table`/`table2` body: header fields plus the decoded entries.
#[derive(Debug, Clone)]
pub struct Table {
    pub base_offset: u64,
    pub entries: Vec<TableEntry>,
    /// Explicit size of the last entry, when `LastEntrySizePolicy::TrailerField`
    /// applies and the trailer actually carried one.
    pub last_entry_size: Option<u64>,
}

impl Table {
    /// Parse a `table`/`table2` section body starting at `offset` (the
    /// first byte *after* the 76-byte section descriptor). `segment` is
    /// the enclosing segment's number, carried only so a CRC failure can
    /// report which segment it came from.
    pub fn read_at<F: Read + Seek>(
        file: &mut F,
        offset: u64,
        section_size: u64,
        segment: u16,
    ) -> Result<Table> {
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 24];
        file.read_exact(&mut header)?;
        let number_of_entries = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let base_offset = u64::from_le_bytes(header[8..16].try_into().unwrap());
        let header_checksum = u32::from_le_bytes(header[20..24].try_into().unwrap());

        if adler32(&header[0..20]) != header_checksum {
            return Err(EwfError::TableCrcMismatch { segment });
        }

        let entry_bytes_len = number_of_entries as usize * 4;
        let mut entry_bytes = vec![0u8; entry_bytes_len];
        file.read_exact(&mut entry_bytes)?;

        let mut trailer = [0u8; 4];
        file.read_exact(&mut trailer)?;
        let trailer_checksum = u32::from_le_bytes(trailer);
        if adler32(&entry_bytes) != trailer_checksum {
            return Err(EwfError::TableCrcMismatch { segment });
        }

        let entries = entry_bytes
            .chunks_exact(4)
            .map(|c| TableEntry::decode(u32::from_le_bytes(c.try_into().unwrap())))
            .collect();

        // Remaining bytes (if any) before `section_size` may hold a
        // last-entry-size trailer field on formats that use it; this core
        // does not rely on it being present.
        let consumed = 24 + entry_bytes_len as u64 + 4;
        let last_entry_size = if section_size > consumed + 8 {
            let mut buf = [0u8; 8];
            if file.read_exact(&mut buf).is_ok() {
                Some(u64::from_le_bytes(buf))
            } else {
                None
            }
        } else {
            None
        };

        Ok(Table {
            base_offset,
            entries,
            last_entry_size,
        })
    }

    /// Serialize a `table` section body (header + entries + trailer CRC).
    pub fn write<F: Write>(&self, file: &mut F) -> Result<()> {
        let mut header = [0u8; 24];
        header[0..4].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        header[8..16].copy_from_slice(&self.base_offset.to_le_bytes());
        let checksum = adler32(&header[0..20]);
        header[20..24].copy_from_slice(&checksum.to_le_bytes());
        file.write_all(&header)?;

        let mut entry_bytes = Vec::with_capacity(self.entries.len() * 4);
        for entry in &self.entries {
            entry_bytes.extend_from_slice(&entry.encode().to_le_bytes());
        }
        file.write_all(&entry_bytes)?;
        let trailer_checksum = adler32(&entry_bytes);
        file.write_all(&trailer_checksum.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn adler32_known_vector() {
        // "Wikipedia" -> 0x11E60398, a commonly cited Adler-32 test vector.
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn section_descriptor_roundtrip() {
        let mut buf = Vec::new();
        SectionDescriptor::write(&mut buf, &SectionKind::Volume, 1024, 128).unwrap();
        let mut cursor = Cursor::new(buf);
        let parsed = SectionDescriptor::read_at(&mut cursor, 0).unwrap();
        assert_eq!(parsed.kind, SectionKind::Volume);
        assert_eq!(parsed.next_section_offset, 1024);
        assert_eq!(parsed.section_size, 128);
    }

    #[test]
    fn corrupted_header_byte_is_detected() {
        let mut buf = Vec::new();
        SectionDescriptor::write(&mut buf, &SectionKind::Table, 999, 55).unwrap();
        buf[3] ^= 0xFF; // corrupt a byte inside the kind field
        let mut cursor = Cursor::new(buf);
        assert!(SectionDescriptor::read_at(&mut cursor, 0).is_err());
    }

    #[test]
    fn table_roundtrip() {
        let table = Table {
            base_offset: 1000,
            entries: vec![
                TableEntry { compressed: false, raw_offset: 0 },
                TableEntry { compressed: true, raw_offset: 32768 },
            ],
            last_entry_size: None,
        };
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.clone());
        let parsed = Table::read_at(&mut cursor, 0, buf.len() as u64, 1).unwrap();
        assert_eq!(parsed.base_offset, 1000);
        assert_eq!(parsed.entries.len(), 2);
        assert!(!parsed.entries[0].compressed);
        assert!(parsed.entries[1].compressed);
        assert_eq!(parsed.entries[1].raw_offset, 32768);
    }

    #[test]
    fn table_crc_mismatch_detected() {
        let table = Table {
            base_offset: 0,
            entries: vec![TableEntry { compressed: false, raw_offset: 4 }],
            last_entry_size: None,
        };
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let mut cursor = Cursor::new(buf.clone());
        assert!(Table::read_at(&mut cursor, 0, buf.len() as u64, 1).is_err());
    }

    #[test]
    fn table_crc_mismatch_reports_the_actual_segment_number() {
        let table = Table {
            base_offset: 0,
            entries: vec![TableEntry { compressed: false, raw_offset: 4 }],
            last_entry_size: None,
        };
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let mut cursor = Cursor::new(buf);
        let err = Table::read_at(&mut cursor, 0, cursor.get_ref().len() as u64, 7).unwrap_err();
        assert!(matches!(err, EwfError::TableCrcMismatch { segment: 7 }));
    }
}

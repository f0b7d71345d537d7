//! Segment file reader/writer: the per-segment header, section chain walk
//! and dispatch, and the writer mirror.
//!
//! Grounded on the teacher's `EwfHeader::new`/`EwfSectionDescriptor::new`/
//! `parse_segment`/`EwfHeaderSection::{decode,parse_metadata}` in `ewf.rs`,
//! which already gets the shape right; this module keeps that shape and
//! adds what spec.md §4.4 requires beyond it: actual checksum
//! verification (via [`crate::section`]), `table2` fallback, the
//! remaining section kinds, and the write half.

use crate::error::{EwfError, Result};
use crate::section::{adler32, SectionDescriptor, SectionKind, Table, SECTION_DESCRIPTOR_SIZE};
use flate2::read::ZlibDecoder;
use glob::glob;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const EWF_E01_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];
pub const EWF_L01_SIGNATURE: [u8; 8] = [0x4d, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];
pub const EWF2_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x32, 0x0d, 0x0a, 0x81, 0x00];

const HEADER_SIZE: u64 = 13;
const HEADER2_SIZE_V2: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EwfFlavor {
    Ewf,
    Ewf2,
    Lvf,
}

#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub flavor: EwfFlavor,
    pub segment_number: u16,
}

impl SegmentHeader {
    pub fn read<F: Read + Seek>(file: &mut F) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        let mut signature = [0u8; 8];
        file.read_exact(&mut signature)?;

        let flavor = if signature == EWF_E01_SIGNATURE {
            EwfFlavor::Ewf
        } else if signature == EWF_L01_SIGNATURE {
            EwfFlavor::Lvf
        } else if signature == EWF2_SIGNATURE {
            EwfFlavor::Ewf2
        } else {
            return Err(EwfError::SignatureMismatch);
        };

        let mut fields_start = [0u8; 1];
        file.read_exact(&mut fields_start)?;
        if fields_start[0] != 1 {
            return Err(EwfError::SignatureMismatch);
        }

        let mut segment_number_bytes = [0u8; 2];
        file.read_exact(&mut segment_number_bytes)?;
        let segment_number = u16::from_le_bytes(segment_number_bytes);

        let mut fields_end = [0u8; 2];
        file.read_exact(&mut fields_end)?;
        if fields_end != [0u8; 2] {
            return Err(EwfError::SignatureMismatch);
        }

        if flavor == EwfFlavor::Ewf2 {
            // EWF2 carries one extra byte: sector size.
            let mut sector_size = [0u8; 1];
            file.read_exact(&mut sector_size)?;
        }

        Ok(SegmentHeader {
            flavor,
            segment_number,
        })
    }

    pub fn write<F: Write>(file: &mut F, flavor: EwfFlavor, segment_number: u16) -> Result<()> {
        let signature = match flavor {
            EwfFlavor::Ewf => EWF_E01_SIGNATURE,
            EwfFlavor::Lvf => EWF_L01_SIGNATURE,
            EwfFlavor::Ewf2 => EWF2_SIGNATURE,
        };
        file.write_all(&signature)?;
        file.write_all(&[1u8])?;
        file.write_all(&segment_number.to_le_bytes())?;
        file.write_all(&[0u8; 2])?;
        if flavor == EwfFlavor::Ewf2 {
            file.write_all(&[0u8])?; // sector size placeholder
        }
        Ok(())
    }

    pub fn header_size(&self) -> u64 {
        match self.flavor {
            EwfFlavor::Ewf2 => HEADER2_SIZE_V2,
            _ => HEADER_SIZE,
        }
    }
}

/// Media geometry, parsed from the `volume`/`disk` section.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDescriptor {
    pub media_type: u8,
    pub number_of_chunks: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub number_of_sectors: u64,
    pub error_granularity: u32,
    pub set_identifier: [u8; 16],
}

impl VolumeDescriptor {
    pub fn chunk_size(&self) -> u64 {
        self.sectors_per_chunk as u64 * self.bytes_per_sector as u64
    }

    pub fn media_size(&self) -> u64 {
        self.number_of_sectors * self.bytes_per_sector as u64
    }

    fn read_short<F: Read + Seek>(file: &mut F, offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; 94];
        file.read_exact(&mut buf)?;
        Ok(VolumeDescriptor {
            media_type: buf[0],
            number_of_chunks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            sectors_per_chunk: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            bytes_per_sector: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            number_of_sectors: u32::from_le_bytes(buf[16..20].try_into().unwrap()) as u64,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        })
    }

    /// Parse the 1052-byte `volume`/`disk` body at `offset` (short-form
    /// (94-byte) bodies are detected via `section_size` and handled by the
    /// caller falling back to [`Self::read_short`]).
    pub fn read_at<F: Read + Seek>(file: &mut F, offset: u64, section_size: u64) -> Result<Self> {
        if section_size < 1052 + SECTION_DESCRIPTOR_SIZE {
            return Self::read_short(file, offset);
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; 1052];
        file.read_exact(&mut buf)?;
        let mut trailer = [0u8; 4];
        if file.read_exact(&mut trailer).is_ok() {
            let expected = u32::from_le_bytes(trailer);
            if adler32(&buf) != expected {
                return Err(EwfError::SectionCrcMismatch {
                    kind: "volume".into(),
                    offset,
                });
            }
        }
        Ok(VolumeDescriptor {
            media_type: buf[0],
            number_of_chunks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            sectors_per_chunk: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            bytes_per_sector: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            number_of_sectors: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            error_granularity: u32::from_le_bytes(buf[198..202].try_into().unwrap()),
            set_identifier: buf[208..224].try_into().unwrap(),
        })
    }

    pub fn write_at<F: Write>(&self, file: &mut F) -> Result<()> {
        let mut buf = [0u8; 1052];
        buf[0] = self.media_type;
        buf[4..8].copy_from_slice(&self.number_of_chunks.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sectors_per_chunk.to_le_bytes());
        buf[12..16].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        buf[16..24].copy_from_slice(&self.number_of_sectors.to_le_bytes());
        buf[198..202].copy_from_slice(&self.error_granularity.to_le_bytes());
        buf[208..224].copy_from_slice(&self.set_identifier);
        file.write_all(&buf)?;
        let crc = adler32(&buf);
        file.write_all(&crc.to_le_bytes())?;
        Ok(())
    }
}

/// `(start_sector, sector_count)` entries from an `error2` section.
pub type ErrorEntries = Vec<(u32, u32)>;
/// `(flags, start_sector)` entries from a `session` section.
pub type SessionEntries = Vec<(u32, u32)>;

/// Everything extracted from one fully-parsed segment file.
#[derive(Default)]
pub struct SegmentData {
    pub segment_number: u16,
    pub volume: Option<VolumeDescriptor>,
    /// One entry per `table` section found, in file order:
    /// `(base_offset, entries, sectors_end)`.
    pub tables: Vec<(u64, Vec<(u32, bool)>, u64)>,
    pub header_metadata: HashMap<String, String>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
    pub errors: ErrorEntries,
    pub sessions: SessionEntries,
    pub ltree_blob: Option<Vec<u8>>,
    /// Raw `xheader` body, passed through unparsed per spec.md §1/§3 — the
    /// textual header grammar itself is out of core scope, but the blob is
    /// not dropped.
    pub xheader_blob: Option<Vec<u8>>,
    pub table_fallbacks: u32,
    /// `(segment-relative start, end)` byte ranges where both `table` and
    /// `table2` failed their checksum: the chunks they would have indexed
    /// are unresolvable and reads into that span must fail, but the rest
    /// of the segment is still usable (spec.md §4.4/§7: "the affected chunk
    /// range is unreadable and is recorded in the corruption range list",
    /// degrades gracefully rather than aborting the whole image).
    pub corrupt_ranges: Vec<(u64, u64)>,
}

/// Decode raw header bytes: UTF-8 first, then UTF-16LE, the way the
/// teacher's `EwfHeaderSection::decode` does (acquisition tools emit
/// either depending on `header`/`header2`).
fn decode_header_text(raw: &[u8]) -> String {
    if let Ok(txt) = String::from_utf8(raw.to_vec()) {
        return txt;
    }
    if raw.len() % 2 == 0 {
        let utf16: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        if let Ok(txt) = String::from_utf16(&utf16) {
            return txt;
        }
    }
    String::new()
}

fn table_to_map(keys: &str, vals: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (k, v) in keys.split('\t').zip(vals.split('\t')) {
        map.insert(
            k.trim_matches('\0').to_string(),
            v.trim_matches('\0').to_string(),
        );
    }
    map
}

fn parse_header_metadata(raw: &[u8]) -> HashMap<String, String> {
    let txt = decode_header_text(raw);
    let mut lines: Vec<&str> = txt
        .split(['\n', '\r'])
        .filter(|l| !l.trim().is_empty())
        .collect();
    if let Some(first) = lines.first_mut() {
        *first = first.trim_start_matches('\u{FEFF}');
    }
    for i in 0..lines.len().saturating_sub(1) {
        if lines[i].contains('\t') && lines[i + 1].contains('\t') {
            return table_to_map(lines[i], lines[i + 1]);
        }
    }
    let mut map = HashMap::new();
    for l in lines {
        if let Some((k, v)) = l.split_once('\t') {
            map.insert(
                k.trim_matches('\0').to_string(),
                v.trim_matches('\0').to_string(),
            );
        }
    }
    map
}

fn inflate_section<F: Read + Seek>(file: &mut F, offset: u64, size: usize) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut compressed = vec![0u8; size];
    file.read_exact(&mut compressed)?;
    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EwfError::DecompressionFailed(e.to_string()))?;
    Ok(out)
}

fn read_error_or_session_entries<F: Read + Seek>(
    file: &mut F,
    offset: u64,
) -> Result<Vec<(u32, u32)>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut count_buf = [0u8; 4];
    file.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf);
    file.seek(SeekFrom::Start(offset + 8))?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut pair = [0u8; 8];
        file.read_exact(&mut pair)?;
        entries.push((
            u32::from_le_bytes(pair[0..4].try_into().unwrap()),
            u32::from_le_bytes(pair[4..8].try_into().unwrap()),
        ));
    }
    Ok(entries)
}

/// Parse the full section chain of one already-opened segment file.
pub fn parse_segment<F: Read + Seek>(file: &mut F) -> Result<SegmentData> {
    let header = SegmentHeader::read(file)?;
    let mut data = SegmentData {
        segment_number: header.segment_number,
        ..Default::default()
    };

    let mut current_offset = header.header_size();
    let mut sectors_start: u64 = 0;
    let mut end_of_sectors: u64 = 0;
    // table2 bodies, matched positionally with the preceding `table`.
    let mut pending_table2: Option<(u64, Vec<(u32, bool)>)> = None;

    loop {
        let section = SectionDescriptor::read_at(file, current_offset)?;
        let next_offset = section.next_section_offset;

        match &section.kind {
            SectionKind::Header | SectionKind::Header2 => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                let body_size = (section.section_size - SECTION_DESCRIPTOR_SIZE) as usize;
                let raw = inflate_section(file, body_offset, body_size)?;
                let metadata = parse_header_metadata(&raw);
                // header2 (UTF-16) wins over header (ASCII) on conflicting keys.
                data.header_metadata.extend(metadata);
            }
            SectionKind::Volume | SectionKind::Disk => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                let volume =
                    VolumeDescriptor::read_at(file, body_offset, section.section_size)?;
                if let Some(existing) = &data.volume {
                    if existing != &volume {
                        return Err(EwfError::ConflictingMediaDescriptor(format!(
                            "segment {} disagrees with a previously parsed volume section",
                            header.segment_number
                        )));
                    }
                } else {
                    data.volume = Some(volume);
                }
            }
            SectionKind::Sectors => {
                sectors_start = current_offset;
                end_of_sectors = current_offset + section.section_size;
            }
            SectionKind::Table => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                match Table::read_at(
                    file,
                    body_offset,
                    section.section_size,
                    header.segment_number,
                ) {
                    Ok(table) => {
                        let decoded: Vec<(u32, bool)> = table
                            .entries
                            .iter()
                            .map(|e| (e.raw_offset, e.compressed))
                            .collect();
                        pending_table2 = Some((table.base_offset, decoded));
                    }
                    Err(primary_err) => {
                        warn!(
                            "segment {}: table CRC mismatch, will try table2: {primary_err}",
                            header.segment_number
                        );
                        pending_table2 = None;
                        data.table_fallbacks += 1;
                        // The sections chain still advances; table2 right
                        // after this one is the real source of truth.
                        data.tables.push((0, Vec::new(), 0));
                    }
                }
            }
            SectionKind::Table2 => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                match pending_table2.take() {
                    Some((base_offset, entries)) => {
                        // Primary table parsed fine; table2 is redundant,
                        // but we still verify it parses (best-effort).
                        let _ = Table::read_at(
                            file,
                            body_offset,
                            section.section_size,
                            header.segment_number,
                        );
                        data.tables.push((base_offset, entries, 0));
                    }
                    None => {
                        // Primary table failed CRC: fall back to table2.
                        match Table::read_at(
                            file,
                            body_offset,
                            section.section_size,
                            header.segment_number,
                        ) {
                            Ok(table) => {
                                let decoded: Vec<(u32, bool)> = table
                                    .entries
                                    .iter()
                                    .map(|e| (e.raw_offset, e.compressed))
                                    .collect();
                                data.tables.pop(); // drop the placeholder pushed above
                                data.tables.push((table.base_offset, decoded, 0));
                            }
                            Err(fallback_err) => {
                                // Both copies failed: the chunks this table
                                // would have indexed are unresolvable. Record
                                // the enclosing sectors span as unreadable
                                // and keep parsing the rest of the segment
                                // rather than aborting the whole image
                                // (spec.md §4.4/§7).
                                warn!(
                                    "segment {}: table2 also failed CRC, chunk range is unreadable: {fallback_err}",
                                    header.segment_number
                                );
                                data.tables.pop(); // drop the placeholder pushed above
                                data.corrupt_ranges.push((sectors_start, end_of_sectors));
                            }
                        }
                    }
                }
            }
            SectionKind::Error2 => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                data.errors
                    .extend(read_error_or_session_entries(file, body_offset)?);
            }
            SectionKind::Session => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                data.sessions
                    .extend(read_error_or_session_entries(file, body_offset)?);
            }
            SectionKind::Digest | SectionKind::Hash => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                file.seek(SeekFrom::Start(body_offset))?;
                let mut md5 = [0u8; 16];
                if file.read_exact(&mut md5).is_ok() {
                    data.md5 = Some(md5);
                }
                let mut sha1 = [0u8; 20];
                if file.read_exact(&mut sha1).is_ok() {
                    data.sha1 = Some(sha1);
                }
            }
            SectionKind::LType | SectionKind::LTree => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                let body_size = (section.section_size - SECTION_DESCRIPTOR_SIZE) as usize;
                let mut raw = vec![0u8; body_size];
                file.seek(SeekFrom::Start(body_offset))?;
                file.read_exact(&mut raw)?;
                data.ltree_blob = Some(raw);
            }
            SectionKind::XHeader => {
                let body_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
                let body_size = (section.section_size - SECTION_DESCRIPTOR_SIZE) as usize;
                let mut raw = vec![0u8; body_size];
                file.seek(SeekFrom::Start(body_offset))?;
                file.read_exact(&mut raw)?;
                data.xheader_blob = Some(raw);
            }
            SectionKind::Done | SectionKind::Next => {
                break;
            }
            _ => {
                debug!("segment {}: ignoring section kind {:?}", header.segment_number, section.kind);
            }
        }

        if current_offset == next_offset {
            break;
        }
        current_offset = next_offset;
    }

    // Any table section whose table2 never arrived (truncated segment)
    // leaves a placeholder; finalize sectors_end on all real tables.
    for t in data.tables.iter_mut() {
        t.2 = end_of_sectors;
    }
    if data.tables.iter().any(|(_, entries, _)| entries.is_empty()) {
        return Err(EwfError::TruncatedSegment {
            segment: header.segment_number,
        });
    }

    Ok(data)
}

/// Find every segment belonging to the same multi-part image as `path`,
/// sorted by the segment number recorded in each file's own header (not
/// by filename, per spec.md §6).
pub fn find_segment_files(path: &Path) -> Result<Vec<PathBuf>> {
    let path = path
        .canonicalize()
        .map_err(|_| EwfError::InvalidArgument("invalid evidence path".into()))?;
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| EwfError::InvalidArgument("invalid file name".into()))?;
    if filename.len() < 2 {
        return Err(EwfError::InvalidArgument("file name too short".into()));
    }
    let base = &filename[..filename.len() - 2];
    let parent = path
        .parent()
        .ok_or_else(|| EwfError::InvalidArgument("no parent directory".into()))?;

    let mut pattern_path = PathBuf::from(parent);
    pattern_path.push(format!("{base}??"));
    let pattern = pattern_path
        .to_str()
        .ok_or_else(|| EwfError::InvalidArgument("invalid glob pattern".into()))?
        .to_string();

    let mut candidates: Vec<PathBuf> = glob(&pattern)
        .map_err(|e| EwfError::InvalidArgument(format!("glob error: {e}")))?
        .filter_map(std::result::Result::ok)
        .collect();
    if candidates.is_empty() {
        candidates.push(path);
    }

    let mut numbered = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut file = File::open(&candidate)?;
        let header = SegmentHeader::read(&mut file)?;
        numbered.push((header.segment_number, candidate));
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut expected = 1u16;
    for (n, _) in &numbered {
        if *n != expected {
            return Err(EwfError::TruncatedSegment { segment: expected });
        }
        expected += 1;
    }

    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_minimal_segment(
        segment_number: u16,
        volume: &VolumeDescriptor,
        table: &Table,
        terminator: SectionKind,
    ) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        SegmentHeader::write(&mut buf, EwfFlavor::Ewf, segment_number).unwrap();

        // volume section
        let volume_section_start = buf.len() as u64;
        let volume_body_len = 1052 + 4; // payload + trailing adler32
        let after_volume = volume_section_start + SECTION_DESCRIPTOR_SIZE + volume_body_len;
        SectionDescriptor::write(
            &mut buf,
            &SectionKind::Volume,
            after_volume,
            SECTION_DESCRIPTOR_SIZE + volume_body_len,
        )
        .unwrap();
        volume.write_at(&mut buf).unwrap();

        // sectors section (empty payload is fine for this test)
        let sectors_start = buf.len() as u64;
        let sectors_size = SECTION_DESCRIPTOR_SIZE;
        let after_sectors = sectors_start + sectors_size;
        SectionDescriptor::write(&mut buf, &SectionKind::Sectors, after_sectors, sectors_size)
            .unwrap();

        // table section
        let table_start = buf.len() as u64;
        let mut table_body = Vec::new();
        table.write(&mut table_body).unwrap();
        let table_size = SECTION_DESCRIPTOR_SIZE + table_body.len() as u64;
        let after_table = table_start + table_size;
        SectionDescriptor::write(&mut buf, &SectionKind::Table, after_table, table_size).unwrap();
        buf.extend_from_slice(&table_body);

        // table2 (identical copy)
        let table2_start = buf.len() as u64;
        let after_table2 = table2_start + table_size;
        SectionDescriptor::write(&mut buf, &SectionKind::Table2, after_table2, table_size)
            .unwrap();
        buf.extend_from_slice(&table_body);

        // terminator
        let term_start = buf.len() as u64;
        SectionDescriptor::write(&mut buf, &terminator, term_start, SECTION_DESCRIPTOR_SIZE)
            .unwrap();

        buf
    }

    #[test]
    fn parses_minimal_single_segment() {
        let volume = VolumeDescriptor {
            media_type: 0,
            number_of_chunks: 1,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            number_of_sectors: 1,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        };
        let table = Table {
            base_offset: 0,
            entries: vec![crate::section::TableEntry {
                compressed: false,
                raw_offset: 0,
            }],
            last_entry_size: None,
        };
        let bytes = write_minimal_segment(1, &volume, &table, SectionKind::Done);
        let mut cursor = Cursor::new(bytes);
        let data = parse_segment(&mut cursor).unwrap();
        assert_eq!(data.segment_number, 1);
        assert_eq!(data.volume, Some(volume));
        assert_eq!(data.tables.len(), 1);
        assert_eq!(data.tables[0].1.len(), 1);
        assert_eq!(data.table_fallbacks, 0);
    }

    #[test]
    fn table_crc_mismatch_falls_back_to_table2() {
        let volume = VolumeDescriptor {
            media_type: 0,
            number_of_chunks: 1,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            number_of_sectors: 1,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        };
        let table = Table {
            base_offset: 0,
            entries: vec![crate::section::TableEntry {
                compressed: false,
                raw_offset: 0,
            }],
            last_entry_size: None,
        };
        let mut bytes = write_minimal_segment(1, &volume, &table, SectionKind::Done);

        // Corrupt one byte inside the primary `table`'s entry array
        // without touching the section descriptor's own checksum: find
        // the `table` kind marker and flip a byte a bit past its header.
        let table_tag_pos = bytes
            .windows(5)
            .position(|w| w == b"table")
            .expect("table section present");
        // Entry bytes start 24 bytes into the body, body starts right
        // after the 76-byte descriptor.
        let corrupt_at = table_tag_pos + SECTION_DESCRIPTOR_SIZE as usize + 24;
        bytes[corrupt_at] ^= 0xFF;

        let mut cursor = Cursor::new(bytes);
        let data = parse_segment(&mut cursor).unwrap();
        assert_eq!(data.table_fallbacks, 1);
        assert_eq!(data.tables.len(), 1);
        assert_eq!(data.tables[0].1.len(), 1);
    }

    #[test]
    fn double_table_crc_failure_degrades_to_a_corrupt_range_instead_of_aborting() {
        let volume = VolumeDescriptor {
            media_type: 0,
            number_of_chunks: 1,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            number_of_sectors: 1,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        };
        let table = Table {
            base_offset: 0,
            entries: vec![crate::section::TableEntry {
                compressed: false,
                raw_offset: 0,
            }],
            last_entry_size: None,
        };
        let mut bytes = write_minimal_segment(1, &volume, &table, SectionKind::Done);

        // Corrupt both the `table` and `table2` copies' entry bytes: the
        // tag "table" also matches as a prefix of the "table2" tag, so the
        // first two occurrences are exactly the primary and redundant
        // section markers, in file order.
        let tag_positions: Vec<usize> = bytes
            .windows(5)
            .enumerate()
            .filter(|(_, w)| *w == b"table")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tag_positions.len(), 2, "expected table and table2 tags");
        for tag_pos in tag_positions {
            let corrupt_at = tag_pos + SECTION_DESCRIPTOR_SIZE as usize + 24;
            bytes[corrupt_at] ^= 0xFF;
        }

        let mut cursor = Cursor::new(bytes);
        let data = parse_segment(&mut cursor).expect("double CRC failure must not abort parsing");
        assert_eq!(data.table_fallbacks, 1);
        assert!(data.tables.is_empty(), "no resolvable table for the corrupted pair");
        assert_eq!(data.corrupt_ranges.len(), 1);
    }
}

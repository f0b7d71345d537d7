//! I/O engine (media layer): exposes `read`/`write`/`seek` over the
//! logical media and orchestrates the chunk table, chunk cache, handle
//! pool and segment reader/writer.
//!
//! Grounded on the teacher's `EWF::ewf_read`/`ewf_seek` (`ewf.rs`), pulled
//! out of the `EWF` struct into a standalone engine so the `Ewf` façade
//! (kept, see `ewf.rs`) can delegate to it instead of owning chunk I/O
//! itself.

use crate::aes::{Aes, KeyDirection};
use crate::chunk_cache::ChunkCache;
use crate::chunk_table::ChunkTable;
use crate::error::{EwfError, Result};
use crate::handle_pool::{AccessFlags, HandleId, HandlePool};
use crate::range_list::RangeList;
use crate::section::{adler32, SectionDescriptor, SectionKind, Table, TableEntry, SECTION_DESCRIPTOR_SIZE};
use crate::segment::{self, EwfFlavor, SegmentHeader, VolumeDescriptor};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, info};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    New,
    OpenRo,
    OpenAcq,
    Closed,
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub max_open: usize,
    /// Soft cap (bytes) on segment file size during acquisition.
    pub segment_size_cap: u64,
    /// AES-CBC key for EWFX encrypted media, if the image is encrypted.
    pub decryption_key: Option<Vec<u8>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_open: 8,
            segment_size_cap: 1_500_000_000,
            decryption_key: None,
        }
    }
}

/// The complete random-access view of one acquired device, backed by one
/// or more EWF segment files.
pub struct MediaHandle {
    state: ImageState,
    pool: HandlePool,
    /// `segment_number - 1` -> pool handle id.
    segment_handles: Vec<HandleId>,
    segment_paths: Vec<PathBuf>,
    chunk_table: ChunkTable,
    cache: ChunkCache,
    volume: VolumeDescriptor,
    position: u64,
    header_metadata: HashMap<String, String>,
    md5: Option<[u8; 16]>,
    sha1: Option<[u8; 20]>,
    acquisition_errors: RangeList,
    error_entries: Vec<(u32, u32)>,
    session_entries: Vec<(u32, u32)>,
    ltree_blob: Option<Vec<u8>>,
    xheader_blob: Option<Vec<u8>>,
    table_fallbacks: u32,
    /// `(segment_number, segment-relative start, end)` byte ranges where a
    /// double `table`/`table2` CRC failure left a span of chunks
    /// unresolvable (spec.md §4.4/§7). Kept per-segment rather than folded
    /// into `acquisition_errors`'s single global keyspace, since each
    /// range is only meaningful relative to its own segment file.
    corrupted_ranges: Vec<(u16, u64, u64)>,
    decrypt_ctx: Option<Aes>,

    // --- acquisition (write) state ---
    opts: OpenOptions,
    active_segment_number: u16,
    active_segment_offset: u64,
    active_sectors_start: u64,
    pending_entries: Vec<TableEntry>,
    write_buffer: Vec<u8>,
    base_path: Option<PathBuf>,
    /// Global chunk index of the next chunk to be appended; `chunk_table`
    /// itself only learns about a segment's chunks once it closes, so
    /// this tracks count independently while a segment is still open.
    next_chunk_index: u64,
}

impl MediaHandle {
    /// Open an existing image read-only from any one of its segment
    /// files.
    pub fn open_read(path: &Path, opts: OpenOptions) -> Result<Self> {
        let segment_paths = segment::find_segment_files(path)?;
        let mut pool = HandlePool::new(opts.max_open);
        let mut segment_handles = Vec::with_capacity(segment_paths.len());
        for p in &segment_paths {
            segment_handles.push(pool.add(p.clone(), AccessFlags::READ));
        }

        let mut volume: Option<VolumeDescriptor> = None;
        let mut chunk_table = ChunkTable::new(0);
        let mut header_metadata = HashMap::new();
        let mut md5 = None;
        let mut sha1 = None;
        let mut acquisition_errors = RangeList::new();
        let mut error_entries = Vec::new();
        let mut session_entries = Vec::new();
        let mut ltree_blob = None;
        let mut xheader_blob = None;
        let mut table_fallbacks = 0u32;
        let mut corrupted_ranges = Vec::new();
        let mut bytes_per_sector_hint = 512u64;

        for (i, id) in segment_handles.iter().enumerate() {
            let segment_number = (i + 1) as u16;
            let data = pool.with_open(*id, |f| segment::parse_segment(f))?;
            if let Some(v) = data.volume {
                bytes_per_sector_hint = v.bytes_per_sector as u64;
                if let Some(existing) = &volume {
                    if existing != &v {
                        return Err(EwfError::ConflictingMediaDescriptor(format!(
                            "segment {segment_number} volume descriptor differs from segment 1"
                        )));
                    }
                } else {
                    volume = Some(v);
                }
            }
            if chunk_table.chunk_bytes() == 0 {
                if let Some(v) = &volume {
                    chunk_table = ChunkTable::new(v.chunk_size());
                }
            }
            for (base_offset, entries, sectors_end) in data.tables {
                chunk_table.push_table_section(segment_number, base_offset, entries, sectors_end);
            }
            header_metadata.extend(data.header_metadata);
            md5 = md5.or(data.md5);
            sha1 = sha1.or(data.sha1);
            for (start, count) in &data.errors {
                acquisition_errors.append_range(
                    *start as u64 * bytes_per_sector_hint,
                    *count as u64 * bytes_per_sector_hint,
                )?;
            }
            error_entries.extend(data.errors);
            session_entries.extend(data.sessions);
            ltree_blob = ltree_blob.or(data.ltree_blob);
            xheader_blob = xheader_blob.or(data.xheader_blob);
            table_fallbacks += data.table_fallbacks;
            corrupted_ranges.extend(
                data.corrupt_ranges
                    .iter()
                    .map(|(start, end)| (segment_number, *start, *end)),
            );
        }

        let volume = volume.ok_or_else(|| {
            EwfError::ConflictingMediaDescriptor("no volume/disk section found".into())
        })?;

        let decrypt_ctx = match &opts.decryption_key {
            Some(key) => Some(Aes::new(KeyDirection::Decrypt, key)?),
            None => None,
        };

        Ok(MediaHandle {
            state: ImageState::OpenRo,
            pool,
            segment_handles,
            segment_paths,
            chunk_table,
            cache: ChunkCache::new(),
            volume,
            position: 0,
            header_metadata,
            md5,
            sha1,
            acquisition_errors,
            error_entries,
            session_entries,
            ltree_blob,
            xheader_blob,
            table_fallbacks,
            corrupted_ranges,
            decrypt_ctx,
            opts,
            active_segment_number: 0,
            active_segment_offset: 0,
            active_sectors_start: 0,
            pending_entries: Vec::new(),
            write_buffer: Vec::new(),
            base_path: None,
            next_chunk_index: 0,
        })
    }

    /// Begin a new acquisition image at `base_path` (e.g. `evidence.E01`).
    pub fn create(base_path: &Path, volume: VolumeDescriptor, opts: OpenOptions) -> Result<Self> {
        let mut pool = HandlePool::new(opts.max_open);
        let first_path = base_path.to_path_buf();
        let id = pool.add(
            first_path.clone(),
            AccessFlags::WRITE.union(AccessFlags::TRUNCATE),
        );
        let chunk_table = ChunkTable::new(volume.chunk_size());

        let mut handle = MediaHandle {
            state: ImageState::OpenAcq,
            pool,
            segment_handles: vec![id],
            segment_paths: vec![first_path.clone()],
            chunk_table,
            cache: ChunkCache::new(),
            volume,
            position: 0,
            header_metadata: HashMap::new(),
            md5: None,
            sha1: None,
            acquisition_errors: RangeList::new(),
            error_entries: Vec::new(),
            session_entries: Vec::new(),
            ltree_blob: None,
            xheader_blob: None,
            table_fallbacks: 0,
            corrupted_ranges: Vec::new(),
            decrypt_ctx: None,
            opts,
            active_segment_number: 1,
            active_segment_offset: 0,
            active_sectors_start: 0,
            pending_entries: Vec::new(),
            write_buffer: Vec::new(),
            base_path: Some(first_path),
            next_chunk_index: 0,
        };
        handle.start_segment()?;
        Ok(handle)
    }

    fn start_segment(&mut self) -> Result<()> {
        let id = self.segment_handles[self.active_segment_number as usize - 1];
        self.pool.with_open(id, |f| {
            f.set_len(0)?;
            SegmentHeader::write(f, EwfFlavor::Ewf, self.active_segment_number)?;
            Ok(())
        })?;
        self.active_segment_offset = self.pool.with_open(id, |f| Ok(f.stream_position()?))?;

        // volume section, immediately known up front.
        let volume = self.volume.clone();
        let body_len = 1052u64 + 4;
        let section_start = self.active_segment_offset;
        let after = section_start + SECTION_DESCRIPTOR_SIZE + body_len;
        self.pool.with_open(id, |f| {
            SectionDescriptor::write(f, &SectionKind::Volume, after, SECTION_DESCRIPTOR_SIZE + body_len)?;
            volume.write_at(f)?;
            Ok(())
        })?;

        // sectors section header is written now with a placeholder
        // next-offset; it is rewritten once the section closes.
        let sectors_start = self.pool.with_open(id, |f| Ok(f.stream_position()?))?;
        self.active_sectors_start = sectors_start + SECTION_DESCRIPTOR_SIZE;
        self.pool.with_open(id, |f| {
            SectionDescriptor::write(f, &SectionKind::Sectors, sectors_start, SECTION_DESCRIPTOR_SIZE)?;
            Ok(())
        })?;
        self.pending_entries.clear();
        Ok(())
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn get_media_size(&self) -> u64 {
        self.volume.media_size()
    }

    pub fn get_chunk_size(&self) -> u32 {
        self.volume.chunk_size() as u32
    }

    pub fn get_sectors_per_chunk(&self) -> u32 {
        self.volume.sectors_per_chunk
    }

    pub fn get_bytes_per_sector(&self) -> u32 {
        self.volume.bytes_per_sector
    }

    pub fn get_number_of_sectors(&self) -> u64 {
        self.volume.number_of_sectors
    }

    pub fn get_hash_value(&self, name: &str) -> Option<Vec<u8>> {
        match name {
            "md5" => self.md5.map(|h| h.to_vec()),
            "sha1" => self.sha1.map(|h| h.to_vec()),
            _ => None,
        }
    }

    pub fn set_hash_value(&mut self, name: &str, value: &[u8]) -> Result<()> {
        match name {
            "md5" => {
                let mut h = [0u8; 16];
                if value.len() != 16 {
                    return Err(EwfError::InvalidArgument("md5 must be 16 bytes".into()));
                }
                h.copy_from_slice(value);
                self.md5 = Some(h);
                Ok(())
            }
            "sha1" => {
                let mut h = [0u8; 20];
                if value.len() != 20 {
                    return Err(EwfError::InvalidArgument("sha1 must be 20 bytes".into()));
                }
                h.copy_from_slice(value);
                self.sha1 = Some(h);
                Ok(())
            }
            other => Err(EwfError::UnsupportedValue(format!("unknown hash '{other}'"))),
        }
    }

    pub fn get_number_of_acquiry_errors(&self) -> usize {
        self.error_entries.len()
    }

    pub fn get_acquiry_error(&self, i: usize) -> Option<(u32, u32)> {
        self.error_entries.get(i).copied()
    }

    pub fn get_number_of_sessions(&self) -> usize {
        self.session_entries.len()
    }

    pub fn get_session(&self, i: usize) -> Option<(u32, u32)> {
        self.session_entries.get(i).copied()
    }

    pub fn table_fallback_count(&self) -> u32 {
        self.table_fallbacks
    }

    pub fn header_metadata(&self) -> &HashMap<String, String> {
        &self.header_metadata
    }

    pub fn ltree_blob(&self) -> Option<&[u8]> {
        self.ltree_blob.as_deref()
    }

    pub fn xheader_blob(&self) -> Option<&[u8]> {
        self.xheader_blob.as_deref()
    }

    pub fn get_number_of_corrupted_ranges(&self) -> usize {
        self.corrupted_ranges.len()
    }

    /// `(segment_number, segment-relative start, end)` of one unreadable
    /// chunk span left by a double `table`/`table2` CRC failure.
    pub fn get_corrupted_range(&self, i: usize) -> Option<(u16, u64, u64)> {
        self.corrupted_ranges.get(i).copied()
    }

    fn handle_for_segment(&self, segment_number: u16) -> Result<HandleId> {
        self.segment_handles
            .get(segment_number as usize - 1)
            .copied()
            .ok_or_else(|| {
                EwfError::OutOfBounds(format!("no handle for segment {segment_number}"))
            })
    }

    fn decode_chunk(&mut self, chunk_index: u64) -> Result<Vec<u8>> {
        let resolved = self.chunk_table.resolve(chunk_index)?;
        let chunk_bytes = self.chunk_table.chunk_bytes() as usize;

        if resolved.is_sparse {
            return Ok(vec![0u8; chunk_bytes]);
        }

        let id = self.handle_for_segment(resolved.segment_number)?;
        let mut raw = vec![0u8; resolved.encoded_size as usize];
        self.pool.with_open(id, |f| {
            f.seek(SeekFrom::Start(resolved.byte_offset))?;
            f.read_exact(&mut raw)?;
            Ok(())
        })?;

        let mut decoded = if resolved.is_compressed {
            let mut decoder = flate2::read::ZlibDecoder::new(&raw[..]);
            let mut out = Vec::with_capacity(chunk_bytes);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| EwfError::DecompressionFailed(e.to_string()))?;
            out
        } else {
            if raw.len() < 4 {
                return Err(EwfError::ChunkIntegrityFailed { chunk_index });
            }
            let (payload, trailer) = raw.split_at(raw.len() - 4);
            let expected = u32::from_le_bytes(trailer.try_into().unwrap());
            if adler32(payload) != expected {
                return Err(EwfError::ChunkIntegrityFailed { chunk_index });
            }
            payload.to_vec()
        };

        if let Some(ctx) = &self.decrypt_ctx {
            let mut iv = [0u8; 16];
            iv[0..8].copy_from_slice(&chunk_index.to_le_bytes());
            let mut plain = vec![0u8; decoded.len()];
            ctx.cbc(&iv, &decoded, &mut plain)?;
            decoded = plain;
        }

        Ok(decoded)
    }

    fn chunk_at(&mut self, chunk_index: u64) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.get(chunk_index) {
            return Ok(data.to_vec());
        }
        self.cache.mark_decoding(chunk_index);
        let decoded = self.decode_chunk(chunk_index)?;
        self.cache.put(chunk_index, decoded.clone());
        // Speculative read-ahead, best-effort only.
        if chunk_index + 1 < self.chunk_table.total_chunks()
            && self.cache.get(chunk_index + 1).is_none()
        {
            if let Ok(next) = self.decode_chunk(chunk_index + 1) {
                self.cache.put(chunk_index + 1, next);
            }
        }
        Ok(decoded)
    }

    /// Read up to `buf.len()` bytes starting at the current position.
    /// Returns the number of bytes actually copied, which is `< buf.len()`
    /// if and only if end-of-image was reached.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state == ImageState::OpenAcq {
            return Err(EwfError::InvalidArgument(
                "read is not supported while acquiring; finalize first".into(),
            ));
        }
        let media_size = self.get_media_size();
        if self.position >= media_size {
            return Ok(0);
        }
        let chunk_bytes = self.chunk_table.chunk_bytes();
        let mut total = 0usize;
        let mut remaining = (buf.len() as u64).min(media_size - self.position) as usize;

        while remaining > 0 {
            let chunk_index = self.position / chunk_bytes;
            let in_chunk = (self.position % chunk_bytes) as usize;
            let chunk = self.chunk_at(chunk_index)?;
            let available = chunk.len() - in_chunk;
            let n = available.min(remaining);
            buf[total..total + n].copy_from_slice(&chunk[in_chunk..in_chunk + n]);
            total += n;
            remaining -= n;
            self.position += n as u64;
        }
        Ok(total)
    }

    /// Append `data` to the image during acquisition, one chunk at a
    /// time, rolling segments when the size cap is reached.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.state != ImageState::OpenAcq {
            return Err(EwfError::ReadOnly);
        }
        let chunk_bytes = self.chunk_table.chunk_bytes() as usize;
        self.write_buffer.extend_from_slice(data);
        while self.write_buffer.len() >= chunk_bytes {
            let chunk: Vec<u8> = self.write_buffer.drain(0..chunk_bytes).collect();
            self.flush_chunk(&chunk)?;
        }
        Ok(data.len())
    }

    fn flush_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let id = self.handle_for_segment(self.active_segment_number)?;
        // An all-zero chunk is stored sparse: no on-disk bytes at all, per
        // spec.md §3/§6. `chunk_table::resolve` already treats an entry
        // whose encoded size comes out to zero (next entry's offset equal
        // to this one's) as sparse, so writing nothing here is sufficient.
        let is_sparse = chunk.iter().all(|&b| b == 0);
        let (payload, use_compressed): (Vec<u8>, bool) = if is_sparse {
            (Vec::new(), false)
        } else {
            let mut compressed = Vec::new();
            {
                let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
                encoder.write_all(chunk).map_err(EwfError::Io)?;
                encoder.finish().map_err(EwfError::Io)?;
            }
            if compressed.len() + 4 < chunk.len() {
                (compressed, true)
            } else {
                let mut raw = chunk.to_vec();
                let crc = adler32(chunk);
                raw.extend_from_slice(&crc.to_le_bytes());
                (raw, false)
            }
        };

        let raw_offset = self.pool.with_open(id, |f| {
            let pos = f.stream_position()?;
            f.write_all(&payload)?;
            Ok(pos)
        })?;
        let base_offset = self.active_sectors_start;
        self.pending_entries.push(TableEntry {
            compressed: use_compressed,
            raw_offset: (raw_offset - base_offset) as u32,
        });

        let chunk_index = self.next_chunk_index;
        self.next_chunk_index += 1;
        // Stays dirty until the sectors/table chain it belongs to is
        // durably closed out, at which point `close_out_current_segment`
        // clears it (spec.md §4.6).
        self.cache.put_dirty(chunk_index, chunk.to_vec());

        let current_size = self
            .pool
            .with_open(id, |f| Ok(f.stream_position()?))?;
        if current_size - self.active_segment_offset >= self.opts.segment_size_cap {
            self.roll_segment()?;
        }
        Ok(())
    }

    fn roll_segment(&mut self) -> Result<()> {
        self.close_out_current_segment(SectionKind::Next)?;
        self.active_segment_number += 1;
        let next_path = next_segment_path(
            self.base_path.as_ref().expect("acquisition base path"),
            self.active_segment_number,
        )?;
        let id = self.pool.add(
            next_path.clone(),
            AccessFlags::WRITE.union(AccessFlags::TRUNCATE),
        );
        self.segment_handles.push(id);
        self.segment_paths.push(next_path);
        self.start_segment()
    }

    fn close_out_current_segment(&mut self, terminator: SectionKind) -> Result<()> {
        let id = self.handle_for_segment(self.active_segment_number)?;
        let sectors_end = self.pool.with_open(id, |f| Ok(f.stream_position()?))?;

        // `start_segment` wrote the sectors descriptor as a zero-length
        // placeholder, since its true extent isn't known until every
        // chunk has been appended. Backfill it now.
        let sectors_descriptor_start = self.active_sectors_start - SECTION_DESCRIPTOR_SIZE;
        self.pool.with_open(id, |f| {
            f.seek(SeekFrom::Start(sectors_descriptor_start))?;
            SectionDescriptor::write(
                f,
                &SectionKind::Sectors,
                sectors_end,
                sectors_end - sectors_descriptor_start,
            )
        })?;

        let table = Table {
            base_offset: self.active_sectors_start,
            entries: self.pending_entries.clone(),
            last_entry_size: None,
        };
        let mut table_body = Vec::new();
        table.write(&mut table_body).map_err(|_| {
            EwfError::InvalidArgument("failed to serialize table body".into())
        })?;
        let table_size = SECTION_DESCRIPTOR_SIZE + table_body.len() as u64;

        let table_start = sectors_end;
        let after_table = table_start + table_size;
        self.pool.with_open(id, |f| {
            f.seek(SeekFrom::Start(table_start))?;
            SectionDescriptor::write(f, &SectionKind::Table, after_table, table_size)?;
            f.write_all(&table_body)?;
            Ok(())
        })?;

        let table2_start = after_table;
        let after_table2 = table2_start + table_size;
        self.pool.with_open(id, |f| {
            f.seek(SeekFrom::Start(table2_start))?;
            SectionDescriptor::write(f, &SectionKind::Table2, after_table2, table_size)?;
            f.write_all(&table_body)?;
            Ok(())
        })?;

        let term_start = after_table2;
        self.pool.with_open(id, |f| {
            f.seek(SeekFrom::Start(term_start))?;
            SectionDescriptor::write(f, &terminator, term_start, SECTION_DESCRIPTOR_SIZE)?;
            Ok(())
        })?;

        self.chunk_table.push_table_section(
            self.active_segment_number,
            self.active_sectors_start,
            self.pending_entries
                .iter()
                .map(|e| (e.raw_offset, e.compressed))
                .collect(),
            sectors_end,
        );
        self.pending_entries.clear();

        let dirty_count = self.cache.iter_dirty().count();
        if dirty_count > 0 {
            debug!("flushing {dirty_count} dirty chunk(s) from the cache at segment roll-over");
        }
        self.cache.clear_dirty();

        Ok(())
    }

    /// Flush any partial final chunk, close out the `sectors`/`table`
    /// chain with a `done` terminator, and transition to `OpenRo`. No
    /// further writes are accepted afterward.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state != ImageState::OpenAcq {
            return Err(EwfError::InvalidArgument("not in acquisition state".into()));
        }
        if !self.write_buffer.is_empty() {
            let remainder = std::mem::take(&mut self.write_buffer);
            self.flush_chunk(&remainder)?;
        }
        self.close_out_current_segment(SectionKind::Done)?;
        self.state = ImageState::OpenRo;
        info!(
            "acquisition finalized: {} chunks across {} segment(s)",
            self.chunk_table.total_chunks(),
            self.segment_paths.len()
        );
        Ok(())
    }

    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> Result<u64> {
        let base = match whence {
            SeekWhence::Set => 0i64,
            SeekWhence::Cur => self.position as i64,
            SeekWhence::End => self.get_media_size() as i64,
        };
        let new_offset = base + offset;
        if new_offset < 0 {
            return Err(EwfError::InvalidArgument("seek before start of image".into()));
        }
        let media_size = self.get_media_size();
        let clamped = if self.state == ImageState::OpenAcq {
            new_offset as u64
        } else {
            (new_offset as u64).min(media_size)
        };
        self.position = clamped;
        Ok(self.position)
    }

    pub fn close(&mut self) -> Result<()> {
        self.pool.close_all()?;
        self.state = ImageState::Closed;
        Ok(())
    }
}

impl std::io::Read for MediaHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        MediaHandle::read(self, buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Acquisition-time `Write`: appends to the active segment, one chunk at a
/// time, exactly as [`MediaHandle::write`] does. `flush` is a no-op — every
/// full chunk is already durably appended by the time `write` returns; the
/// final partial chunk is only committed by [`MediaHandle::finalize`].
impl std::io::Write for MediaHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        MediaHandle::write(self, buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::io::Seek for MediaHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(o) => (o as i64, SeekWhence::Set),
            SeekFrom::Current(o) => (o, SeekWhence::Cur),
            SeekFrom::End(o) => (o, SeekWhence::End),
        };
        MediaHandle::seek(self, offset, whence)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

/// `evidence.E01` -> `evidence.E02`, `.E99` -> `.EAA`, etc.
fn next_segment_path(base: &Path, next_number: u16) -> Result<PathBuf> {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EwfError::InvalidArgument("invalid segment base path".into()))?;
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    let suffix = segment_suffix(next_number)?;
    Ok(parent.join(format!("{stem}.{suffix}")))
}

fn segment_suffix(n: u16) -> Result<String> {
    if n == 0 {
        return Err(EwfError::InvalidArgument("segment number must start at 1".into()));
    }
    if (1..=99).contains(&n) {
        return Ok(format!("E{n:02}"));
    }
    // E100.. wraps into EAA, EAB, ... per the classic EnCase convention:
    // two letters after the first 99 numeric segments.
    let idx = n as u32 - 100;
    if idx > 25 * 26 + 25 {
        return Err(EwfError::OutOfBounds("segment number exceeds .E99/.Exx range".into()));
    }
    let first = (b'A' + (idx / 26) as u8) as char;
    let second = (b'A' + (idx % 26) as u8) as char;
    Ok(format!("E{first}{second}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_volume(number_of_sectors: u64, sectors_per_chunk: u32) -> VolumeDescriptor {
        VolumeDescriptor {
            media_type: 0,
            number_of_chunks: 0,
            sectors_per_chunk,
            bytes_per_sector: 512,
            number_of_sectors,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        }
    }

    #[test]
    fn s1_single_segment_single_chunk_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("case.E01");
        let volume = small_volume(1, 1); // 512-byte media, 1 chunk
        let mut handle =
            MediaHandle::create(&path, volume, OpenOptions::default()).unwrap();
        let plaintext: Vec<u8> = (0u16..512).map(|b| (b % 256) as u8).collect();
        handle.write(&plaintext).unwrap();
        handle.finalize().unwrap();
        handle.close().unwrap();

        let mut reader = MediaHandle::open_read(&path, OpenOptions::default()).unwrap();
        let mut out = vec![0u8; 512];
        let n = reader.read(&mut out).unwrap();
        assert_eq!(n, 512);
        assert_eq!(out, plaintext);
    }

    #[test]
    fn s3_all_zero_chunk_is_stored_sparse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sparse.E01");
        // 4 chunks of 512 bytes each (1 sector/chunk); chunk 1 is all-zero.
        let volume = small_volume(4, 1);
        let mut handle =
            MediaHandle::create(&path, volume, OpenOptions::default()).unwrap();
        let mut media = vec![0xAAu8; 512];
        media.extend(vec![0u8; 512]); // chunk 1: sparse
        media.extend(vec![0xBBu8; 512]);
        media.extend(vec![0xCCu8; 512]);
        handle.write(&media).unwrap();
        handle.finalize().unwrap();
        handle.close().unwrap();

        let mut reader = MediaHandle::open_read(&path, OpenOptions::default()).unwrap();
        let resolved = reader.chunk_table.resolve(1).unwrap();
        assert!(resolved.is_sparse);
        assert_eq!(resolved.encoded_size, 0);

        let mut out = vec![0u8; 512];
        reader.seek(512, SeekWhence::Set).unwrap();
        let n = reader.read(&mut out).unwrap();
        assert_eq!(n, 512);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn coverage_property_partition_reproduces_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cov.E01");
        let volume = small_volume(4, 1); // 2048 bytes, chunk = 512 bytes
        let mut handle =
            MediaHandle::create(&path, volume, OpenOptions::default()).unwrap();
        let plaintext: Vec<u8> = (0u32..2048).map(|b| (b % 251) as u8).collect();
        handle.write(&plaintext).unwrap();
        handle.finalize().unwrap();
        handle.close().unwrap();

        let mut reader = MediaHandle::open_read(&path, OpenOptions::default()).unwrap();
        let mut reconstructed = Vec::new();
        let mut buf = [0u8; 7]; // odd partition size on purpose
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            reconstructed.extend_from_slice(&buf[..n]);
        }
        assert_eq!(reconstructed, plaintext);
    }

    #[test]
    fn out_of_range_offset_reads_as_eof_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eof.E01");
        let volume = small_volume(1, 1);
        let mut handle =
            MediaHandle::create(&path, volume, OpenOptions::default()).unwrap();
        handle.write(&[0u8; 512]).unwrap();
        handle.finalize().unwrap();
        handle.close().unwrap();

        let mut reader = MediaHandle::open_read(&path, OpenOptions::default()).unwrap();
        reader.seek(512, SeekWhence::Set).unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn segment_suffix_wraps_after_99() {
        assert_eq!(segment_suffix(1).unwrap(), "E01");
        assert_eq!(segment_suffix(99).unwrap(), "E99");
        assert_eq!(segment_suffix(100).unwrap(), "EAA");
        assert_eq!(segment_suffix(101).unwrap(), "EAB");
    }
}

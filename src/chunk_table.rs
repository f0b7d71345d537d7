//! Maps a logical chunk index to its physical location.
//!
//! Generalizes the teacher's `HashMap<usize, Vec<Chunk>>` (segment →
//! chunk list, scanned linearly in `ewf_seek`) into the two-level
//! table-of-tables plus cumulative-count prefix sum spec.md §4.5
//! specifies, so `resolve()` is O(log T) in the number of table sections
//! rather than O(segments).

use crate::error::{EwfError, Result};

/// Where and how one chunk's encoded bytes live on disk.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedChunk {
    pub segment_number: u16,
    pub byte_offset: u64,
    pub encoded_size: u64,
    pub is_compressed: bool,
    pub is_sparse: bool,
}

/// One `table` section's worth of entries, plus the cumulative chunk
/// count at the section's end so binary search resolves a global index to
/// a (section, local-index) pair in O(log T).
struct TableSection {
    segment_number: u16,
    base_offset: u64,
    /// (raw_offset, compressed) per entry, in order.
    entries: Vec<(u32, bool)>,
    /// Absolute end offset of the segment's `sectors` payload, used to
    /// size the final entry when no trailer field is available.
    sectors_end: u64,
    /// Global chunk index of this section's first entry.
    first_chunk_index: u64,
}

pub struct ChunkTable {
    sections: Vec<TableSection>,
    /// `cumulative[i]` = total chunks across `sections[0..i]`.
    cumulative: Vec<u64>,
    total_chunks: u64,
    chunk_bytes: u64,
}

impl ChunkTable {
    pub fn new(chunk_bytes: u64) -> Self {
        Self {
            sections: Vec::new(),
            cumulative: vec![0],
            total_chunks: 0,
            chunk_bytes,
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Append one `table` section's decoded entries.
    pub fn push_table_section(
        &mut self,
        segment_number: u16,
        base_offset: u64,
        entries: Vec<(u32, bool)>,
        sectors_end: u64,
    ) {
        let first_chunk_index = self.total_chunks;
        self.total_chunks += entries.len() as u64;
        self.sections.push(TableSection {
            segment_number,
            base_offset,
            entries,
            sectors_end,
            first_chunk_index,
        });
        self.cumulative.push(self.total_chunks);
    }

    fn section_for(&self, chunk_index: u64) -> Result<usize> {
        if chunk_index >= self.total_chunks {
            return Err(EwfError::OutOfBounds(format!(
                "chunk index {chunk_index} out of range (total {})",
                self.total_chunks
            )));
        }
        // cumulative[i+1] is the exclusive upper bound of sections[i]
        let idx = self.cumulative.partition_point(|&c| c <= chunk_index);
        Ok(idx - 1)
    }

    /// Resolve a global chunk index to its physical location.
    pub fn resolve(&self, chunk_index: u64) -> Result<ResolvedChunk> {
        let section_idx = self.section_for(chunk_index)?;
        let section = &self.sections[section_idx];
        let local = (chunk_index - section.first_chunk_index) as usize;
        let (raw_offset, compressed) = section.entries[local];
        let byte_offset = section.base_offset + raw_offset as u64;

        let encoded_size = if local + 1 < section.entries.len() {
            let (next_offset, _) = section.entries[local + 1];
            (section.base_offset + next_offset as u64) - byte_offset
        } else {
            section.sectors_end.saturating_sub(byte_offset)
        };

        // Sparse convention (spec.md §4.4/GLOSSARY): a chunk with zero
        // on-disk bytes carries no payload at all, regardless of its
        // compressed bit.
        let is_sparse = encoded_size == 0;

        Ok(ResolvedChunk {
            segment_number: section.segment_number,
            byte_offset,
            encoded_size,
            is_compressed: compressed,
            is_sparse,
        })
    }

    pub fn chunk_bytes(&self) -> u64 {
        self.chunk_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_within_and_across_sections() {
        let mut ct = ChunkTable::new(32768);
        ct.push_table_section(
            1,
            1000,
            vec![(0, false), (32772, false)],
            1000 + 32772 * 2,
        );
        ct.push_table_section(2, 500, vec![(0, true)], 500 + 100);

        let r0 = ct.resolve(0).unwrap();
        assert_eq!(r0.segment_number, 1);
        assert_eq!(r0.byte_offset, 1000);
        assert_eq!(r0.encoded_size, 32772);
        assert!(!r0.is_compressed);

        let r1 = ct.resolve(1).unwrap();
        assert_eq!(r1.byte_offset, 1000 + 32772);
        assert_eq!(r1.encoded_size, 32772);

        let r2 = ct.resolve(2).unwrap();
        assert_eq!(r2.segment_number, 2);
        assert_eq!(r2.byte_offset, 500);
        assert_eq!(r2.encoded_size, 100);
        assert!(r2.is_compressed);
    }

    #[test]
    fn out_of_range_chunk_is_an_error() {
        let mut ct = ChunkTable::new(32768);
        ct.push_table_section(1, 0, vec![(0, false)], 100);
        assert!(ct.resolve(5).is_err());
    }
}

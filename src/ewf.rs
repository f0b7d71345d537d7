//! **EWF (Expert Witness Format) reader/writer façade**
//!
//! This module provides the public [`EWF`] struct, a thin `Read`/`Seek`
//! wrapper over [`crate::media::MediaHandle`] that keeps the shape the
//! teacher's original `ewf.rs` exposed (`EWF::new`, `print_info`,
//! `get_sector_size`) while delegating all chunk I/O, table resolution,
//! and handle multiplexing to the media layer.

use crate::error::{EwfError, Result};
use crate::media::{ImageState, MediaHandle, OpenOptions, SeekWhence};
use log::info;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Public façade over one multi-segment EWF image, opened read-only.
///
/// Cloning duplicates the underlying segment file descriptors (via
/// [`MediaHandle::open_read`] against the same first segment path) so two
/// clones maintain independent cursors, matching the teacher's
/// `EWF::clone` contract.
pub struct EWF {
    handle: MediaHandle,
    first_segment: std::path::PathBuf,
}

impl EWF {
    /// Create a new `EWF` reader from **any** file belonging to the image.
    ///
    /// *Example* – reading from the very first segment:
    /// ```no_run
    /// # use ewf_core::ewf::EWF;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut ewf = EWF::new("/evidence/disk.E01")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(file_path: &str) -> Result<Self> {
        let path = Path::new(file_path);
        let handle = MediaHandle::open_read(path, OpenOptions::default())?;
        Ok(EWF {
            handle,
            first_segment: path.to_path_buf(),
        })
    }

    /// Outputs a human-readable summary to the current `log` subscriber.
    ///
    /// Ref: <https://github.com/libyal/libewf/blob/main/documentation/Expert%20Witness%20Compression%20Format%202%20(EWF2).asciidoc>
    pub fn print_info(&self) {
        info!("EWF File Information:");

        let metadata = self.handle.header_metadata();
        if !metadata.is_empty() {
            info!("Acquisition Metadata:");

            // canonical display order
            let order = [
                "c", "cn", "n", "en", "a", "e", "ex", "t", "nt", "av", "ov", "m", "u", "p", "r",
            ];

            fn pretty(id: &str) -> &str {
                match id {
                    "c" | "cn" => "Case Number",
                    "n" | "en" => "Evidence Number",
                    "a" => "Description",
                    "e" | "ex" => "Examiner",
                    "t" | "nt" => "Notes",
                    "av" => "Application Version",
                    "ov" => "OS Version",
                    "m" => "Acquisition Date",
                    "u" => "System Date",
                    "p" => "Password Hash",
                    "r" => "Reserved",
                    _ => id,
                }
            }

            for k in order {
                if let Some(v) = metadata.get(k) {
                    info!("  {}: {}", pretty(k), v);
                }
            }
            for (k, v) in metadata {
                if !order.contains(&k.as_str()) {
                    info!("  {}: {}", pretty(k), v);
                }
            }
        }

        info!("Volume Information:");
        info!("  Chunk Size: {} bytes", self.handle.get_chunk_size());
        info!(
            "  Sectors Per Chunk: {}",
            self.handle.get_sectors_per_chunk()
        );
        info!("  Bytes Per Sector: {}", self.handle.get_bytes_per_sector());
        info!(
            "  Total Sector Count: {}",
            self.handle.get_number_of_sectors()
        );
        info!("  Media Size: {} bytes", self.handle.get_media_size());

        if let Some(md5) = self.handle.get_hash_value("md5") {
            info!("  MD5: {}", hex(&md5));
        }
        if let Some(sha1) = self.handle.get_hash_value("sha1") {
            info!("  SHA1: {}", hex(&sha1));
        }

        let errors = self.handle.get_number_of_acquiry_errors();
        if errors > 0 {
            info!("Acquisition Errors: {}", errors);
        }
        let sessions = self.handle.get_number_of_sessions();
        if sessions > 0 {
            info!("Sessions: {}", sessions);
        }
    }

    /// Returns the logical sector size declared in the volume section.
    #[inline]
    pub fn get_sector_size(&self) -> u16 {
        self.handle.get_bytes_per_sector() as u16
    }

    pub fn get_media_size(&self) -> u64 {
        self.handle.get_media_size()
    }

    pub fn get_chunk_size(&self) -> u32 {
        self.handle.get_chunk_size()
    }

    pub fn get_hash_value(&self, name: &str) -> Option<Vec<u8>> {
        self.handle.get_hash_value(name)
    }

    pub fn get_number_of_acquiry_errors(&self) -> usize {
        self.handle.get_number_of_acquiry_errors()
    }

    pub fn get_acquiry_error(&self, i: usize) -> Option<(u32, u32)> {
        self.handle.get_acquiry_error(i)
    }

    pub fn get_number_of_sessions(&self) -> usize {
        self.handle.get_number_of_sessions()
    }

    pub fn get_session(&self, i: usize) -> Option<(u32, u32)> {
        self.handle.get_session(i)
    }

    pub fn state(&self) -> ImageState {
        self.handle.state()
    }

    pub fn header_metadata(&self) -> &std::collections::HashMap<String, String> {
        self.handle.header_metadata()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Clone for EWF {
    /// Re-opens the image from its first segment path. Independent cursor,
    /// independent handle pool — the same externally-observable contract
    /// as the teacher's `EWF::clone`, implemented by reopening rather than
    /// duplicating file descriptors directly (the handle pool owns its
    /// descriptors exclusively, per spec.md §9).
    fn clone(&self) -> Self {
        EWF::new(
            self.first_segment
                .to_str()
                .expect("ewf path must be valid UTF-8"),
        )
        .expect("failed to re-open EWF image for clone")
    }
}

impl Read for EWF {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl Seek for EWF {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(o) => (o as i64, SeekWhence::Set),
            SeekFrom::Current(o) => (o, SeekWhence::Cur),
            SeekFrom::End(o) => (o, SeekWhence::End),
        };
        self.handle
            .seek(offset, whence)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl From<EwfError> for io::Error {
    fn from(e: EwfError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaHandle, OpenOptions as MediaOpenOptions};
    use crate::segment::VolumeDescriptor;
    use tempfile::tempdir;

    fn make_image(path: &Path, plaintext: &[u8], sectors_per_chunk: u32) -> VolumeDescriptor {
        let number_of_sectors = (plaintext.len() / 512) as u64;
        let volume = VolumeDescriptor {
            media_type: 0,
            number_of_chunks: 0,
            sectors_per_chunk,
            bytes_per_sector: 512,
            number_of_sectors,
            error_granularity: 0,
            set_identifier: [0u8; 16],
        };
        let mut handle =
            MediaHandle::create(path, volume.clone(), MediaOpenOptions::default()).unwrap();
        handle.write(plaintext).unwrap();
        handle.finalize().unwrap();
        handle.close().unwrap();
        volume
    }

    #[test]
    fn facade_reads_through_media_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("case.E01");
        let plaintext: Vec<u8> = (0u32..2048).map(|b| (b % 251) as u8).collect();
        make_image(&path, &plaintext, 1);

        let mut ewf = EWF::new(path.to_str().unwrap()).unwrap();
        assert_eq!(ewf.get_sector_size(), 512);
        assert_eq!(ewf.get_media_size(), 2048);

        let mut out = vec![0u8; 2048];
        ewf.seek(SeekFrom::Start(0)).unwrap();
        let n = io::Read::read(&mut ewf, &mut out).unwrap();
        assert_eq!(n, 2048);
        assert_eq!(out, plaintext);
    }

    #[test]
    fn clone_has_independent_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clone.E01");
        let plaintext: Vec<u8> = (0u16..512).map(|b| (b % 256) as u8).collect();
        make_image(&path, &plaintext, 1);

        let mut a = EWF::new(path.to_str().unwrap()).unwrap();
        a.seek(SeekFrom::Start(256)).unwrap();
        let b = a.clone();
        // `b` starts at position 0, unaffected by `a`'s seek.
        let mut b = b;
        let mut buf = [0u8; 4];
        io::Read::read(&mut b, &mut buf).unwrap();
        assert_eq!(buf, plaintext[0..4]);
    }
}

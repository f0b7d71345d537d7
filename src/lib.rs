//! `ewf_core` — chunk-oriented I/O engine for EnCase/Expert Witness (EWF)
//! forensic disk images.
//!
//! [`Body`]/[`BodyFormat`] is the format-agnostic façade (kept from the
//! teacher repo this crate grew out of): open a path, auto-detect or name
//! the format, and get a `Read + Seek` stream over the logical media. The
//! heavy lifting — chunk table resolution, the segment-file section
//! reader/writer, the bounded handle pool, chunk cache, AES decrypt, and
//! the range list used for acquisition bad-sector tracking — lives in
//! [`media`], [`segment`], [`chunk_table`], [`chunk_cache`],
//! [`handle_pool`], [`aes`], and [`range_list`] respectively; [`ewf`]
//! wraps all of it behind the same `Read`/`Seek` shape as [`raw`].

pub mod aes;
pub mod chunk_cache;
pub mod chunk_table;
pub mod error;
pub mod ewf;
pub mod file_entry;
pub mod handle_pool;
pub mod media;
pub mod raw;
pub mod range_list;
pub mod section;
pub mod segment;

use ewf::EWF;
use log::{error, info};
use raw::RAW;

use std::io::{self, Read, Seek, SeekFrom};

#[derive(Clone)]
pub enum BodyFormat {
    Raw {
        image: raw::RAW,
        description: String,
    },
    Ewf {
        image: ewf::EWF,
        description: String,
    },
    // Other compatible image formats here.
}

#[derive(Clone)]
pub struct Body {
    pub path: String,
    pub format: BodyFormat,
}

impl Body {
    /// Create a new Body given a file path and a format.
    /// If the format string is "auto", the image format will be auto-detected.
    pub fn new(file_path: String, format: &str) -> Body {
        if format == "auto" {
            return Body {
                path: file_path.clone(),
                format: Self::detect_format(&file_path),
            };
        }

        match format {
            "ewf" => {
                let evidence = match EWF::new(&file_path) {
                    Ok(ewf) => ewf,
                    Err(err) => {
                        error!("Error: {}", err);
                        std::process::exit(1);
                    }
                };
                Body {
                    path: file_path,
                    format: BodyFormat::Ewf {
                        image: evidence,
                        description: "Expert Witness Compression Format".to_string(),
                    },
                }
            }
            "raw" => {
                let evidence = match RAW::new(&file_path) {
                    Ok(evidence) => evidence,
                    Err(err) => {
                        error!("Error: {}", err);
                        std::process::exit(1);
                    }
                };
                Body {
                    path: file_path,
                    format: BodyFormat::Raw {
                        image: evidence,
                        description: "Raw image format".to_string(),
                    },
                }
            }
            _ => {
                error!(
                    "Error: Invalid format '{}'. Supported formats are 'raw', 'ewf', or 'auto'.",
                    format
                );
                std::process::exit(1);
            }
        }
    }

    pub fn new_from(file_path: String, format: &str, offset: Option<u64>) -> Body {
        let mut body = Body::new(file_path, format);
        if let Some(off) = offset {
            if let Err(e) = body.seek(SeekFrom::Start(off)) {
                error!("Error seeking to offset {}: {}", off, e);
                std::process::exit(1);
            }
        }
        body
    }

    pub fn print_info(&self) {
        info!("Evidence : {}", self.path);
        match &self.format {
            BodyFormat::Ewf { image, .. } => image.print_info(),
            BodyFormat::Raw { .. } => (),
            // All other compatible formats will be handled here.
        }
    }

    pub fn get_sector_size(&self) -> u16 {
        match &self.format {
            BodyFormat::Ewf { image, .. } => image.get_sector_size(),
            BodyFormat::Raw { .. } => 512,
            // All other compatible formats will be handled here.
        }
    }

    /// Returns a reference to the format description.
    pub fn format_description(&self) -> &str {
        match &self.format {
            BodyFormat::Ewf { description, .. } => description,
            BodyFormat::Raw { description, .. } => description,
        }
    }

    /// Detect the image format by attempting to create each format.
    /// Currently, tries EWF first then falls back to RAW.
    fn detect_format(file_path: &str) -> BodyFormat {
        // Try EWF detection first.
        if let Ok(evidence) = EWF::new(file_path) {
            info!("Detected an EWF disk image.");
            return BodyFormat::Ewf {
                image: evidence,
                description: "Expert Witness Compression Format (EWF)".to_string(),
            };
        }

        // Default to RAW.
        match RAW::new(file_path) {
            Ok(evidence) => {
                info!("Detected RAW Data");
                BodyFormat::Raw {
                    image: evidence,
                    description: "Raw image format".to_string(),
                }
            }
            Err(err) => {
                error!("Error opening data: {}", err);
                std::process::exit(1);
            }
        }
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.format {
            BodyFormat::Ewf { image, .. } => image.read(buf),
            BodyFormat::Raw { image, .. } => image.read(buf),
        }
    }
}

impl Seek for Body {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.format {
            BodyFormat::Ewf { image, .. } => image.seek(pos),
            BodyFormat::Raw { image, .. } => image.seek(pos),
        }
    }
}

pub struct BodySlice {
    body: Body,
    slice_start: u64,
    slice_len: u64,
    pos: u64,
}

impl BodySlice {
    pub fn new(src: &Body, slice_start: u64, slice_len: u64) -> io::Result<Self> {
        let mut body = src.clone();
        body.seek(SeekFrom::Start(slice_start))?;
        Ok(Self {
            body,
            slice_start,
            slice_len,
            pos: 0,
        })
    }
}

impl Read for BodySlice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.slice_len {
            return Ok(0);
        }
        let max = std::cmp::min(buf.len() as u64, self.slice_len - self.pos) as usize;

        let n = self.body.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BodySlice {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(off) => off,
            SeekFrom::Current(off) => (self.pos as i64 + off) as u64,
            SeekFrom::End(off) => (self.slice_len as i64 + off) as u64,
        };

        if new_pos > self.slice_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek out of slice",
            ));
        }

        self.body
            .seek(SeekFrom::Start(self.slice_start + new_pos))?;
        self.pos = new_pos;
        Ok(self.pos)
    }
}

impl Clone for BodySlice {
    fn clone(&self) -> Self {
        let mut body = self.body.clone();
        // replicate cursor state
        body.seek(SeekFrom::Start(self.slice_start + self.pos)).ok();
        Self {
            body,
            slice_start: self.slice_start,
            slice_len: self.slice_len,
            pos: self.pos,
        }
    }
}

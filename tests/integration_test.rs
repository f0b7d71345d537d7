//! End-to-end tests exercising the public `Body`/`EWF` façade, not just the
//! `media::MediaHandle` internals already covered by the per-module unit
//! tests. Mirrors the pack's integration-test style: build a real artifact
//! under a `tempfile` directory, then read it back through the crate's
//! public API.

use ewf_core::media::{MediaHandle, OpenOptions};
use ewf_core::segment::VolumeDescriptor;
use ewf_core::{Body, BodyFormat};
use std::io::{Read, Seek, SeekFrom};
use tempfile::tempdir;

fn volume(sectors_per_chunk: u32, number_of_sectors: u64) -> VolumeDescriptor {
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
fn round_trips_single_segment_image_through_body() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.E01");
    let plaintext: Vec<u8> = (0u32..8192).map(|b| (b % 223) as u8).collect();

    let mut handle =
        MediaHandle::create(&path, volume(8, 16), OpenOptions::default()).unwrap();
    handle.write(&plaintext).unwrap();
    handle.set_hash_value("md5", &[0xAA; 16]).unwrap();
    handle.finalize().unwrap();
    handle.close().unwrap();

    let mut body = Body::new(path.to_str().unwrap().to_string(), "auto");
    assert_eq!(body.get_sector_size(), 512);

    let mut out = vec![0u8; plaintext.len()];
    body.read_exact(&mut out).unwrap();
    assert_eq!(out, plaintext);

    let BodyFormat::Ewf { image, .. } = &body.format else {
        panic!("expected auto-detection to pick EWF for a segment file");
    };
    assert_eq!(image.get_hash_value("md5"), Some(vec![0xAA; 16]));
}

#[test]
fn multi_segment_acquisition_rolls_over_and_reads_back_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("multi.E01");

    // A 512-byte-per-sector, 4-sector chunk holds 2048 bytes; cap the
    // segment size tightly enough that a few thousand bytes of media force
    // at least one roll into a second segment file.
    let mut opts = OpenOptions::default();
    opts.segment_size_cap = 4096;
    let sectors_per_chunk = 4;
    let total_sectors = 40u64; // 20_480 bytes of media
    let plaintext: Vec<u8> = (0u32..(total_sectors as u32 * 512))
        .map(|b| (b % 251) as u8)
        .collect();

    let mut handle =
        MediaHandle::create(&path, volume(sectors_per_chunk, total_sectors), opts).unwrap();
    handle.write(&plaintext).unwrap();
    handle.finalize().unwrap();
    handle.close().unwrap();

    assert!(
        dir.path().join("multi.E02").exists(),
        "expected acquisition to roll into a second segment file"
    );

    let mut body = Body::new(path.to_str().unwrap().to_string(), "ewf");
    assert_eq!(body.get_sector_size(), 512);
    let mut out = vec![0u8; plaintext.len()];
    body.read_exact(&mut out).unwrap();
    assert_eq!(out, plaintext);

    // Random access across the segment boundary must also resolve cleanly.
    let mid = plaintext.len() as u64 / 2;
    body.seek(SeekFrom::Start(mid)).unwrap();
    let mut tail = vec![0u8; 256];
    body.read_exact(&mut tail).unwrap();
    assert_eq!(&tail[..], &plaintext[mid as usize..mid as usize + 256]);
}

#[test]
fn compressible_and_incompressible_chunks_round_trip_alike() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.E01");

    let sectors_per_chunk = 8; // 4096 bytes/chunk
    let chunk_bytes = sectors_per_chunk as usize * 512;
    let mut media = vec![0u8; chunk_bytes]; // highly compressible: all zero
    media.extend((0u32..chunk_bytes as u32).map(|b| ((b * 2654435761) % 256) as u8)); // incompressible-ish

    let total_sectors = (media.len() / 512) as u64;
    let mut handle = MediaHandle::create(
        &path,
        volume(sectors_per_chunk, total_sectors),
        OpenOptions::default(),
    )
    .unwrap();
    handle.write(&media).unwrap();
    handle.finalize().unwrap();
    handle.close().unwrap();

    let mut body = Body::new(path.to_str().unwrap().to_string(), "ewf");
    let mut out = vec![0u8; media.len()];
    body.read_exact(&mut out).unwrap();
    assert_eq!(out, media);
}

#[test]
fn raw_image_is_read_through_body_without_ewf_framing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.raw");
    let data: Vec<u8> = (0u16..4096).map(|b| (b % 256) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let mut body = Body::new(path.to_str().unwrap().to_string(), "auto");
    assert!(matches!(body.format, BodyFormat::Raw { .. }));

    let mut out = vec![0u8; data.len()];
    body.read_exact(&mut out).unwrap();
    assert_eq!(out, data);
}

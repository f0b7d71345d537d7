use clap::{Arg, ArgAction, Command};
use ewf_core::{Body, BodyFormat};
use log::{error, info};
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};

/// `--info --json` output: a flattened view of the acquisition metadata and
/// volume geometry, meant for downstream tooling rather than a human.
#[derive(Serialize)]
struct ImageSummary {
    path: String,
    format: String,
    sector_size: u16,
    media_size: Option<u64>,
    chunk_size: Option<u32>,
    md5: Option<String>,
    sha1: Option<String>,
    acquisition_errors: Option<usize>,
    sessions: Option<usize>,
    metadata: std::collections::HashMap<String, String>,
}

fn summarize(body: &Body) -> ImageSummary {
    let mut summary = ImageSummary {
        path: body.path.clone(),
        format: body.format_description().to_string(),
        sector_size: body.get_sector_size(),
        media_size: None,
        chunk_size: None,
        md5: None,
        sha1: None,
        acquisition_errors: None,
        sessions: None,
        metadata: std::collections::HashMap::new(),
    };
    if let BodyFormat::Ewf { image, .. } = &body.format {
        summary.media_size = Some(image.get_media_size());
        summary.chunk_size = Some(image.get_chunk_size());
        summary.md5 = image
            .get_hash_value("md5")
            .map(|b| b.iter().map(|x| format!("{x:02x}")).collect());
        summary.sha1 = image
            .get_hash_value("sha1")
            .map(|b| b.iter().map(|x| format!("{x:02x}")).collect());
        summary.acquisition_errors = Some(image.get_number_of_acquiry_errors());
        summary.sessions = Some(image.get_number_of_sessions());
        summary.metadata = image.header_metadata().clone();
    }
    summary
}

fn main() {
    env_logger::init();

    let matches = Command::new("exhume_body")
        .version("0.1.0")
        .author("ForensicXlab")
        .about("Reads logical media out of an EWF or RAW forensic disk image.")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_parser(clap::value_parser!(String))
                .required(true)
                .help("Path to one segment of the image (any .E0x/.L0x file, or a raw image)."),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["auto", "ewf", "raw"])
                .default_value("auto")
                .help("The image format: 'ewf', 'raw', or 'auto' to detect it."),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .long("size")
                .value_parser(clap::value_parser!(u64))
                .help("Number of bytes to read. Defaults to the rest of the media."),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .value_parser(clap::value_parser!(u64))
                .default_value("0")
                .help("Read starting at this byte offset."),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .action(ArgAction::SetTrue)
                .help("Print acquisition metadata and volume information, then exit."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .requires("info")
                .help("With --info, emit the summary as JSON instead of log lines."),
        )
        .arg(
            Arg::new("hash")
                .long("hash")
                .value_parser(["md5", "sha1"])
                .help("Print the stored acquisition hash value instead of reading media."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let file_path = matches.get_one::<String>("input").unwrap();
    let format = matches.get_one::<String>("format").unwrap();
    let offset = *matches.get_one::<u64>("offset").unwrap();
    let verbose = matches.get_flag("verbose");

    let mut body = Body::new(file_path.clone(), format);

    if verbose {
        info!(
            "Opened '{}' as {} ({} bytes/sector)",
            file_path,
            body.format_description(),
            body.get_sector_size()
        );
    }

    if matches.get_flag("info") {
        if matches.get_flag("json") {
            let summary = summarize(&body);
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(err) => {
                    error!("failed to serialize image summary: {err}");
                    std::process::exit(1);
                }
            }
        } else {
            body.print_info();
        }
        return;
    }

    if let Some(which) = matches.get_one::<String>("hash") {
        let BodyFormat::Ewf { image, .. } = &body.format else {
            error!("--hash is only meaningful for EWF images");
            std::process::exit(1);
        };
        match image.get_hash_value(which) {
            Some(digest) => {
                let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
                println!("{hex}");
            }
            None => {
                error!("no stored {which} hash in this image's digest/hash section");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(err) = body.seek(SeekFrom::Start(offset)) {
        error!("Error seeking to offset {offset}: {err}");
        std::process::exit(1);
    }

    let mut remaining = *matches.get_one::<u64>("size").unwrap_or(&u64::MAX);
    let mut chunk = [0u8; 64 * 1024];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        let n = match body.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                error!("read error: {err}");
                std::process::exit(1);
            }
        };
        if out.write_all(&chunk[..n]).is_err() {
            break;
        }
        remaining -= n as u64;
    }
}

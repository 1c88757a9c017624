//! On-disk artifact format for `SAVE`/`LOAD`/`ATTACH DATABASE`: a small
//! fixed header (magic bytes, format version, compression tag) followed by
//! a `bincode`-encoded, optionally compressed payload.
//!
//! Compression is pluggable per the `WITH COMPRESSION` clause: `gzip` via
//! `flate2`, `zstd`, `lz4` via `lz4_flex`, or `snap`. `none` writes the
//! `bincode` payload directly.

use crate::error::IoError;
use crate::parser::CompressionKind;
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"GRZY";
const FORMAT_VERSION: u8 = 1;

fn compression_tag(kind: CompressionKind) -> u8 {
    match kind {
        CompressionKind::None => 0,
        CompressionKind::Snappy => 1,
        CompressionKind::Gzip => 2,
        CompressionKind::Lz4 => 3,
        CompressionKind::Zstd => 4,
    }
}

fn compression_from_tag(tag: u8) -> Result<CompressionKind, IoError> {
    Ok(match tag {
        0 => CompressionKind::None,
        1 => CompressionKind::Snappy,
        2 => CompressionKind::Gzip,
        3 => CompressionKind::Lz4,
        4 => CompressionKind::Zstd,
        other => return Err(IoError::Artifact(format!("unknown compression tag {other}"))),
    })
}

/// Serializes `value` into the on-disk wire format: header, then the
/// `bincode` payload run through the codec named by `compression`.
pub fn serialize<T: Serialize>(value: &T, compression: CompressionKind) -> Result<Vec<u8>, IoError> {
    let payload = bincode::serialize(value).map_err(|e| IoError::Artifact(e.to_string()))?;
    let compressed = compress(&payload, compression)?;

    let mut out = Vec::with_capacity(compressed.len() + 6);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(compression_tag(compression));
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IoError> {
    if bytes.len() < 6 || &bytes[0..4] != MAGIC {
        return Err(IoError::InvalidFileFormat("missing Grizzly artifact header".to_string()));
    }
    let version = bytes[4];
    if version != FORMAT_VERSION {
        return Err(IoError::InvalidFileFormat(format!(
            "unsupported artifact format version {version}"
        )));
    }
    let compression = compression_from_tag(bytes[5])?;
    let payload = decompress(&bytes[6..], compression)?;
    bincode::deserialize(&payload).map_err(|e| IoError::Artifact(e.to_string()))
}

fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>, IoError> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::Gzip => {
            use flate2::write::GzEncoder;
            use flate2::Compression;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).map_err(|e| IoError::Artifact(e.to_string()))?;
            encoder.finish().map_err(|e| IoError::Artifact(e.to_string()))
        }
        CompressionKind::Zstd => {
            zstd::encode_all(data, 0).map_err(|e| IoError::Artifact(e.to_string()))
        }
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Snappy => {
            let mut encoder = snap::write::FrameEncoder::new(Vec::new());
            encoder.write_all(data).map_err(|e| IoError::Artifact(e.to_string()))?;
            encoder.into_inner().map_err(|e| IoError::Artifact(e.to_string()))
        }
    }
}

fn decompress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>, IoError> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::Gzip => {
            use flate2::read::GzDecoder;
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| IoError::Artifact(e.to_string()))?;
            Ok(out)
        }
        CompressionKind::Zstd => {
            zstd::decode_all(data).map_err(|e| IoError::Artifact(e.to_string()))
        }
        CompressionKind::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| IoError::Artifact(e.to_string())),
        CompressionKind::Snappy => {
            let mut decoder = snap::read::FrameDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| IoError::Artifact(e.to_string()))?;
            Ok(out)
        }
    }
}

/// Writes `bytes` to `path`, refusing to overwrite an existing file --
/// `SAVE` is not an implicit overwrite; callers that want to replace an
/// artifact remove it first.
pub fn write_new_file(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    if path.exists() {
        return Err(IoError::FileAlreadyExists(path.display().to_string()));
    }
    std::fs::write(path, bytes).map_err(|source| IoError::FailedToLoadFile {
        path: path.display().to_string(),
        source,
    })
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, IoError> {
    std::fs::read(path).map_err(|source| IoError::FailedToLoadFile {
        path: path.display().to_string(),
        source,
    })
}

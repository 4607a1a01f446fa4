//! Container file input
//!
//! Reads a container from disk with a size cap, sniffs its format, and finds
//! candidate containers in a directory.

use crate::utils::CertFileError;
use std::path::{Path, PathBuf};

/// Containers larger than this are rejected before parsing
pub const MAX_CONTAINER_BYTES: u64 = 10 * 1024 * 1024;

/// Detected input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Pem,
    Pkcs12,
    Unknown,
}

impl std::fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectedFormat::Pem => write!(f, "PEM"),
            DetectedFormat::Pkcs12 => write!(f, "PKCS#12"),
            DetectedFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Read a container file, refusing anything over `limit` bytes
pub fn read_container(path: &Path, limit: u64) -> Result<Vec<u8>, CertFileError> {
    let read_error = |e: std::io::Error| CertFileError::FileReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let size = std::fs::metadata(path).map_err(read_error)?.len();
    if size > limit {
        return Err(CertFileError::TooLarge {
            path: path.display().to_string(),
            size,
            limit,
        });
    }

    std::fs::read(path).map_err(read_error)
}

/// Guess the format from raw bytes
pub fn detect_format_from_bytes(data: &[u8]) -> DetectedFormat {
    if let Ok(text) = std::str::from_utf8(data) {
        if text.contains("-----BEGIN ") {
            return DetectedFormat::Pem;
        }
    }

    if data.len() > 4 && data[0] == 0x30 && is_likely_pkcs12(data) {
        return DetectedFormat::Pkcs12;
    }

    DetectedFormat::Unknown
}

/// Heuristic: a PFX carries the pkcs7-data OID within its first few elements.
fn is_likely_pkcs12(data: &[u8]) -> bool {
    // 06 09 2a 86 48 86 f7 0d 01 07 01
    let pkcs7_data_oid: [u8; 11] = [
        0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01,
    ];
    let search_len = data.len().min(50);
    data[..search_len]
        .windows(pkcs7_data_oid.len())
        .any(|w| w == pkcs7_data_oid)
}

/// List regular files in `dir` whose extension is one of `extensions`
/// (case-insensitive), sorted by file name.
pub fn discover_containers(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, CertFileError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CertFileError::FileReadError {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .collect();

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    tracing::debug!(dir = %dir.display(), count = found.len(), "discovered containers");
    Ok(found)
}

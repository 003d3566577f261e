//! CLI command implementations

pub mod admit;
pub mod check;
pub mod config;

pub use admit::AdmitCommand;
pub use check::CheckCommand;
pub use config::ConfigCommand;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use taleforge::config::TaleforgeConfig;
use taleforge::storage::{validate, MediaCandidate, UploadConstraints, ValidationError};

/// Service name used for configuration lookup and logs
pub const SERVICE_NAME: &str = "cli";

/// Leading bytes read from oversized files, enough for magic-number detection
const HEAD_BYTES: u64 = 8 * 1024;

/// A file picked for admission
pub enum Selection {
    /// The whole file, ready for the pipeline
    Candidate(MediaCandidate),
    /// Refused from its metadata and leading bytes without reading it all
    Refused {
        /// Declared or detected MIME type
        content_type: String,
        /// Size on disk
        size: u64,
        /// Why it was refused
        error: ValidationError,
    },
}

/// Load configuration from an explicit file or the standard locations
pub fn load_config(path: Option<&Path>) -> Result<TaleforgeConfig> {
    match path {
        Some(path) => {
            let path = path
                .to_str()
                .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;
            TaleforgeConfig::load_from(path)
                .with_context(|| format!("Failed to load configuration from {path}"))
        }
        None => TaleforgeConfig::load_for_service(SERVICE_NAME)
            .context("Failed to load configuration"),
    }
}

/// Read a file into a candidate, detecting its MIME type unless one is given
///
/// Files above `constraints.max_size_bytes` are never read in full: only their
/// leading bytes are checked, so a disallowed type still wins over the size.
pub fn read_candidate(
    file: &Path,
    mime: Option<&str>,
    constraints: &UploadConstraints,
) -> Result<Selection> {
    let size = std::fs::metadata(file)
        .with_context(|| format!("Failed to read {}", file.display()))?
        .len();

    if size > constraints.max_size_bytes {
        let head = read_head(file)?;
        let content_type = mime.map_or_else(|| detect_mime(file, &head), str::to_string);
        let header = MediaCandidate::new(content_type.clone(), head);
        let error = match validate(&header, constraints) {
            Err(error @ ValidationError::UnsupportedType { .. }) => error,
            _ => ValidationError::TooLarge {
                actual: size,
                limit: constraints.max_size_bytes,
            },
        };
        return Ok(Selection::Refused {
            content_type,
            size,
            error,
        });
    }

    let data =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let content_type = mime.map_or_else(|| detect_mime(file, &data), str::to_string);

    let candidate = MediaCandidate::new(content_type, data);
    Ok(Selection::Candidate(
        match file.file_name().and_then(|name| name.to_str()) {
            Some(name) => candidate.with_filename(name),
            None => candidate,
        },
    ))
}

fn read_head(file: &Path) -> Result<Vec<u8>> {
    let mut head = Vec::new();
    File::open(file)
        .and_then(|f| f.take(HEAD_BYTES).read_to_end(&mut head))
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(head)
}

/// Guess a MIME type from magic numbers, then from the file extension
///
/// Unknown files are reported as `application/octet-stream` so validation
/// rejects them with a clear message.
pub fn detect_mime(file: &Path, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}

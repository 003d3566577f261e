//! Local validation command

use super::{load_config, read_candidate, Selection};
use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taleforge::error::AdmissionError;
use taleforge::storage::{validate, UploadConstraints, ValidationError};

/// Validate an image against the configured upload constraints
///
/// Nothing is uploaded and the classifier is never called.
pub struct CheckCommand {
    file: PathBuf,
    mime: Option<String>,
}

impl CheckCommand {
    /// Create a new command instance
    pub const fn new(file: PathBuf, mime: Option<String>) -> Self {
        Self { file, mime }
    }

    /// Execute the command
    pub fn execute(&self, config: Option<&Path>) -> Result<ExitCode> {
        let constraints = load_config(config)?.upload_constraints();
        let report = self.check(&constraints)?;

        println!(
            "{} {} ({}, {} bytes)",
            style("Checking").cyan().bold(),
            style(self.file.display()).bold(),
            style(&report.content_type).dim(),
            report.size
        );

        match report.outcome {
            Ok(()) => {
                println!("{} passes local validation", style("✓").green().bold());
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => {
                println!("{} {}", style("✗").red().bold(), style(&error).red());
                println!(
                    "  {}",
                    style(AdmissionError::from(error).user_message()).dim()
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }

    fn check(&self, constraints: &UploadConstraints) -> Result<CheckReport> {
        Ok(
            match read_candidate(&self.file, self.mime.as_deref(), constraints)? {
                Selection::Candidate(candidate) => CheckReport {
                    outcome: validate(&candidate, constraints),
                    size: candidate.size(),
                    content_type: candidate.content_type,
                },
                Selection::Refused {
                    content_type,
                    size,
                    error,
                } => CheckReport {
                    content_type,
                    size,
                    outcome: Err(error),
                },
            },
        )
    }
}

struct CheckReport {
    content_type: String,
    size: u64,
    outcome: Result<(), ValidationError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn write_png(dir: &Path, size: usize) -> PathBuf {
        let mut data = PNG_MAGIC.to_vec();
        data.resize(size, 0);
        let path = dir.join("avatar.png");
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_check_accepts_small_png() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CheckCommand::new(write_png(dir.path(), 1024), None);

        let report = cmd.check(&UploadConstraints::default()).unwrap();
        assert_eq!(report.content_type, "image/png");
        assert_eq!(report.size, 1024);
        assert!(report.outcome.is_ok());
    }

    #[test]
    fn test_check_reports_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CheckCommand::new(write_png(dir.path(), 2048), None);
        let constraints = UploadConstraints::default().max_size_bytes(1024);

        let report = cmd.check(&constraints).unwrap();
        assert_eq!(
            report.outcome,
            Err(ValidationError::TooLarge {
                actual: 2048,
                limit: 1024
            })
        );
    }

    #[test]
    fn test_check_honours_declared_type() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CheckCommand::new(write_png(dir.path(), 64), Some("image/svg+xml".into()));

        let report = cmd.check(&UploadConstraints::default()).unwrap();
        assert!(matches!(
            report.outcome,
            Err(ValidationError::UnsupportedType { .. })
        ));
    }
}

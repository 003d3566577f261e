//! Full admission command

use super::{load_config, read_candidate, Selection};
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use taleforge::admission::{AdmissionPipeline, AdmissionResult, AdmissionState, SqlProfileStore};
use taleforge::config::TaleforgeConfig;
use taleforge::moderation::HttpClassifier;
use taleforge::storage::{DisplayResolver, DisplayUrl};

const DISPLAY_SLOT: &str = "avatar";

/// Run one image through the configured pipeline for an owner
pub struct AdmitCommand {
    file: PathBuf,
    owner: String,
    mime: Option<String>,
    create_owner: bool,
}

/// What an admission run produced
struct AdmitReport {
    result: AdmissionResult,
    display_url: Option<DisplayUrl>,
}

impl AdmitCommand {
    /// Create a new command instance
    pub const fn new(file: PathBuf, owner: String, mime: Option<String>, create_owner: bool) -> Self {
        Self {
            file,
            owner,
            mime,
            create_owner,
        }
    }

    /// Execute the command
    pub async fn execute(&self, config: Option<&Path>) -> Result<ExitCode> {
        let config = load_config(config)?;

        println!(
            "{} {} {} {}",
            style("Admitting").cyan().bold(),
            style(self.file.display()).bold(),
            style("for").cyan(),
            style(&self.owner).green().bold()
        );

        let report = self.run(&config).await?;
        Ok(Self::print(&report))
    }

    async fn run(&self, config: &TaleforgeConfig) -> Result<AdmitReport> {
        let candidate =
            match read_candidate(&self.file, self.mime.as_deref(), &config.upload_constraints())? {
                Selection::Candidate(candidate) => candidate,
                Selection::Refused { error, .. } => {
                    return Ok(AdmitReport {
                        result: AdmissionResult::Failed {
                            error: error.into(),
                            state: AdmissionState::Selected,
                        },
                        display_url: None,
                    });
                }
            };

        let profiles = SqlProfileStore::connect(&config.persistence.database_url)
            .await
            .context("Failed to open profile database")?;
        profiles.ensure_schema().await?;
        if self.create_owner {
            profiles.insert_profile(&self.owner).await?;
        }

        let storage = config
            .storage_gateway()
            .context("Failed to set up storage backend")?;
        let classifier = HttpClassifier::new(config.classifier_config())
            .context("Failed to set up classification client")?;
        let resolver = DisplayResolver::new(Arc::clone(&storage));

        let pipeline = AdmissionPipeline::new(storage, Arc::new(classifier), Arc::new(profiles))
            .with_constraints(config.upload_constraints())
            .with_policy(config.decision_policy()?);

        let result = pipeline.admit(candidate, &self.owner).await;

        // The object is committed either way; a failed lookup only loses the preview.
        let display_url = match &result {
            AdmissionResult::Admitted {
                storage_reference, ..
            } => resolver
                .resolve(DISPLAY_SLOT, storage_reference)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "display URL lookup failed");
                    None
                }),
            _ => None,
        };

        Ok(AdmitReport {
            result,
            display_url,
        })
    }

    fn print(report: &AdmitReport) -> ExitCode {
        match &report.result {
            AdmissionResult::Admitted {
                storage_reference,
                confidence,
            } => {
                println!("{} admitted", style("✓").green().bold());
                println!("  reference:  {}", style(storage_reference).yellow());
                println!("  confidence: {confidence:.3}");
                if let Some(url) = &report.display_url {
                    println!("  display:    {}", style(url).cyan());
                }
                ExitCode::SUCCESS
            }
            AdmissionResult::Rejected {
                violated_categories,
                confidence,
            } => {
                let categories: Vec<_> = violated_categories.iter().map(|c| c.as_str()).collect();
                println!("{} rejected", style("✗").red().bold());
                println!("  flagged:    {}", style(categories.join(", ")).red());
                println!("  confidence: {confidence:.3}");
                println!("  {}", style(report.result.user_message()).dim());
                ExitCode::FAILURE
            }
            AdmissionResult::Failed { error, state } => {
                println!(
                    "{} failed after {} ({})",
                    style("✗").red().bold(),
                    style(state).yellow(),
                    style(error.kind()).bold()
                );
                println!("  {}", style(error).red());
                if error.is_retryable() {
                    println!("  {}", style("This failure is transient; retrying may succeed.").dim());
                }
                ExitCode::FAILURE
            }
        }
    }
}

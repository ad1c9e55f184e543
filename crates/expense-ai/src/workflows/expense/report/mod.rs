mod narrative;
mod summary;
mod tabular;

pub use summary::{CategoryTotal, ReportSummary, ViolationCount};

use super::domain::{ArtifactLocation, Receipt, SubmissionMetadata};
use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Locations of the two artifacts produced for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub tabular: ArtifactLocation,
    pub narrative: ArtifactLocation,
}

impl ReportArtifacts {
    pub fn into_vec(self) -> Vec<ArtifactLocation> {
        vec![self.tabular, self.narrative]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unable to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to render spreadsheet: {0}")]
    Csv(#[from] csv::Error),
    #[error("unable to render report: {0}")]
    Render(String),
}

/// Renders the compliant and non-compliant partitions into report artifacts.
pub trait ReportBuilder: Send + Sync {
    fn build(
        &self,
        compliant: &[Receipt],
        non_compliant: &[Receipt],
        metadata: &SubmissionMetadata,
    ) -> impl Future<Output = Result<ReportArtifacts, ReportError>> + Send;
}

/// Writes a CSV spreadsheet and a PDF summary into an output directory.
#[derive(Debug, Clone)]
pub struct FileReportBuilder {
    output_dir: PathBuf,
}

impl FileReportBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn build_at(
        &self,
        compliant: &[Receipt],
        non_compliant: &[Receipt],
        metadata: &SubmissionMetadata,
        generated_at: NaiveDateTime,
    ) -> Result<ReportArtifacts, ReportError> {
        let summary = ReportSummary::build(
            compliant,
            non_compliant,
            metadata,
            generated_at.format("%Y-%m-%d").to_string(),
        );
        let csv = tabular::render_csv(&summary, compliant, non_compliant)?;
        let pdf = narrative::render_pdf(&narrative::layout(&summary, compliant, non_compliant))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| io_error(&self.output_dir, source))?;

        let stem = format!("{}_expense_report", generated_at.format("%Y%m%d-%H%M%S"));
        let tabular_path = self.output_dir.join(format!("{stem}.csv"));
        let narrative_path = self.output_dir.join(format!("{stem}.pdf"));

        tokio::fs::write(&tabular_path, csv)
            .await
            .map_err(|source| io_error(&tabular_path, source))?;
        if let Err(source) = tokio::fs::write(&narrative_path, pdf).await {
            // artifacts are only ever published as a pair
            if let Err(err) = tokio::fs::remove_file(&tabular_path).await {
                warn!(path = %tabular_path.display(), error = %err, "unable to remove partial report");
            }
            return Err(io_error(&narrative_path, source));
        }

        info!(
            compliant = compliant.len(),
            non_compliant = non_compliant.len(),
            tabular = %tabular_path.display(),
            "report written"
        );

        Ok(ReportArtifacts {
            tabular: ArtifactLocation(tabular_path),
            narrative: ArtifactLocation(narrative_path),
        })
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl ReportBuilder for FileReportBuilder {
    async fn build(
        &self,
        compliant: &[Receipt],
        non_compliant: &[Receipt],
        metadata: &SubmissionMetadata,
    ) -> Result<ReportArtifacts, ReportError> {
        self.build_at(compliant, non_compliant, metadata, Local::now().naive_local())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 14)
            .and_then(|date| date.and_hms_opt(9, 30, 5))
            .expect("valid timestamp")
    }

    #[tokio::test]
    async fn writes_timestamped_artifact_pair() {
        let dir = tempfile::tempdir().expect("temp dir");
        let builder = FileReportBuilder::new(dir.path().join("reports"));

        let artifacts = builder
            .build_at(&[], &[], &SubmissionMetadata::default(), generated_at())
            .await
            .expect("report builds");

        assert_eq!(
            artifacts.tabular.file_name(),
            "20250714-093005_expense_report.csv"
        );
        assert_eq!(
            artifacts.narrative.file_name(),
            "20250714-093005_expense_report.pdf"
        );
        assert!(artifacts.tabular.path().exists());
        assert!(artifacts.narrative.path().exists());
    }

    #[tokio::test]
    async fn unwritable_output_dir_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").expect("write blocker");

        let result = FileReportBuilder::new(&blocker)
            .build_at(&[], &[], &SubmissionMetadata::default(), generated_at())
            .await;
        assert!(matches!(result, Err(ReportError::Io { .. })));
    }
}

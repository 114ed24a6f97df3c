use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::classify::{Classification, ParagraphRole};
use super::page_number::InjectOutcome;
use super::sections::ResetOutcome;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarginsJson {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

/// What one formatting run did to a document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormatReport {
    pub version: u32,
    pub input_sha256: String,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub reset: ResetOutcome,
    /// Paragraph indices in the document as uploaded.
    pub ghost_lines_removed: Vec<usize>,
    pub margins: MarginsJson,
    pub classification: Classification,
    pub page_numbers: InjectOutcome,
}

impl FormatReport {
    pub fn headings(&self) -> usize {
        self.classification
            .count(|r| matches!(r, ParagraphRole::MajorHeading { .. }))
    }

    /// One-line human summary for the console.
    pub fn summary(&self) -> String {
        format!(
            "ghost_lines={} headings={} chapter_titles={} subheadings={} body={} sections_linked={}",
            self.ghost_lines_removed.len(),
            self.headings(),
            self.classification
                .count(|r| *r == ParagraphRole::ChapterTitle),
            self.classification
                .count(|r| *r == ParagraphRole::SubHeading),
            self.classification.count(|r| *r == ParagraphRole::Body),
            self.page_numbers.sections_linked,
        )
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn write_report_json(report: &FormatReport, path: &Path) -> anyhow::Result<()> {
    fs::write(
        path,
        serde_json::to_vec_pretty(report).context("serialize report json")?,
    )
    .with_context(|| format!("write report json: {}", path.display()))?;
    Ok(())
}

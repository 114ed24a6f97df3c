pub mod classify;
pub mod ghost;
pub mod page_number;
pub mod report;
pub mod sections;

use crate::config::FormatterConfig;
use crate::docx::parts::WordDocument;
use crate::progress::ConsoleProgress;

use report::{FormatReport, MarginsJson};

const STAGES: usize = 5;

pub struct Formatted {
    pub bytes: Vec<u8>,
    pub report: FormatReport,
}

/// The reformatting pipeline over one document package. Holds no state
/// between calls; every call opens its own document.
pub struct Formatter<'a> {
    cfg: &'a FormatterConfig,
    progress: &'a ConsoleProgress,
}

impl<'a> Formatter<'a> {
    pub fn new(cfg: &'a FormatterConfig, progress: &'a ConsoleProgress) -> Self {
        Self { cfg, progress }
    }

    pub fn format_bytes(&self, input: &[u8]) -> anyhow::Result<Formatted> {
        let mut word = WordDocument::from_bytes(input, &self.cfg.inflate_guard())?;
        let p = self.progress;

        let reset = sections::reset_sections(&mut word);
        p.stage(
            1,
            STAGES,
            "Section reset",
            format!(
                "headers={} footers={} footer_parts={}",
                reset.header_refs_removed, reset.footer_refs_removed, reset.footers_cleared
            ),
        );

        let ghost_lines_removed = ghost::prune_ghost_lines(word.document_mut());
        p.stage(
            2,
            STAGES,
            "Ghost lines",
            format!("removed {}", ghost_lines_removed.len()),
        );

        let margins = self.cfg.margins();
        sections::install_margins(&mut word, margins);
        p.stage(
            3,
            STAGES,
            "Margins",
            format!(
                "left={} right={} top={} bottom={}",
                margins.left, margins.right, margins.top, margins.bottom
            ),
        );

        let classification =
            classify::classify_and_style(word.document_mut(), &self.cfg.typography);
        p.stage(
            4,
            STAGES,
            "Classify",
            format!(
                "start={} paragraphs={}",
                classification.start_index,
                classification.paragraphs.len()
            ),
        );

        let page_numbers =
            page_number::inject_page_numbers(&mut word, &self.cfg.page_number.fallback_text)?;
        p.stage(
            5,
            STAGES,
            "Page numbers",
            format!(
                "{} ({}) linked to {} section(s)",
                page_numbers.footer_part, page_numbers.footer_rel_id, page_numbers.sections_linked
            ),
        );

        let bytes = word.to_bytes()?;
        let report = FormatReport {
            version: 1,
            input_sha256: report::sha256_hex(input),
            input_bytes: input.len(),
            output_bytes: bytes.len(),
            reset,
            ghost_lines_removed,
            margins: MarginsJson {
                left: margins.left,
                right: margins.right,
                top: margins.top,
                bottom: margins.bottom,
            },
            classification,
            page_numbers,
        };
        Ok(Formatted { bytes, report })
    }
}

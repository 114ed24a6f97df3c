use serde::Serialize;

use crate::config::TypographySection;
use crate::docx::model::{Alignment, Document, LineSpacing, Paragraph};
use crate::textutil::{
    heading_keyword, is_blank, is_heading, is_numbered_subheading, preview, HeadingKeyword,
};

/// Scanner state carried from one paragraph to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Scanning,
    /// The previous non-blank paragraph was a chapter heading; the next one is
    /// its title line.
    ExpectingChapterTitle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ParagraphRole {
    Blank,
    MajorHeading { keyword: HeadingKeyword },
    ChapterTitle,
    SubHeading,
    Body,
}

impl ScanState {
    /// Classifies one paragraph and returns the state for the next.
    pub fn classify(self, text: &str) -> (ParagraphRole, ScanState) {
        if is_blank(text) {
            return (ParagraphRole::Blank, Self::Scanning);
        }
        if let Some(keyword) = heading_keyword(text) {
            let next = if keyword.is_chapter() {
                Self::ExpectingChapterTitle
            } else {
                Self::Scanning
            };
            return (ParagraphRole::MajorHeading { keyword }, next);
        }
        if self == Self::ExpectingChapterTitle {
            return (ParagraphRole::ChapterTitle, Self::Scanning);
        }
        if is_numbered_subheading(text) {
            return (ParagraphRole::SubHeading, Self::Scanning);
        }
        (ParagraphRole::Body, Self::Scanning)
    }
}

/// Index of the first heading paragraph; front matter before it is left as is.
pub fn start_index(texts: &[String]) -> usize {
    texts.iter().position(|t| is_heading(t)).unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassifiedParagraph {
    pub index: usize,
    #[serde(flatten)]
    pub role: ParagraphRole,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Classification {
    pub start_index: usize,
    pub paragraphs: Vec<ClassifiedParagraph>,
}

impl Classification {
    pub fn count(&self, pred: impl Fn(&ParagraphRole) -> bool) -> usize {
        self.paragraphs.iter().filter(|p| pred(&p.role)).count()
    }
}

fn apply_font(p: &mut Paragraph, typo: &TypographySection, bold: bool, size_pt: u32) {
    for run in p.runs_mut() {
        run.set_font_family(&typo.font_family);
        run.set_font_size_pt(size_pt);
        run.set_bold(bold);
    }
}

/// Walks the body paragraphs from the first heading on, classifying each and
/// rewriting its presentation.
pub fn classify_and_style(doc: &mut Document, typo: &TypographySection) -> Classification {
    let texts = doc.paragraph_texts();
    let start = start_index(&texts);
    let mut paras = doc.paragraphs_mut();
    let mut state = ScanState::default();
    let mut out = Classification {
        start_index: start,
        paragraphs: Vec::with_capacity(paras.len().saturating_sub(start)),
    };

    for i in start..paras.len() {
        paras[i].set_line_spacing(LineSpacing::auto(typo.line_spacing));

        let text = paras[i].text();
        let (role, next) = state.classify(&text);
        state = next;

        match role {
            ParagraphRole::Blank => {}
            ParagraphRole::MajorHeading { .. } => {
                paras[i].strip_manual_breaks();
                if i > 0 {
                    let prev = &mut paras[i - 1];
                    prev.strip_manual_breaks();
                    prev.set_page_break_before(false);
                }
                let p = &mut paras[i];
                p.set_alignment(Alignment::Center);
                p.set_style(&typo.heading1_style);
                p.set_page_break_before(true);
                apply_font(p, typo, true, typo.heading_size_pt);
            }
            ParagraphRole::ChapterTitle => {
                let p = &mut paras[i];
                p.set_alignment(Alignment::Center);
                p.set_style(&typo.heading1_style);
                p.set_page_break_before(false);
                apply_font(p, typo, true, typo.heading_size_pt);
            }
            ParagraphRole::SubHeading => {
                let p = &mut paras[i];
                p.set_alignment(Alignment::Justify);
                p.set_style(&typo.heading2_style);
                p.set_page_break_before(false);
                apply_font(p, typo, true, typo.body_size_pt);
            }
            ParagraphRole::Body => {
                let p = &mut paras[i];
                p.set_alignment(Alignment::Justify);
                p.set_page_break_before(false);
                apply_font(p, typo, false, typo.body_size_pt);
            }
        }

        out.paragraphs.push(ClassifiedParagraph {
            index: i,
            role,
            text: preview(&text, 80),
        });
    }
    out
}

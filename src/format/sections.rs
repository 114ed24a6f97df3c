use serde::Serialize;

use crate::docx::model::{PageMargins, SectionProperties};
use crate::docx::parts::WordDocument;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    /// Whether the document had a body-level section block to clear.
    pub body_section: bool,
    pub header_refs_removed: usize,
    pub footer_refs_removed: usize,
    pub footers_cleared: usize,
}

/// Unbinds headers and footers from the body section and empties every footer
/// part already in the package. Paragraph-embedded sections keep their
/// references until the page-number injector relinks them.
pub fn reset_sections(word: &mut WordDocument) -> ResetOutcome {
    let mut out = ResetOutcome::default();
    if let Some(sect) = word.document_mut().body_section_mut() {
        out.body_section = true;
        out.footer_refs_removed = sect.clear_footer_refs();
        out.header_refs_removed = sect.clear_header_refs();
    }
    for footer in word.footers_mut() {
        footer.clear();
        out.footers_cleared += 1;
    }
    out
}

/// Appends a fresh body-level section block carrying `margins`. An existing
/// block is left in place, so the body may end up with two.
pub fn install_margins(word: &mut WordDocument, margins: PageMargins) {
    let mut sect = SectionProperties::new();
    sect.set_margins(margins);
    word.document_mut().push_section(sect);
}

use crate::docx::model::Document;
use crate::textutil::{is_blank, is_heading};

/// Paragraph indices (pre-removal numbering) of blank paragraphs sitting
/// directly above a heading, in ascending order. Only the text counts: a blank
/// paragraph carrying a section break goes like any other.
pub fn find_ghost_lines(doc: &Document) -> Vec<usize> {
    let paras: Vec<_> = doc.paragraphs().collect();
    let mut doomed: Vec<usize> = Vec::new();
    for i in (0..paras.len()).rev() {
        if !is_heading(&paras[i].text()) {
            continue;
        }
        let mut j = i;
        while j > 0 {
            let prev = paras[j - 1];
            if !is_blank(&prev.text()) {
                break;
            }
            doomed.push(j - 1);
            j -= 1;
        }
    }
    doomed.sort_unstable();
    doomed
}

/// Deletes ghost lines back-to-front so pending indices stay valid.
/// Returns the removed paragraph indices.
pub fn prune_ghost_lines(doc: &mut Document) -> Vec<usize> {
    let doomed = find_ghost_lines(doc);
    let mut blocks: Vec<usize> = doomed
        .iter()
        .filter_map(|&p| doc.block_index_of_paragraph(p))
        .collect();
    blocks.sort_unstable_by(|a, b| b.cmp(a));
    for block in blocks {
        doc.remove_block(block);
    }
    doomed
}

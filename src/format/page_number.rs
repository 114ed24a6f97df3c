use serde::Serialize;

use crate::docx::model::{Alignment, FieldCharType, HdrFtrType, Paragraph, Run, SectionProperties};
use crate::docx::parts::WordDocument;

/// Field instruction evaluated by the consumer to the current page number.
pub const PAGE_INSTRUCTION: &str = " PAGE ";

/// A centered paragraph holding one complete PAGE field: begin, instruction,
/// separate, cached result, end. The five runs are always emitted together and
/// in this order; a consumer that sees them out of order shows the raw field.
pub fn build_page_number_field(fallback_text: &str) -> Paragraph {
    let mut p = Paragraph::new();
    p.set_alignment(Alignment::Center);
    p.push_run(Run::field_char(FieldCharType::Begin));
    p.push_run(Run::instr_text(PAGE_INSTRUCTION));
    p.push_run(Run::field_char(FieldCharType::Separate));
    p.push_run(Run::with_text(fallback_text));
    p.push_run(Run::field_char(FieldCharType::End));
    p
}

/// Makes `rel_id` the only footer of `sect`, shown on every page.
pub fn link_footer(sect: &mut SectionProperties, rel_id: &str) {
    sect.clear_title_page();
    sect.clear_footer_refs();
    sect.set_footer_ref(HdrFtrType::Default, rel_id);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InjectOutcome {
    pub footer_part: String,
    pub footer_rel_id: String,
    pub sections_linked: usize,
}

/// Creates the page-number footer and binds it to every section block of the
/// document, body-level and paragraph-embedded alike.
pub fn inject_page_numbers(
    word: &mut WordDocument,
    fallback_text: &str,
) -> anyhow::Result<InjectOutcome> {
    let (footer_part, footer_rel_id) = {
        let footer = word.create_footer()?;
        footer.push_paragraph(build_page_number_field(fallback_text));
        (footer.part_name().to_string(), footer.rel_id().to_string())
    };

    let doc = word.document_mut();
    if doc.body_sections().next().is_none() {
        doc.push_section(SectionProperties::new());
    }
    let mut sections_linked = 0usize;
    for sect in doc.sections_mut() {
        link_footer(sect, &footer_rel_id);
        sections_linked += 1;
    }

    Ok(InjectOutcome {
        footer_part,
        footer_rel_id,
        sections_linked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::model::tests::document_xml;
    use crate::docx::model::Document;
    use crate::docx::package::InflateGuard;
    use crate::docx::parts::tests::docx_with_body;
    use crate::docx::parts::FOOTER_CONTENT_TYPE;

    fn open(body: &str) -> WordDocument {
        WordDocument::from_bytes(&docx_with_body(body), &InflateGuard::default()).expect("open")
    }

    fn assert_page_field(p: &Paragraph, fallback: &str) {
        let runs = p.runs();
        assert_eq!(runs.len(), 5);
        assert_eq!(runs[0].field_char_type(), Some(FieldCharType::Begin));
        assert_eq!(runs[1].instruction().as_deref(), Some(PAGE_INSTRUCTION));
        assert_eq!(runs[2].field_char_type(), Some(FieldCharType::Separate));
        assert_eq!(runs[3].text(), fallback);
        assert_eq!(runs[3].field_char_type(), None);
        assert_eq!(runs[4].field_char_type(), Some(FieldCharType::End));
        assert_eq!(p.alignment(), Some(Alignment::Center));
    }

    #[test]
    fn field_has_five_runs_in_order() {
        let p = build_page_number_field("1");
        assert_page_field(&p, "1");
        // The instruction is not part of the visible text.
        assert_eq!(p.text(), "1");
    }

    #[test]
    fn field_survives_serialization() {
        let p = Paragraph::from_element(build_page_number_field("7").to_element());
        assert_page_field(&p, "7");
    }

    #[test]
    fn link_replaces_footers_and_title_page() {
        let xml = document_xml(
            r#"<w:sectPr><w:footerReference w:type="default" r:id="rId2"/><w:footerReference w:type="first" r:id="rId3"/><w:titlePg/></w:sectPr>"#,
        );
        let doc = Document::parse("word/document.xml", xml.as_bytes()).expect("parse");
        let mut sect = doc.sections()[0].clone();
        assert!(sect.title_page());
        link_footer(&mut sect, "rId9");
        assert!(!sect.title_page());
        let refs = sect.footer_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, HdrFtrType::Default);
        assert_eq!(refs[0].rel_id, "rId9");
    }

    #[test]
    fn every_section_gets_exactly_one_default_footer() {
        let body = concat!(
            r#"<w:p><w:pPr><w:sectPr><w:footerReference w:type="default" r:id="rId7"/><w:footerReference w:type="even" r:id="rId7"/><w:titlePg/></w:sectPr></w:pPr><w:r><w:t>One</w:t></w:r></w:p>"#,
            r#"<w:p><w:pPr><w:sectPr/></w:pPr><w:r><w:t>Two</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Three</w:t></w:r></w:p>"#,
            r#"<w:sectPr><w:footerReference w:type="default" r:id="rId7"/></w:sectPr>"#,
            r#"<w:sectPr><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="2160"/></w:sectPr>"#,
        );
        let mut word = open(body);
        let out = inject_page_numbers(&mut word, "1").expect("inject");
        assert_eq!(out.sections_linked, 4);
        assert_eq!(out.footer_part, "word/footer2.xml");

        let sections = word.document().sections();
        assert_eq!(sections.len(), 4);
        for sect in sections {
            let refs = sect.footer_refs();
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].kind, HdrFtrType::Default);
            assert_eq!(refs[0].rel_id, out.footer_rel_id);
            assert!(!sect.title_page());
        }

        let footer = word.footer_by_rel(&out.footer_rel_id).expect("new footer");
        let paras = footer.paragraphs();
        assert_eq!(paras.len(), 1);
        assert_page_field(&paras[0], "1");
        assert_eq!(
            word.content_type_of(&out.footer_part).as_deref(),
            Some(FOOTER_CONTENT_TYPE)
        );
    }

    #[test]
    fn missing_body_section_is_created() {
        let mut word = open(r#"<w:p><w:r><w:t>Only text</w:t></w:r></w:p>"#);
        let out = inject_page_numbers(&mut word, "i").expect("inject");
        assert_eq!(out.sections_linked, 1);
        let body: Vec<_> = word.document().body_sections().collect();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].footer_refs()[0].rel_id, out.footer_rel_id);
        let footer = word.footer_by_rel(&out.footer_rel_id).expect("footer");
        assert_page_field(&footer.paragraphs()[0], "i");
    }
}

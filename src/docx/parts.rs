use std::collections::HashMap;

use anyhow::{anyhow, Context};

use crate::docx::model::{Document, Paragraph, R_NS, W_NS};
use crate::docx::package::{DocxPackage, InflateGuard};
use crate::docx::tree::{XmlElement, XmlNode, XmlTree};
use crate::docx::xml::{read_tree, write_tree};

pub const FOOTER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const FOOTER_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

fn parse_tree(name: &str, bytes: &[u8]) -> anyhow::Result<XmlTree> {
    read_tree(name, bytes).with_context(|| format!("parse xml: {name}"))
}

fn tree_bytes(tree: &XmlTree) -> anyhow::Result<Vec<u8>> {
    write_tree(tree).with_context(|| format!("serialize xml: {}", tree.name))
}

fn split_part_name(part_name: &str) -> (&str, &str) {
    match part_name.rfind('/') {
        Some(pos) => (&part_name[..pos], &part_name[pos + 1..]),
        None => ("", part_name),
    }
}

/// Name of the relationships part belonging to `part_name`.
pub fn rels_part_name(part_name: &str) -> String {
    let (dir, file) = split_part_name(part_name);
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Resolves a relationship target against the directory of its source part.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{base_dir}/{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

pub struct Relationships {
    tree: XmlTree,
}

impl Relationships {
    pub fn parse(name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            tree: parse_tree(name, bytes)?,
        })
    }

    pub fn empty(name: &str) -> Self {
        Self {
            tree: XmlTree::new(
                name,
                XmlElement::new("Relationships").with_attr("xmlns", RELS_NS),
            ),
        }
    }

    pub fn list(&self) -> Vec<Relationship> {
        self.tree
            .root
            .elements()
            .filter(|el| el.name == "Relationship")
            .filter_map(|el| {
                Some(Relationship {
                    id: el.attr("Id")?.into_owned(),
                    rel_type: el.attr("Type")?.into_owned(),
                    target: el.attr("Target")?.into_owned(),
                    external: el.attr("TargetMode").as_deref() == Some("External"),
                })
            })
            .collect()
    }

    pub fn next_id(&self) -> String {
        let rels = self.list();
        let max = rels
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let mut n = max + 1;
        loop {
            let id = format!("rId{n}");
            if !rels.iter().any(|r| r.id == id) {
                return id;
            }
            n += 1;
        }
    }

    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = self.next_id();
        self.tree.root.children.push(XmlNode::Element(
            XmlElement::new("Relationship")
                .with_attr("Id", &id)
                .with_attr("Type", rel_type)
                .with_attr("Target", target),
        ));
        id
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        tree_bytes(&self.tree)
    }
}

pub struct ContentTypes {
    tree: XmlTree,
}

impl ContentTypes {
    fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            tree: parse_tree(CONTENT_TYPES_PART, bytes)?,
        })
    }

    fn empty() -> Self {
        Self {
            tree: XmlTree::new(
                CONTENT_TYPES_PART,
                XmlElement::new("Types").with_attr("xmlns", CONTENT_TYPES_NS),
            ),
        }
    }

    pub fn override_for(&self, part_name: &str) -> Option<String> {
        let wanted = format!("/{part_name}");
        self.tree
            .root
            .elements()
            .filter(|el| el.name == "Override")
            .find(|el| el.attr("PartName").as_deref() == Some(wanted.as_str()))
            .and_then(|el| el.attr("ContentType"))
            .map(|v| v.into_owned())
    }

    pub fn set_override(&mut self, part_name: &str, content_type: &str) {
        let wanted = format!("/{part_name}");
        self.tree.root.children.retain(|n| {
            !matches!(n, XmlNode::Element(el)
                if el.name == "Override" && el.attr("PartName").as_deref() == Some(wanted.as_str()))
        });
        self.tree.root.children.push(XmlNode::Element(
            XmlElement::new("Override")
                .with_attr("PartName", &wanted)
                .with_attr("ContentType", content_type),
        ));
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        tree_bytes(&self.tree)
    }
}

/// A footer part (`w:ftr`) together with the relationship that binds it.
pub struct Footer {
    rel_id: String,
    tree: XmlTree,
}

impl Footer {
    fn new(part_name: &str, rel_id: String, w_ns: &str, r_ns: &str) -> Self {
        let root = XmlElement::new("w:ftr")
            .with_attr("xmlns:w", w_ns)
            .with_attr("xmlns:r", r_ns);
        Self {
            rel_id,
            tree: XmlTree::new(part_name, root),
        }
    }

    pub fn part_name(&self) -> &str {
        &self.tree.name
    }

    pub fn rel_id(&self) -> &str {
        &self.rel_id
    }

    pub fn paragraphs(&self) -> Vec<Paragraph> {
        self.tree
            .root
            .elements()
            .filter(|el| el.name == "w:p")
            .cloned()
            .map(Paragraph::from_element)
            .collect()
    }

    pub fn push_paragraph(&mut self, paragraph: Paragraph) {
        self.tree
            .root
            .children
            .push(XmlNode::Element(paragraph.to_element()));
    }

    /// Drops all block content and leaves one empty paragraph, the least a
    /// footer part may hold. Returns the number of paragraphs removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.tree.root.remove_children("w:p");
        self.tree.root.remove_children("w:tbl");
        self.tree.root.remove_children("w:sdt");
        self.push_paragraph(Paragraph::new());
        removed
    }

    fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        tree_bytes(&self.tree)
    }
}

/// An opened word-processing package: the typed main document plus the
/// parts the reformatter touches (relationships, content types, footers).
pub struct WordDocument {
    package: DocxPackage,
    document: Document,
    rels_part: String,
    rels: Relationships,
    content_types: ContentTypes,
    footers: Vec<Footer>,
}

impl WordDocument {
    pub fn from_bytes(bytes: &[u8], guard: &InflateGuard) -> anyhow::Result<Self> {
        Self::open(DocxPackage::from_bytes(bytes, guard)?)
    }

    pub fn open(package: DocxPackage) -> anyhow::Result<Self> {
        let main_part = main_part_name(&package)?;
        let main = package
            .get(&main_part)
            .with_context(|| format!("missing main document part: {main_part}"))?;
        let document = Document::from_tree(parse_tree(&main_part, &main.data)?)?;

        let rels_part = rels_part_name(&main_part);
        let rels = match package.get(&rels_part) {
            Some(ent) => Relationships::parse(&rels_part, &ent.data)?,
            None => Relationships::empty(&rels_part),
        };

        let content_types = match package.get(CONTENT_TYPES_PART) {
            Some(ent) => ContentTypes::parse(&ent.data)?,
            None => ContentTypes::empty(),
        };

        let (base_dir, _) = split_part_name(&main_part);
        let mut footers = Vec::new();
        for rel in rels.list() {
            if rel.external || !rel.rel_type.ends_with("/footer") {
                continue;
            }
            let part_name = resolve_target(base_dir, &rel.target);
            let Some(ent) = package.get(&part_name) else {
                continue;
            };
            footers.push(Footer {
                rel_id: rel.id,
                tree: parse_tree(&part_name, &ent.data)?,
            });
        }

        Ok(Self {
            package,
            document,
            rels_part,
            rels,
            content_types,
            footers,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn footers(&self) -> &[Footer] {
        &self.footers
    }

    pub fn footers_mut(&mut self) -> &mut [Footer] {
        &mut self.footers
    }

    pub fn footer_by_rel(&self, rel_id: &str) -> Option<&Footer> {
        self.footers.iter().find(|f| f.rel_id == rel_id)
    }

    #[cfg(test)]
    pub fn relationships(&self) -> Vec<Relationship> {
        self.rels.list()
    }

    pub fn content_type_of(&self, part_name: &str) -> Option<String> {
        self.content_types.override_for(part_name)
    }

    /// Adds an empty footer part, registers its relationship and content type,
    /// and returns it. The relationship id is what section blocks reference.
    pub fn create_footer(&mut self) -> anyhow::Result<&mut Footer> {
        let main_part = self.document.part_name().to_string();
        let (base_dir, _) = split_part_name(&main_part);

        let mut n = 1usize;
        let (part_name, target) = loop {
            let target = format!("footer{n}.xml");
            let part_name = resolve_target(base_dir, &target);
            let taken = self.package.contains(&part_name)
                || self.footers.iter().any(|f| f.part_name() == part_name);
            if !taken {
                break (part_name, target);
            }
            n += 1;
        };

        let rel_id = self.rels.add(FOOTER_REL_TYPE, &target);
        self.content_types
            .set_override(&part_name, FOOTER_CONTENT_TYPE);

        let w_ns = self.document.namespace("w").unwrap_or_else(|| W_NS.to_string());
        self.document.ensure_namespace("r", R_NS);
        let r_ns = self.document.namespace("r").unwrap_or_else(|| R_NS.to_string());

        self.footers
            .push(Footer::new(&part_name, rel_id, &w_ns, &r_ns));
        self.footers
            .last_mut()
            .ok_or_else(|| anyhow!("footer list empty after insert"))
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        replacements.insert(
            self.document.part_name().to_string(),
            self.document.to_bytes()?,
        );
        replacements.insert(self.rels_part.clone(), self.rels.to_bytes()?);
        replacements.insert(CONTENT_TYPES_PART.to_string(), self.content_types.to_bytes()?);
        for footer in &self.footers {
            replacements.insert(footer.part_name().to_string(), footer.to_bytes()?);
        }
        self.package.write_with_replacements(&replacements)
    }
}

fn main_part_name(package: &DocxPackage) -> anyhow::Result<String> {
    let Some(ent) = package.get(PACKAGE_RELS_PART) else {
        return Ok(DEFAULT_MAIN_PART.to_string());
    };
    let rels = Relationships::parse(PACKAGE_RELS_PART, &ent.data)?;
    Ok(rels
        .list()
        .into_iter()
        .find(|r| r.rel_type.ends_with("/officeDocument"))
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::docx::model::tests::{document_xml, para_xml};
    use crate::docx::package::tests::zip_bytes;

    pub(crate) const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/footer1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/></Types>"#;
    pub(crate) const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
    pub(crate) const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/></Relationships>"#;
    pub(crate) const OLD_FOOTER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p><w:r><w:t>Old footer</w:t></w:r></w:p><w:p><w:r><w:t>Page x</w:t></w:r></w:p></w:ftr>"#;

    /// A minimal package: document with the given body XML and one existing footer.
    pub(crate) fn docx_with_body(body: &str) -> Vec<u8> {
        let doc = document_xml(body);
        zip_bytes(&[
            (CONTENT_TYPES_PART, CONTENT_TYPES_XML.as_bytes()),
            (PACKAGE_RELS_PART, PACKAGE_RELS_XML.as_bytes()),
            ("word/document.xml", doc.as_bytes()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.as_bytes()),
            ("word/footer1.xml", OLD_FOOTER_XML.as_bytes()),
        ])
    }

    pub(crate) fn docx_with_paragraphs(paras: &[&str]) -> Vec<u8> {
        let body: String = paras.iter().map(|t| para_xml(t)).collect();
        docx_with_body(&body)
    }

    #[test]
    fn part_name_helpers() {
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_name("doc.xml"), "_rels/doc.xml.rels");
        assert_eq!(resolve_target("word", "footer1.xml"), "word/footer1.xml");
        assert_eq!(resolve_target("word", "/word/footer2.xml"), "word/footer2.xml");
        assert_eq!(resolve_target("word/sub", "../media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn opens_package_and_finds_existing_footer() {
        let bytes = docx_with_paragraphs(&["Hello"]);
        let doc = WordDocument::from_bytes(&bytes, &InflateGuard::default()).expect("open");
        assert_eq!(doc.document().paragraph_texts(), ["Hello"]);
        assert_eq!(doc.footers().len(), 1);
        let footer = doc.footer_by_rel("rId7").expect("footer");
        assert_eq!(footer.part_name(), "word/footer1.xml");
        assert_eq!(footer.paragraphs().len(), 2);
    }

    #[test]
    fn create_footer_allocates_fresh_part_and_relationship() {
        let bytes = docx_with_paragraphs(&["Hello"]);
        let mut doc = WordDocument::from_bytes(&bytes, &InflateGuard::default()).expect("open");
        let (part, rel) = {
            let footer = doc.create_footer().expect("create");
            (footer.part_name().to_string(), footer.rel_id().to_string())
        };
        assert_eq!(part, "word/footer2.xml");
        assert_eq!(rel, "rId8");

        let out = doc.to_bytes().expect("save");
        let reopened = WordDocument::from_bytes(&out, &InflateGuard::default()).expect("reopen");
        assert_eq!(reopened.footers().len(), 2);
        assert_eq!(
            reopened.content_type_of("word/footer2.xml").as_deref(),
            Some(FOOTER_CONTENT_TYPE)
        );
        assert!(reopened
            .relationships()
            .iter()
            .any(|r| r.id == "rId8" && r.target == "footer2.xml" && r.rel_type == FOOTER_REL_TYPE));
    }

    #[test]
    fn clearing_a_footer_leaves_one_empty_paragraph() {
        let bytes = docx_with_paragraphs(&["Hello"]);
        let mut doc = WordDocument::from_bytes(&bytes, &InflateGuard::default()).expect("open");
        let removed = doc.footers_mut()[0].clear();
        assert_eq!(removed, 2);
        let paras = doc.footers()[0].paragraphs();
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].text(), "");
    }

    #[test]
    fn missing_main_part_is_an_error() {
        let bytes = zip_bytes(&[(PACKAGE_RELS_PART, PACKAGE_RELS_XML.as_bytes())]);
        let err = WordDocument::from_bytes(&bytes, &InflateGuard::default())
            .err()
            .expect("error");
        assert!(err.to_string().contains("missing main document part"));
    }
}

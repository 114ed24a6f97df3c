use anyhow::{anyhow, Context};

use crate::docx::tree::{XmlElement, XmlNode, XmlTree};
use crate::docx::xml::{read_tree, write_tree};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Twentieths of a point per line at single spacing (`w:lineRule="auto"`).
const AUTO_LINE_UNIT: f64 = 240.0;

// Child order of CT_PPr, CT_RPr and CT_SectPr. Strict consumers reject
// out-of-order property children.
const PPR_ORDER: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

const SECTPR_ORDER: &[&str] = &[
    "w:headerReference",
    "w:footerReference",
    "w:footnotePr",
    "w:endnotePr",
    "w:type",
    "w:pgSz",
    "w:pgMar",
    "w:paperSrc",
    "w:pgBorders",
    "w:lnNumType",
    "w:pgNumType",
    "w:cols",
    "w:formProt",
    "w:vAlign",
    "w:noEndnote",
    "w:titlePg",
    "w:textDirection",
    "w:bidi",
    "w:rtlGutter",
    "w:docGrid",
    "w:printerSettings",
    "w:sectPrChange",
];

/// Paragraph children that carry runs of their own.
const RUN_CONTAINERS: &[&str] = &[
    "w:hyperlink",
    "w:smartTag",
    "w:customXml",
    "w:ins",
    "w:fldSimple",
    "w:dir",
    "w:bdo",
    "w:sdt",
    "w:sdtContent",
];

const THEME_FONT_ATTRS: &[&str] = &[
    "w:asciiTheme",
    "w:hAnsiTheme",
    "w:eastAsiaTheme",
    "w:cstheme",
];

fn is_on(el: &XmlElement) -> bool {
    match el.attr("w:val") {
        None => true,
        Some(v) => !matches!(&*v, "0" | "false" | "off"),
    }
}

fn on_off(name: &str, value: bool) -> XmlElement {
    let el = XmlElement::new(name);
    if value {
        el
    } else {
        el.with_attr("w:val", "0")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Start,
    Center,
    Justify,
}

impl Alignment {
    pub fn as_jc(self) -> &'static str {
        match self {
            Self::Start => "left",
            Self::Center => "center",
            Self::Justify => "both",
        }
    }

    pub fn from_jc(val: &str) -> Option<Self> {
        match val {
            "left" | "start" => Some(Self::Start),
            "center" => Some(Self::Center),
            "both" | "distribute" => Some(Self::Justify),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineRule {
    Auto,
    Exact,
    AtLeast,
}

impl LineRule {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Exact => "exact",
            Self::AtLeast => "atLeast",
        }
    }

    fn parse(val: &str) -> Option<Self> {
        match val {
            "auto" => Some(Self::Auto),
            "exact" => Some(Self::Exact),
            "atLeast" => Some(Self::AtLeast),
            _ => None,
        }
    }
}

/// Line spacing of a paragraph. With `LineRule::Auto`, `value` is a multiplier
/// of single spacing; otherwise it is a height in twentieths of a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSpacing {
    pub rule: LineRule,
    pub value: f64,
}

impl LineSpacing {
    pub fn auto(multiplier: f64) -> Self {
        Self {
            rule: LineRule::Auto,
            value: multiplier,
        }
    }

    fn line_attr(self) -> i64 {
        match self.rule {
            LineRule::Auto => (self.value * AUTO_LINE_UNIT).round() as i64,
            LineRule::Exact | LineRule::AtLeast => self.value.round() as i64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HdrFtrType {
    Default,
    First,
    Even,
}

impl HdrFtrType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::First => "first",
            Self::Even => "even",
        }
    }

    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "default" => Some(Self::Default),
            "first" => Some(Self::First),
            "even" => Some(Self::Even),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldCharType {
    Begin,
    Separate,
    End,
}

impl FieldCharType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Separate => "separate",
            Self::End => "end",
        }
    }

    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "begin" => Some(Self::Begin),
            "separate" => Some(Self::Separate),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    attrs: Vec<(String, String)>,
    props: XmlElement,
    content: Vec<XmlNode>,
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

impl Run {
    pub fn new() -> Self {
        Self {
            attrs: Vec::new(),
            props: XmlElement::new("w:rPr"),
            content: Vec::new(),
        }
    }

    pub fn with_text(text: &str) -> Self {
        let mut t = XmlElement::new("w:t").with_text(text);
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            t.set_attr("xml:space", "preserve");
        }
        let mut run = Self::new();
        run.content.push(XmlNode::Element(t));
        run
    }

    pub fn field_char(kind: FieldCharType) -> Self {
        let mut run = Self::new();
        run.content.push(XmlNode::Element(
            XmlElement::new("w:fldChar").with_attr("w:fldCharType", kind.as_str()),
        ));
        run
    }

    pub fn instr_text(instr: &str) -> Self {
        let mut run = Self::new();
        run.content.push(XmlNode::Element(
            XmlElement::new("w:instrText")
                .with_attr("xml:space", "preserve")
                .with_text(instr),
        ));
        run
    }

    pub fn from_element(el: XmlElement) -> Self {
        let mut props = XmlElement::new("w:rPr");
        let mut content = Vec::with_capacity(el.children.len());
        for node in el.children {
            match node {
                XmlNode::Element(child) if child.name == "w:rPr" => props = child,
                other => content.push(other),
            }
        }
        Self {
            attrs: el.attrs,
            props,
            content,
        }
    }

    pub fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new("w:r");
        el.attrs = self.attrs.clone();
        if !self.props.children.is_empty() || !self.props.attrs.is_empty() {
            el.children.push(XmlNode::Element(self.props.clone()));
        }
        el.children.extend(self.content.iter().cloned());
        el
    }

    fn content_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.content.iter().filter_map(|n| match n {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Visible text, with tabs and line breaks rendered as control characters.
    pub fn text(&self) -> String {
        let mut buf = String::new();
        for el in self.content_elements() {
            match el.name.as_str() {
                "w:t" => buf.push_str(&el.text()),
                "w:tab" | "w:ptab" => buf.push('\t'),
                "w:cr" => buf.push('\n'),
                "w:br" => {
                    let br_type = el.attr("w:type");
                    if br_type.as_deref().unwrap_or("textWrapping") == "textWrapping" {
                        buf.push('\n');
                    }
                }
                "w:noBreakHyphen" => buf.push('-'),
                _ => {}
            }
        }
        buf
    }

    pub fn break_count(&self) -> usize {
        self.content_elements().filter(|el| el.name == "w:br").count()
    }

    pub fn strip_breaks(&mut self) -> usize {
        let before = self.content.len();
        self.content
            .retain(|n| !matches!(n, XmlNode::Element(el) if el.name == "w:br"));
        before - self.content.len()
    }

    pub fn field_char_type(&self) -> Option<FieldCharType> {
        self.content_elements()
            .find(|el| el.name == "w:fldChar")
            .and_then(|el| el.attr("w:fldCharType"))
            .and_then(|v| FieldCharType::parse(&v))
    }

    pub fn instruction(&self) -> Option<String> {
        self.content_elements()
            .find(|el| el.name == "w:instrText")
            .map(|el| el.text())
    }

    pub fn font_family(&self) -> Option<String> {
        self.props
            .child("w:rFonts")
            .and_then(|f| f.attr("w:ascii"))
            .map(|v| v.into_owned())
    }

    pub fn set_font_family(&mut self, family: &str) {
        let fonts = self.props.get_or_insert_ordered("w:rFonts", RPR_ORDER);
        for key in THEME_FONT_ATTRS {
            fonts.remove_attr(key);
        }
        for key in ["w:ascii", "w:hAnsi", "w:eastAsia", "w:cs"] {
            fonts.set_attr(key, family);
        }
    }

    pub fn font_size_pt(&self) -> Option<f32> {
        self.props
            .child("w:sz")
            .and_then(|sz| sz.attr("w:val"))
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(|half_points| half_points as f32 / 2.0)
    }

    pub fn set_font_size_pt(&mut self, points: u32) {
        let half_points = points.saturating_mul(2).to_string();
        for name in ["w:sz", "w:szCs"] {
            self.props.upsert_ordered(
                XmlElement::new(name).with_attr("w:val", &half_points),
                RPR_ORDER,
            );
        }
    }

    pub fn bold(&self) -> bool {
        self.props.child("w:b").is_some_and(is_on)
    }

    pub fn set_bold(&mut self, bold: bool) {
        self.props.upsert_ordered(on_off("w:b", bold), RPR_ORDER);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParaContent {
    Run(Run),
    /// A wrapper such as `w:hyperlink`; `element` holds its name and attributes.
    Container {
        element: XmlElement,
        content: Vec<ParaContent>,
    },
    Other(XmlNode),
}

impl ParaContent {
    fn from_node(node: XmlNode) -> Self {
        match node {
            XmlNode::Element(el) if el.name == "w:r" => Self::Run(Run::from_element(el)),
            XmlNode::Element(mut el) if RUN_CONTAINERS.contains(&el.name.as_str()) => {
                let children = std::mem::take(&mut el.children);
                Self::Container {
                    element: el,
                    content: children.into_iter().map(Self::from_node).collect(),
                }
            }
            other => Self::Other(other),
        }
    }

    fn to_node(&self) -> XmlNode {
        match self {
            Self::Run(run) => XmlNode::Element(run.to_element()),
            Self::Container { element, content } => {
                let mut el = element.clone();
                el.children = content.iter().map(Self::to_node).collect();
                XmlNode::Element(el)
            }
            Self::Other(node) => node.clone(),
        }
    }
}

fn collect_runs<'a>(content: &'a [ParaContent], out: &mut Vec<&'a Run>) {
    for c in content {
        match c {
            ParaContent::Run(run) => out.push(run),
            ParaContent::Container { content, .. } => collect_runs(content, out),
            ParaContent::Other(_) => {}
        }
    }
}

fn collect_runs_mut<'a>(content: &'a mut [ParaContent], out: &mut Vec<&'a mut Run>) {
    for c in content {
        match c {
            ParaContent::Run(run) => out.push(run),
            ParaContent::Container { content, .. } => collect_runs_mut(content, out),
            ParaContent::Other(_) => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    attrs: Vec<(String, String)>,
    /// `w:pPr` without its `w:sectPr`, which lives in `section`.
    props: XmlElement,
    section: Option<SectionProperties>,
    content: Vec<ParaContent>,
}

impl Default for Paragraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Paragraph {
    pub fn new() -> Self {
        Self {
            attrs: Vec::new(),
            props: XmlElement::new("w:pPr"),
            section: None,
            content: Vec::new(),
        }
    }

    pub fn with_text(text: &str) -> Self {
        let mut p = Self::new();
        if !text.is_empty() {
            p.push_run(Run::with_text(text));
        }
        p
    }

    pub fn from_element(el: XmlElement) -> Self {
        let mut props = XmlElement::new("w:pPr");
        let mut section = None;
        let mut content = Vec::with_capacity(el.children.len());
        for node in el.children {
            match node {
                XmlNode::Element(mut ppr) if ppr.name == "w:pPr" => {
                    if let Some(pos) = ppr
                        .children
                        .iter()
                        .position(|n| matches!(n, XmlNode::Element(c) if c.name == "w:sectPr"))
                    {
                        if let XmlNode::Element(sect) = ppr.children.remove(pos) {
                            section = Some(SectionProperties::from_element(sect));
                        }
                    }
                    props = ppr;
                }
                other => content.push(ParaContent::from_node(other)),
            }
        }
        Self {
            attrs: el.attrs,
            props,
            section,
            content,
        }
    }

    pub fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new("w:p");
        el.attrs = self.attrs.clone();
        let mut props = self.props.clone();
        if let Some(section) = &self.section {
            props.insert_ordered(section.to_element(), PPR_ORDER);
        }
        if !props.children.is_empty() || !props.attrs.is_empty() {
            el.children.push(XmlNode::Element(props));
        }
        el.children.extend(self.content.iter().map(ParaContent::to_node));
        el
    }

    pub fn text(&self) -> String {
        self.runs().iter().map(|r| r.text()).collect()
    }

    pub fn runs(&self) -> Vec<&Run> {
        let mut out = Vec::new();
        collect_runs(&self.content, &mut out);
        out
    }

    pub fn runs_mut(&mut self) -> Vec<&mut Run> {
        let mut out = Vec::new();
        collect_runs_mut(&mut self.content, &mut out);
        out
    }

    pub fn push_run(&mut self, run: Run) {
        self.content.push(ParaContent::Run(run));
    }

    pub fn alignment(&self) -> Option<Alignment> {
        self.props
            .child("w:jc")
            .and_then(|jc| jc.attr("w:val"))
            .and_then(|v| Alignment::from_jc(&v))
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.props.upsert_ordered(
            XmlElement::new("w:jc").with_attr("w:val", alignment.as_jc()),
            PPR_ORDER,
        );
    }

    pub fn style(&self) -> Option<String> {
        self.props
            .child("w:pStyle")
            .and_then(|s| s.attr("w:val"))
            .map(|v| v.into_owned())
    }

    pub fn set_style(&mut self, style_id: &str) {
        self.props.upsert_ordered(
            XmlElement::new("w:pStyle").with_attr("w:val", style_id),
            PPR_ORDER,
        );
    }

    pub fn line_spacing(&self) -> Option<LineSpacing> {
        let spacing = self.props.child("w:spacing")?;
        let line: f64 = spacing.attr("w:line")?.trim().parse().ok()?;
        let rule = spacing
            .attr("w:lineRule")
            .and_then(|v| LineRule::parse(&v))
            .unwrap_or(LineRule::Auto);
        let value = match rule {
            LineRule::Auto => line / AUTO_LINE_UNIT,
            LineRule::Exact | LineRule::AtLeast => line,
        };
        Some(LineSpacing { rule, value })
    }

    /// Sets line height and rule, keeping any before/after spacing attributes.
    pub fn set_line_spacing(&mut self, spacing: LineSpacing) {
        let el = self.props.get_or_insert_ordered("w:spacing", PPR_ORDER);
        el.set_attr("w:line", &spacing.line_attr().to_string());
        el.set_attr("w:lineRule", spacing.rule.as_str());
    }

    pub fn page_break_before(&self) -> bool {
        self.props.child("w:pageBreakBefore").is_some_and(is_on)
    }

    pub fn set_page_break_before(&mut self, value: bool) {
        self.props
            .upsert_ordered(on_off("w:pageBreakBefore", value), PPR_ORDER);
    }

    pub fn manual_break_count(&self) -> usize {
        self.runs().iter().map(|r| r.break_count()).sum()
    }

    pub fn strip_manual_breaks(&mut self) -> usize {
        self.runs_mut().into_iter().map(|r| r.strip_breaks()).sum()
    }

    pub fn section(&self) -> Option<&SectionProperties> {
        self.section.as_ref()
    }

    pub fn section_mut(&mut self) -> Option<&mut SectionProperties> {
        self.section.as_mut()
    }

}

/// Page margins in twentieths of a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageMargins {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HdrFtrRef {
    pub kind: HdrFtrType,
    pub rel_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionProperties {
    el: XmlElement,
}

impl Default for SectionProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionProperties {
    pub fn new() -> Self {
        Self {
            el: XmlElement::new("w:sectPr"),
        }
    }

    pub fn from_element(el: XmlElement) -> Self {
        Self { el }
    }

    pub fn to_element(&self) -> XmlElement {
        self.el.clone()
    }

    pub fn margins(&self) -> Option<PageMargins> {
        let mar = self.el.child("w:pgMar")?;
        let get = |key: &str| -> Option<i64> { mar.attr(key)?.trim().parse().ok() };
        Some(PageMargins {
            left: get("w:left")?,
            right: get("w:right")?,
            top: get("w:top")?,
            bottom: get("w:bottom")?,
        })
    }

    /// Writes the four page margins. Header, footer and gutter distances are
    /// required by the schema and default to 720/720/0 when missing.
    pub fn set_margins(&mut self, margins: PageMargins) {
        let mar = self.el.get_or_insert_ordered("w:pgMar", SECTPR_ORDER);
        mar.set_attr("w:top", &margins.top.to_string());
        mar.set_attr("w:right", &margins.right.to_string());
        mar.set_attr("w:bottom", &margins.bottom.to_string());
        mar.set_attr("w:left", &margins.left.to_string());
        for (key, default) in [("w:header", "720"), ("w:footer", "720"), ("w:gutter", "0")] {
            if mar.attr(key).is_none() {
                mar.set_attr(key, default);
            }
        }
    }

    fn refs(&self, name: &str) -> Vec<HdrFtrRef> {
        self.el
            .elements()
            .filter(|el| el.name == name)
            .filter_map(|el| {
                let kind = el
                    .attr("w:type")
                    .map(|v| HdrFtrType::parse(&v))
                    .unwrap_or(Some(HdrFtrType::Default))?;
                let rel_id = el.attr("r:id")?.into_owned();
                Some(HdrFtrRef { kind, rel_id })
            })
            .collect()
    }

    pub fn header_refs(&self) -> Vec<HdrFtrRef> {
        self.refs("w:headerReference")
    }

    pub fn footer_refs(&self) -> Vec<HdrFtrRef> {
        self.refs("w:footerReference")
    }

    pub fn clear_header_refs(&mut self) -> usize {
        self.el.remove_children("w:headerReference")
    }

    pub fn clear_footer_refs(&mut self) -> usize {
        self.el.remove_children("w:footerReference")
    }

    /// Binds a footer of `kind`, replacing any existing binding of that kind.
    pub fn set_footer_ref(&mut self, kind: HdrFtrType, rel_id: &str) {
        self.el.children.retain(|n| {
            !matches!(n, XmlNode::Element(el)
                if el.name == "w:footerReference"
                    && el.attr("w:type").as_deref().unwrap_or("default") == kind.as_str())
        });
        self.el.insert_ordered(
            XmlElement::new("w:footerReference")
                .with_attr("w:type", kind.as_str())
                .with_attr("r:id", rel_id),
            SECTPR_ORDER,
        );
    }

    pub fn title_page(&self) -> bool {
        self.el.child("w:titlePg").is_some_and(is_on)
    }

    pub fn clear_title_page(&mut self) -> bool {
        self.el.remove_children("w:titlePg") > 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BodyBlock {
    Paragraph(Paragraph),
    Section(SectionProperties),
    /// Tables and anything else the reformatter leaves alone.
    Other(XmlNode),
}

impl BodyBlock {
    fn from_node(node: XmlNode) -> Self {
        match node {
            XmlNode::Element(el) if el.name == "w:p" => Self::Paragraph(Paragraph::from_element(el)),
            XmlNode::Element(el) if el.name == "w:sectPr" => {
                Self::Section(SectionProperties::from_element(el))
            }
            other => Self::Other(other),
        }
    }

    fn to_node(&self) -> XmlNode {
        match self {
            Self::Paragraph(p) => XmlNode::Element(p.to_element()),
            Self::Section(s) => XmlNode::Element(s.to_element()),
            Self::Other(node) => node.clone(),
        }
    }
}

/// The main document part: a `w:document` whose `w:body` is held as typed blocks.
#[derive(Clone, Debug)]
pub struct Document {
    tree: XmlTree,
    blocks: Vec<BodyBlock>,
}

impl Document {
    pub fn from_tree(mut tree: XmlTree) -> anyhow::Result<Self> {
        if tree.root.name != "w:document" {
            return Err(anyhow!(
                "unexpected root <{}> in {} (expected <w:document>)",
                tree.root.name,
                tree.name
            ));
        }
        let name = tree.name.clone();
        let body = tree
            .root
            .child_mut("w:body")
            .with_context(|| format!("missing <w:body> in {name}"))?;
        let children = std::mem::take(&mut body.children);
        let blocks = children.into_iter().map(BodyBlock::from_node).collect();
        Ok(Self { tree, blocks })
    }

    pub fn parse(name: &str, xml: &[u8]) -> anyhow::Result<Self> {
        Self::from_tree(read_tree(name, xml)?)
    }

    pub fn to_tree(&self) -> XmlTree {
        let mut tree = self.tree.clone();
        if let Some(body) = tree.root.child_mut("w:body") {
            body.children = self.blocks.iter().map(BodyBlock::to_node).collect();
        }
        tree
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        write_tree(&self.to_tree())
            .with_context(|| format!("serialize xml: {}", self.tree.name))
    }

    pub fn part_name(&self) -> &str {
        &self.tree.name
    }

    #[cfg(test)]
    pub fn blocks(&self) -> &[BodyBlock] {
        &self.blocks
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            BodyBlock::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn paragraphs_mut(&mut self) -> Vec<&mut Paragraph> {
        self.blocks
            .iter_mut()
            .filter_map(|b| match b {
                BodyBlock::Paragraph(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraphs().map(Paragraph::text).collect()
    }

    /// Body block position of the `index`-th body-level paragraph.
    pub fn block_index_of_paragraph(&self, index: usize) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| matches!(b, BodyBlock::Paragraph(_)))
            .nth(index)
            .map(|(i, _)| i)
    }

    pub fn remove_block(&mut self, block_index: usize) -> Option<BodyBlock> {
        (block_index < self.blocks.len()).then(|| self.blocks.remove(block_index))
    }

    /// First body-level section block, i.e. the one governing the final section.
    pub fn body_section_mut(&mut self) -> Option<&mut SectionProperties> {
        self.blocks.iter_mut().find_map(|b| match b {
            BodyBlock::Section(s) => Some(s),
            _ => None,
        })
    }

    pub fn body_sections(&self) -> impl Iterator<Item = &SectionProperties> {
        self.blocks.iter().filter_map(|b| match b {
            BodyBlock::Section(s) => Some(s),
            _ => None,
        })
    }

    /// Appends a section block at the end of the body.
    pub fn push_section(&mut self, section: SectionProperties) {
        self.blocks.push(BodyBlock::Section(section));
    }

    /// Every section block in document order: paragraph-embedded ones and
    /// body-level ones.
    pub fn sections(&self) -> Vec<&SectionProperties> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                BodyBlock::Paragraph(p) => p.section(),
                BodyBlock::Section(s) => Some(s),
                BodyBlock::Other(_) => None,
            })
            .collect()
    }

    pub fn sections_mut(&mut self) -> Vec<&mut SectionProperties> {
        self.blocks
            .iter_mut()
            .filter_map(|b| match b {
                BodyBlock::Paragraph(p) => p.section_mut(),
                BodyBlock::Section(s) => Some(s),
                BodyBlock::Other(_) => None,
            })
            .collect()
    }

    pub fn namespace(&self, prefix: &str) -> Option<String> {
        self.tree
            .root
            .attr(&format!("xmlns:{prefix}"))
            .map(|v| v.into_owned())
    }

    /// Declares `xmlns:{prefix}` on the root element unless already present.
    pub fn ensure_namespace(&mut self, prefix: &str, uri: &str) {
        let key = format!("xmlns:{prefix}");
        if self.tree.root.attr(&key).is_none() {
            self.tree.root.set_attr(&key, uri);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:body>{body}</w:body></w:document>"#
        )
    }

    pub(crate) fn para_xml(text: &str) -> String {
        if text.is_empty() {
            "<w:p/>".to_string()
        } else {
            format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
        }
    }

    pub(crate) fn doc_with(paras: &[&str]) -> Document {
        let body: String = paras.iter().map(|t| para_xml(t)).collect();
        Document::parse("word/document.xml", document_xml(&body).as_bytes()).expect("parse doc")
    }

    #[test]
    fn paragraph_text_spans_runs_and_hyperlinks() {
        let doc = Document::parse(
            "word/document.xml",
            document_xml(
                r#"<w:p><w:r><w:t>CHAP</w:t></w:r><w:hyperlink r:id="rId5"><w:r><w:t>TER</w:t></w:r></w:hyperlink><w:r><w:tab/><w:t>1</w:t></w:r></w:p>"#,
            )
            .as_bytes(),
        )
        .expect("parse");
        assert_eq!(doc.paragraph_texts(), ["CHAPTER\t1"]);
    }

    #[test]
    fn instruction_text_is_not_paragraph_text() {
        let mut p = Paragraph::new();
        p.push_run(Run::field_char(FieldCharType::Begin));
        p.push_run(Run::instr_text(" PAGE "));
        p.push_run(Run::field_char(FieldCharType::Separate));
        p.push_run(Run::with_text("7"));
        p.push_run(Run::field_char(FieldCharType::End));
        assert_eq!(p.text(), "7");
    }

    #[test]
    fn paragraph_properties_are_written_in_schema_order() {
        let mut p = Paragraph::with_text("x");
        p.set_alignment(Alignment::Center);
        p.set_line_spacing(LineSpacing::auto(2.0));
        p.set_page_break_before(true);
        p.set_style("Heading1");
        let el = p.to_element();
        let ppr = el.child("w:pPr").expect("pPr");
        let names: Vec<&str> = ppr.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["w:pStyle", "w:pageBreakBefore", "w:spacing", "w:jc"]);
        assert_eq!(
            ppr.child("w:spacing").and_then(|s| s.attr("w:line")).as_deref(),
            Some("480")
        );
    }

    #[test]
    fn line_spacing_keeps_before_after() {
        let doc = Document::parse(
            "word/document.xml",
            document_xml(
                r#"<w:p><w:pPr><w:spacing w:before="120" w:after="60" w:line="360" w:lineRule="exact"/></w:pPr></w:p>"#,
            )
            .as_bytes(),
        )
        .expect("parse");
        let mut p = doc.paragraphs().next().expect("p").clone();
        assert_eq!(
            p.line_spacing(),
            Some(LineSpacing {
                rule: LineRule::Exact,
                value: 360.0
            })
        );
        p.set_line_spacing(LineSpacing::auto(2.0));
        assert_eq!(p.line_spacing(), Some(LineSpacing::auto(2.0)));
        let el = p.to_element();
        let spacing = el.child("w:pPr").and_then(|ppr| ppr.child("w:spacing")).expect("spacing");
        assert_eq!(spacing.attr("w:before").as_deref(), Some("120"));
        assert_eq!(spacing.attr("w:after").as_deref(), Some("60"));
    }

    #[test]
    fn page_break_false_is_explicit() {
        let mut p = Paragraph::with_text("x");
        p.set_page_break_before(true);
        assert!(p.page_break_before());
        p.set_page_break_before(false);
        assert!(!p.page_break_before());
        let el = p.to_element();
        let pbb = el
            .child("w:pPr")
            .and_then(|ppr| ppr.child("w:pageBreakBefore"))
            .expect("pageBreakBefore");
        assert_eq!(pbb.attr("w:val").as_deref(), Some("0"));
    }

    #[test]
    fn run_font_properties_replace_theme_fonts() {
        let mut p = Paragraph::from_element(
            read_tree(
                "p.xml",
                br#"<w:p><w:r><w:rPr><w:rFonts w:asciiTheme="minorHAnsi" w:ascii="Calibri"/><w:sz w:val="22"/></w:rPr><w:t>a</w:t><w:br w:type="page"/></w:r></w:p>"#,
            )
            .expect("parse")
            .root,
        );
        let runs = p.runs_mut();
        assert_eq!(runs.len(), 1);
        let run = runs.into_iter().next().expect("run");
        run.set_font_family("Times New Roman");
        run.set_font_size_pt(14);
        run.set_bold(true);
        assert_eq!(run.font_family().as_deref(), Some("Times New Roman"));
        assert_eq!(run.font_size_pt(), Some(14.0));
        assert!(run.bold());
        let el = run.to_element();
        let rpr = el.child("w:rPr").expect("rPr");
        let names: Vec<&str> = rpr.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["w:rFonts", "w:b", "w:sz", "w:szCs"]);
        assert!(rpr.child("w:rFonts").and_then(|f| f.attr("w:asciiTheme")).is_none());

        assert_eq!(p.manual_break_count(), 1);
        assert_eq!(p.strip_manual_breaks(), 1);
        assert_eq!(p.manual_break_count(), 0);
        assert_eq!(p.text(), "a");
    }

    #[test]
    fn embedded_section_is_typed_and_written_back() {
        let xml = document_xml(
            r#"<w:p><w:pPr><w:jc w:val="center"/><w:sectPr><w:footerReference w:type="default" r:id="rId3"/><w:titlePg/></w:sectPr></w:pPr></w:p><w:sectPr><w:pgMar w:top="1" w:right="2" w:bottom="3" w:left="4" w:header="5" w:footer="6" w:gutter="0"/></w:sectPr>"#,
        );
        let mut doc = Document::parse("word/document.xml", xml.as_bytes()).expect("parse");
        assert_eq!(doc.sections().len(), 2);
        {
            let embedded = doc.paragraphs().next().and_then(|p| p.section()).expect("embedded");
            assert!(embedded.title_page());
            assert_eq!(
                embedded.footer_refs(),
                [HdrFtrRef {
                    kind: HdrFtrType::Default,
                    rel_id: "rId3".to_string()
                }]
            );
        }
        let body = doc.body_section_mut().expect("body sectPr");
        assert_eq!(
            body.margins(),
            Some(PageMargins {
                left: 4,
                right: 2,
                top: 1,
                bottom: 3
            })
        );
        let out = String::from_utf8(doc.to_bytes().expect("bytes")).expect("utf8");
        assert!(out.contains(r#"<w:pPr><w:jc w:val="center"/><w:sectPr>"#));
    }

    #[test]
    fn set_footer_ref_replaces_same_kind_only() {
        let mut s = SectionProperties::new();
        s.set_footer_ref(HdrFtrType::First, "rId1");
        s.set_footer_ref(HdrFtrType::Default, "rId2");
        s.set_footer_ref(HdrFtrType::Default, "rId3");
        let refs = s.footer_refs();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&HdrFtrRef {
            kind: HdrFtrType::Default,
            rel_id: "rId3".to_string()
        }));
    }

    #[test]
    fn new_margins_fill_required_attributes() {
        let mut s = SectionProperties::new();
        s.set_margins(PageMargins {
            left: 2160,
            right: 1440,
            top: 1440,
            bottom: 1440,
        });
        let el = s.to_element();
        let mar = el.child("w:pgMar").expect("pgMar");
        assert_eq!(mar.attr("w:left").as_deref(), Some("2160"));
        assert_eq!(mar.attr("w:gutter").as_deref(), Some("0"));
    }

    #[test]
    fn rejects_non_document_root() {
        let err = Document::parse("word/document.xml", b"<w:ftr/>").unwrap_err();
        assert!(err.to_string().contains("unexpected root"));
        assert!(Document::parse("word/document.xml", b"<w:document/>").is_err());
    }

    #[test]
    fn block_index_skips_non_paragraphs() {
        let xml = document_xml(r#"<w:p/><w:tbl><w:tr/></w:tbl><w:p/>"#);
        let doc = Document::parse("word/document.xml", xml.as_bytes()).expect("parse");
        assert_eq!(doc.block_index_of_paragraph(0), Some(0));
        assert_eq!(doc.block_index_of_paragraph(1), Some(2));
        assert_eq!(doc.block_index_of_paragraph(2), None);
    }
}

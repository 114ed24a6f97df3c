use std::borrow::Cow;

use anyhow::{anyhow, Context};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::docx::tree::{XmlDecl, XmlElement, XmlNode, XmlTree};

/// Reads a whole part into a tree. Attribute values are kept exactly as
/// written (still escaped); text is decoded.
pub fn read_tree(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlTree> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut decl: Option<XmlDecl> = None;
    let mut prolog: Vec<XmlNode> = Vec::new();
    let mut epilog: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("read xml event in {name}"))?;
        let node = match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                decl = Some(read_decl(&d).with_context(|| format!("xml declaration in {name}"))?);
                continue;
            }
            Event::Start(s) => {
                stack.push(read_element(&s)?);
                continue;
            }
            Event::End(e) => {
                let end = lossy(e.name().as_ref());
                let el = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unexpected </{end}> in {name}"))?;
                if el.name != end {
                    return Err(anyhow!(
                        "mismatched end tag in {name}: <{}> closed by </{end}>",
                        el.name
                    ));
                }
                XmlNode::Element(el)
            }
            Event::Empty(s) => XmlNode::Element(read_element(&s)?),
            Event::Text(t) => XmlNode::Text(
                t.unescape()
                    .with_context(|| format!("unescape text in {name}"))?
                    .into_owned(),
            ),
            Event::CData(t) => XmlNode::CData(lossy(t.into_inner())),
            Event::Comment(t) => XmlNode::Comment(lossy(t.into_inner())),
            Event::PI(t) => XmlNode::PI(format!("{}{}", lossy(t.target()), lossy(t.content()))),
            Event::DocType(t) => XmlNode::DocType(lossy(t.into_inner())),
        };

        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        } else if let XmlNode::Element(el) = node {
            if root.is_some() {
                return Err(anyhow!("multiple root elements in {name}"));
            }
            root = Some(el);
        } else if root.is_none() {
            prolog.push(node);
        } else {
            epilog.push(node);
        }
    }

    if let Some(open) = stack.last() {
        return Err(anyhow!("unterminated <{}> in {name}", open.name));
    }
    let root = root.with_context(|| format!("no root element in {name}"))?;
    Ok(XmlTree {
        name: name.to_string(),
        decl,
        prolog,
        root,
        epilog,
    })
}

fn read_decl(d: &BytesDecl<'_>) -> anyhow::Result<XmlDecl> {
    Ok(XmlDecl {
        version: lossy(d.version().context("version")?),
        encoding: d.encoding().transpose().ok().flatten().map(lossy),
        standalone: d.standalone().transpose().ok().flatten().map(lossy),
    })
}

fn read_element(s: &BytesStart<'_>) -> anyhow::Result<XmlElement> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Raw value: character references such as `&#xD;&#xA;` in VML
        // `o:gfxdata` must come back out byte for byte.
        attrs.push((lossy(a.key.as_ref()), lossy(a.value.as_ref())));
    }
    Ok(XmlElement {
        name: lossy(s.name().as_ref()),
        attrs,
        children: Vec::new(),
    })
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Serializes a tree. Childless elements are written self-closing.
pub fn write_tree(tree: &XmlTree) -> anyhow::Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    if let Some(d) = &tree.decl {
        let decl = BytesDecl::new(&d.version, d.encoding.as_deref(), d.standalone.as_deref());
        w.write_event(Event::Decl(decl))
            .with_context(|| format!("write declaration in {}", tree.name))?;
    }
    let mut write_all = || -> std::io::Result<()> {
        for node in &tree.prolog {
            write_node(&mut w, node)?;
        }
        write_element(&mut w, &tree.root)?;
        for node in &tree.epilog {
            write_node(&mut w, node)?;
        }
        Ok(())
    };
    write_all().with_context(|| format!("write xml: {}", tree.name))?;
    Ok(w.into_inner())
}

fn write_node(w: &mut Writer<Vec<u8>>, node: &XmlNode) -> std::io::Result<()> {
    match node {
        XmlNode::Element(el) => write_element(w, el),
        XmlNode::Text(text) => {
            w.write_event(Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))))
        }
        XmlNode::CData(text) => w.write_event(Event::CData(BytesCData::new(text.as_str()))),
        XmlNode::Comment(text) => {
            w.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
        }
        XmlNode::PI(content) => w.write_event(Event::PI(BytesPI::new(content.as_str()))),
        XmlNode::DocType(text) => {
            w.write_event(Event::DocType(BytesText::from_escaped(text.as_str())))
        }
    }
}

fn write_element(w: &mut Writer<Vec<u8>>, el: &XmlElement) -> std::io::Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, raw) in &el.attrs {
        // Values are stored escaped. A raw `"` only occurs in values that were
        // single-quoted in the source, and output is always double-quoted.
        let value: Cow<'_, str> = if raw.contains('"') {
            Cow::Owned(raw.replace('"', "&quot;"))
        } else {
            Cow::Borrowed(raw.as_str())
        };
        start.push_attribute((key.as_bytes(), value.as_bytes()));
    }
    if el.children.is_empty() {
        return w.write_event(Event::Empty(start));
    }
    w.write_event(Event::Start(start))?;
    for child in &el.children {
        write_node(w, child)?;
    }
    w.write_event(Event::End(BytesEnd::new(el.name.as_str())))
}

/// Escapes a plain string for storage as a raw attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Decodes a raw attribute value. Malformed entity references are returned as-is.
pub fn unescape_attr(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

use crate::docx::xml::{escape_attr, unescape_attr};

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
    DocType(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlElement {
    pub name: String,
    /// Raw (escaped) attribute values, as read from the part.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for XmlDecl {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A whole XML part: the declaration, nodes before the root element (comments,
/// whitespace), the root and whatever trails it.
#[derive(Clone, Debug)]
pub struct XmlTree {
    pub name: String,
    pub decl: Option<XmlDecl>,
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    pub epilog: Vec<XmlNode>,
}

impl XmlTree {
    /// A fresh part with the usual `standalone="yes"` UTF-8 declaration.
    pub fn new(name: &str, root: XmlElement) -> Self {
        Self {
            name: name.to_string(),
            decl: Some(XmlDecl::default()),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of `set_attr`; `value` is plain text and gets escaped.
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    #[cfg(test)]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(XmlNode::Text(text.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<std::borrow::Cow<'_, str>> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| unescape_attr(v))
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        let raw = escape_attr(value);
        for (k, v) in self.attrs.iter_mut() {
            if k == key {
                *v = raw;
                return;
            }
        }
        self.attrs.push((key.to_string(), raw));
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|n| match n {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.name == name)
    }

    /// Removes every direct child element called `name`; returns how many went.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, XmlNode::Element(el) if el.name == name));
        before - self.children.len()
    }

    /// Concatenated text of all direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for n in &self.children {
            if let XmlNode::Text(t) | XmlNode::CData(t) = n {
                out.push_str(t);
            }
        }
        out
    }

    /// Replaces the first child called `el.name`, or inserts it at the position
    /// `order` prescribes. Names missing from `order` are appended.
    pub fn upsert_ordered(&mut self, el: XmlElement, order: &[&str]) {
        if let Some(existing) = self.child_mut(&el.name) {
            *existing = el;
            return;
        }
        self.insert_ordered(el, order);
    }

    /// Inserts after the last child ranked at or before `el` in `order`.
    pub fn insert_ordered(&mut self, el: XmlElement, order: &[&str]) {
        let pos = self.ordered_position(&el.name, order);
        self.children.insert(pos, XmlNode::Element(el));
    }

    /// Returns the first child called `name`, creating an empty one in schema
    /// position when absent.
    pub fn get_or_insert_ordered(&mut self, name: &str, order: &[&str]) -> &mut XmlElement {
        let idx = match self.child_index(name) {
            Some(i) => i,
            None => {
                let pos = self.ordered_position(name, order);
                self.children
                    .insert(pos, XmlNode::Element(XmlElement::new(name)));
                pos
            }
        };
        match &mut self.children[idx] {
            XmlNode::Element(el) => el,
            _ => unreachable!("child_index only yields element positions"),
        }
    }

    fn child_index(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, XmlNode::Element(el) if el.name == name))
    }

    fn ordered_position(&self, name: &str, order: &[&str]) -> usize {
        let Some(rank) = order.iter().position(|n| *n == name) else {
            return self.children.len();
        };
        let mut pos = 0usize;
        for (i, node) in self.children.iter().enumerate() {
            if let XmlNode::Element(el) = node {
                if let Some(r) = order.iter().position(|n| *n == el.name) {
                    if r <= rank {
                        pos = i + 1;
                    }
                }
            }
        }
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::{XmlElement, XmlNode, XmlTree};
    use crate::docx::xml::{read_tree, write_tree};

    const ORDER: &[&str] = &["a", "b", "c", "d"];

    fn names(el: &XmlElement) -> Vec<&str> {
        el.elements().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn tree_round_trips() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<root x="1"><a/><b>t &amp; u</b><!--note--></root>"#;
        let tree = read_tree("p.xml", xml).expect("parse");
        assert_eq!(tree.root.child("b").map(|b| b.text()).as_deref(), Some("t & u"));
        assert!(matches!(tree.root.children.last(), Some(XmlNode::Comment(c)) if c == "note"));
        let out = write_tree(&tree).expect("write");
        assert_eq!(out.as_slice(), xml.as_slice());
    }

    #[test]
    fn new_tree_writes_standalone_declaration() {
        let root = XmlElement::new("w:ftr").with_child(XmlElement::new("w:p"));
        let tree = XmlTree::new("w.xml", root);
        let out = String::from_utf8(write_tree(&tree).expect("write")).expect("utf8");
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr><w:p/></w:ftr>"#
        );
    }

    #[test]
    fn ordered_insert_respects_schema_rank() {
        let mut el = XmlElement::new("p")
            .with_child(XmlElement::new("a"))
            .with_child(XmlElement::new("d"));
        el.insert_ordered(XmlElement::new("c"), ORDER);
        el.insert_ordered(XmlElement::new("b"), ORDER);
        assert_eq!(names(&el), ["a", "b", "c", "d"]);
    }

    #[test]
    fn ordered_insert_goes_first_when_nothing_ranks_before() {
        let mut el = XmlElement::new("p").with_child(XmlElement::new("c"));
        el.get_or_insert_ordered("a", ORDER);
        assert_eq!(names(&el), ["a", "c"]);
    }

    #[test]
    fn repeated_names_insert_after_existing_siblings() {
        let mut el = XmlElement::new("p")
            .with_child(XmlElement::new("b").with_attr("n", "1"))
            .with_child(XmlElement::new("c"));
        el.insert_ordered(XmlElement::new("b").with_attr("n", "2"), ORDER);
        let bs: Vec<String> = el
            .elements()
            .filter(|e| e.name == "b")
            .filter_map(|e| e.attr("n").map(|v| v.into_owned()))
            .collect();
        assert_eq!(bs, ["1", "2"]);
        assert_eq!(names(&el), ["b", "b", "c"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut el = XmlElement::new("p")
            .with_child(XmlElement::new("a"))
            .with_child(XmlElement::new("b").with_attr("v", "old"));
        el.upsert_ordered(XmlElement::new("b").with_attr("v", "new"), ORDER);
        assert_eq!(names(&el), ["a", "b"]);
        assert_eq!(el.child("b").and_then(|b| b.attr("v")).as_deref(), Some("new"));
    }

    #[test]
    fn remove_children_counts() {
        let mut el = XmlElement::new("r")
            .with_child(XmlElement::new("br"))
            .with_child(XmlElement::new("t").with_text("x"))
            .with_child(XmlElement::new("br"));
        assert_eq!(el.remove_children("br"), 2);
        assert_eq!(names(&el), ["t"]);
    }
}

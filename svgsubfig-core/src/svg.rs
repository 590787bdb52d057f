//! Owned SVG Tree - Parse, Edit, Serialize
//!
//! A deliberately small element tree: names and attribute keys are kept
//! verbatim (prefixes and `xmlns` declarations included), so an embedded
//! document keeps resolving its own namespaces wherever it is grafted.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

pub const NS_SVG: &str = "http://www.w3.org/2000/svg";
pub const NS_XLINK: &str = "http://www.w3.org/1999/xlink";

/// Elements whose whitespace-only text is content, not formatting.
const TEXT_ELEMENTS: [&str; 3] = ["text", "tspan", "textPath"];

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in markup: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unsupported encoding {0:?}")]
    Encoding(String),

    #[error("{0}")]
    Structure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: vec![],
            children: vec![],
        }
    }

    /// Builder form of [`Element::set_attr`].
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces an existing attribute in place, otherwise appends it.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text and CDATA of direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Pre-order walk over this element and all descendants.
    pub fn visit<F: FnMut(&Element)>(&self, f: &mut F) {
        f(self);
        for child in self.child_elements() {
            child.visit(f);
        }
    }

    pub fn visit_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.visit_mut(f);
            }
        }
    }

    fn preserves_whitespace(&self) -> bool {
        TEXT_ELEMENTS.contains(&self.local_name()) || self.attr("xml:space") == Some("preserve")
    }

    /// Subtrees whose text would change if indentation were added.
    fn is_inline(&self) -> bool {
        self.preserves_whitespace() || self.children.iter().any(|c| !matches!(c, Node::Element(_)))
    }

    fn from_start(start: &BytesStart<'_>, entities: &Entities) -> Result<Self, XmlError> {
        let mut element = Element::new(std::str::from_utf8(start.name().as_ref())?);
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value_with(|name| entities.resolve(name))?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        if !self.is_inline() {
            return self.write_events(writer);
        }
        let mut raw = Writer::new(Vec::new());
        self.write_events(&mut raw)?;
        writer.write_indent()?;
        writer.get_mut().write_all(&raw.into_inner())?;
        Ok(())
    }

    fn write_events<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                Node::CData(c) => writer.write_event(Event::CData(BytesCData::new(c.as_str())))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// Internal DTD entities, as declared by e.g. Illustrator's `<!ENTITY ns_svg "...">`.
#[derive(Debug, Default)]
struct Entities(HashMap<String, String>);

impl Entities {
    /// Collects general entities with literal values; external and parameter
    /// entities are ignored.
    fn from_doctype(doctype: &str) -> Self {
        let mut map = HashMap::new();
        let mut rest = doctype;
        while let Some(pos) = rest.find("<!ENTITY") {
            rest = &rest[pos + "<!ENTITY".len()..];
            let decl = rest.trim_start();
            if decl.starts_with('%') {
                continue;
            }
            let name_end = decl.find(char::is_whitespace).unwrap_or(decl.len());
            let after = decl[name_end..].trim_start();
            let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
                continue;
            };
            if let Some(end) = after[1..].find(quote) {
                map.insert(decl[..name_end].to_string(), after[1..1 + end].to_string());
            }
        }
        Self(map)
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        resolve_predefined_entity(name).or_else(|| self.0.get(name).map(String::as_str))
    }
}

/// Decodes file bytes according to the BOM and XML declaration.
///
/// UTF-8 and ISO-8859-1 (plus its ASCII subset) are supported.
pub fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match declared_encoding(bytes)?.as_deref() {
        None | Some("utf-8" | "utf8") => Ok(Cow::Borrowed(std::str::from_utf8(bytes)?)),
        Some("iso-8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" | "us-ascii" | "ascii") => {
            Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()))
        }
        Some(other) => Err(XmlError::Encoding(other.to_string())),
    }
}

fn declared_encoding(bytes: &[u8]) -> Result<Option<String>, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    match reader.read_event()? {
        Event::Decl(decl) => match decl.encoding() {
            Some(label) => Ok(Some(String::from_utf8_lossy(&label?).to_ascii_lowercase())),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Parses markup into its root element.
///
/// Internal DTD entities are resolved. Comments, processing instructions, the
/// DOCTYPE and the XML declaration are dropped. Whitespace-only text is
/// dropped unless an enclosing element is a text element or `xml:space="preserve"`.
pub fn parse(src: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(src);
    let mut entities = Entities::default();
    let mut stack: Vec<Element> = vec![];
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::DocType(e) => entities = Entities::from_doctype(std::str::from_utf8(&e)?),
            Event::Start(e) => stack.push(Element::from_start(&e, &entities)?),
            Event::Empty(e) => {
                let element = Element::from_start(&e, &entities)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let text = e.unescape_with(|name| entities.resolve(name))?;
                let preserve = stack.iter().any(Element::preserves_whitespace);
                match stack.last_mut() {
                    Some(parent) => {
                        if !text.trim().is_empty() || preserve {
                            parent.push_text(text.into_owned());
                        }
                    }
                    None if !text.trim().is_empty() => {
                        return Err(XmlError::Structure("text outside of root element".into()));
                    }
                    None => {}
                }
            }
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    let data: Cow<'_, [u8]> = e.into_inner();
                    parent.children.push(Node::CData(std::str::from_utf8(&data)?.to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Structure("unclosed element at end of input".into()));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::Structure("more than one root element".into())),
    }
    Ok(())
}

/// A complete document, serialized with an XML declaration and indentation.
///
/// Mixed-content subtrees (text elements, `xml:space="preserve"`, anything
/// with text children) are written on one line, exactly as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn to_xml_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.root.write(&mut writer)?;
        let mut buf = writer.into_inner();
        buf.push(b'\n');
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(root: Element) -> String {
        String::from_utf8(Document::new(root).to_xml_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_keeps_names_and_attributes() {
        let root = parse(
            r##"<?xml version="1.0"?>
<!-- plot -->
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 10 5">
  <defs><path id="p" d="M0 0L1 1"/></defs>
  <use xlink:href="#p" title="a &amp; b"/>
</svg>"##,
        )
        .unwrap();

        assert_eq!(root.name, "svg");
        assert_eq!(root.attr("viewBox"), Some("0 0 10 5"));
        assert_eq!(root.attr("xmlns:xlink"), Some(NS_XLINK));
        let children: Vec<_> = root.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].attr("xlink:href"), Some("#p"));
        assert_eq!(children[1].attr("title"), Some("a & b"));
    }

    #[test]
    fn test_whitespace_kept_only_in_text_elements() {
        let root = parse("<svg>\n  <text><tspan>a</tspan> <tspan>b</tspan></text>\n</svg>").unwrap();
        assert_eq!(root.children.len(), 1);
        let text = root.child_elements().next().unwrap();
        assert_eq!(text.children.len(), 3);
        assert_eq!(text.text(), " ");
    }

    #[test]
    fn test_cdata_preserved() {
        let root = parse("<svg><style><![CDATA[.a > .b { fill: red }]]></style></svg>").unwrap();
        let style = root.child_elements().next().unwrap();
        assert_eq!(style.children, vec![Node::CData(".a > .b { fill: red }".into())]);
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse("<svg><g></svg>").is_err());
        assert!(parse("<svg>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_serialize_declaration_and_indent() {
        let mut root = Element::new("svg").with_attr("xmlns", NS_SVG);
        let mut label = Element::new("text").with_attr("x", "5");
        label.push_text("(a)");
        root.push(Element::new("g").with_attr("id", "g<1>"));
        root.push(label);

        let xml = serialize(root);
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("\n  <g id=\"g&lt;1&gt;\"/>"));
        assert!(xml.contains("\n  <text x=\"5\">(a)</text>"));
        assert!(xml.ends_with("</svg>\n"));
    }

    #[test]
    fn test_reparse_of_serialized_tree_is_stable() {
        let src = r##"<svg viewBox="0 0 1 1"><g id="a"><rect fill="url(#a)"/></g><text>x &lt; y</text></svg>"##;
        let root = parse(src).unwrap();
        let xml = serialize(root.clone());
        assert_eq!(parse(&xml).unwrap(), root);
    }

    #[test]
    fn test_set_attr_replaces_in_place() {
        let mut e = Element::new("g").with_attr("id", "a");
        e.set_attr("class", "c");
        e.set_attr("id", "b");
        assert_eq!(e.attributes, vec![("id".into(), "b".into()), ("class".into(), "c".into())]);
    }

    #[test]
    fn test_internal_dtd_entities_resolved() {
        let root = parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" [
	<!ENTITY ns_svg "http://www.w3.org/2000/svg">
	<!ENTITY ns_xlink 'http://www.w3.org/1999/xlink'>
	<!ENTITY % params "ignored">
	<!ENTITY logo SYSTEM "logo.svg">
]>
<svg xmlns="&ns_svg;" xmlns:xlink="&ns_xlink;" viewBox="0 0 10 5"><text>&ns_svg; &amp; &#65;</text></svg>"#,
        )
        .unwrap();

        assert_eq!(root.attr("xmlns"), Some(NS_SVG));
        assert_eq!(root.attr("xmlns:xlink"), Some(NS_XLINK));
        assert_eq!(root.child_elements().next().unwrap().text(), format!("{NS_SVG} & A"));
    }

    #[test]
    fn test_undeclared_entity_rejected() {
        assert!(parse(r#"<svg xmlns="&ns_svg;"/>"#).is_err());
    }

    #[test]
    fn test_preserved_text_written_verbatim() {
        let src = r#"<svg><g><text xml:space="preserve">x <tspan>a</tspan> <tspan>b</tspan></text></g></svg>"#;
        let xml = serialize(parse(src).unwrap());
        assert!(xml.contains(
            "\n    <text xml:space=\"preserve\">x <tspan>a</tspan> <tspan>b</tspan></text>\n  </g>\n</svg>"
        ));
    }

    #[test]
    fn test_leading_tspan_not_indented() {
        let xml = serialize(parse("<svg><text><tspan>a</tspan><tspan>b</tspan></text></svg>").unwrap());
        assert!(xml.contains("\n  <text><tspan>a</tspan><tspan>b</tspan></text>\n</svg>"));
    }

    #[test]
    fn test_whitespace_under_preserve_kept() {
        let root = parse("<svg><g xml:space=\"preserve\"><rect/>\n  <rect/></g></svg>").unwrap();
        let group = root.child_elements().next().unwrap();
        assert_eq!(group.children.len(), 3);
        let xml = serialize(root);
        assert!(xml.contains("<g xml:space=\"preserve\"><rect/>\n  <rect/></g>"));
    }

    #[test]
    fn test_decode_honours_declaration() {
        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><svg><title>caf\xE9</title></svg>";
        let root = parse(&decode(latin1).unwrap()).unwrap();
        assert_eq!(root.child_elements().next().unwrap().text(), "caf\u{e9}");

        let bom = b"\xEF\xBB\xBF<svg/>";
        assert_eq!(decode(bom).unwrap(), "<svg/>");
    }

    #[test]
    fn test_decode_rejects_bad_bytes() {
        assert!(matches!(decode(b"<svg>\xFF</svg>"), Err(XmlError::Utf8(_))));
        assert!(matches!(
            decode(b"<?xml version=\"1.0\" encoding=\"Shift_JIS\"?><svg/>"),
            Err(XmlError::Encoding(label)) if label == "shift_jis"
        ));
    }

    #[test]
    fn test_visit_is_preorder() {
        let root = parse(r#"<svg id="0"><g id="1"><rect id="2"/></g><circle id="3"/></svg>"#).unwrap();
        let mut seen = vec![];
        root.visit(&mut |e| seen.extend(e.attr("id").map(str::to_string)));
        assert_eq!(seen, vec!["0", "1", "2", "3"]);
    }
}

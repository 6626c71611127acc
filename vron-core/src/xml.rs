//! XML document adapter.
//!
//! All xml manipulation for the partner protocol goes through this module,
//! so the parsing library can be swapped without touching the mapper or the
//! dispatcher. Inbound documents are parsed into an owned element tree with
//! namespace prefixes stripped; outbound documents are assembled from
//! `Element` values and serialized pretty-printed with an XML declaration.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::Writer;

/// Namespace stamped on every response root element.
pub const PARTNER_XMLNS: &str = "http://toursgds.com/api/01";

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(tag: impl Into<String>, key: &str, value: &str) -> Self {
        let mut element = Element::new(tag);
        element.attrs.push((key.to_string(), value.to_string()));
        element
    }

    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        self.children.last_mut().expect("child just pushed")
    }

    /// Appends `<tag>text</tag>`. An empty text leaves the element
    /// self-closing, matching the historical wire format.
    pub fn add_text_child(&mut self, tag: &str, text: &str) {
        let mut child = Element::new(tag);
        if !text.is_empty() {
            child.text = Some(text.to_string());
        }
        self.children.push(child);
    }

    /// First matching descendant in document order.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.tag == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// All matching descendants in document order.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.tag == name {
                out.push(child);
            }
            child.find_all(name, out);
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// An inbound request document. Parse failures are data, not errors: the
/// document carries a validity flag plus a human-readable message, and the
/// lookup methods fail closed on an invalid document.
#[derive(Debug)]
pub struct XmlDocument {
    root: Option<Element>,
    pub validated: bool,
    pub error_message: Option<String>,
}

impl XmlDocument {
    pub fn parse(raw: &[u8]) -> Self {
        let text = match std::str::from_utf8(raw) {
            Ok(t) => t,
            Err(_) => return Self::invalid("The content was not valid UTF-8"),
        };

        let mut xml = text.trim();
        if xml.is_empty() {
            return Self::invalid("The content was empty");
        }

        // Requests sometimes arrive as a form-style "data=<xml>" body.
        if let Some(stripped) = xml.strip_prefix("data=") {
            xml = stripped;
        }

        let collapsed = strip_spaces_between_tags(xml);
        let xml = collapsed.trim_start();
        if xml.is_empty() || !xml.starts_with('<') {
            return Self::invalid("Invalid XML - Missing starting tag");
        }

        match parse_tree(xml) {
            Ok(Some(root)) => XmlDocument {
                root: Some(root),
                validated: true,
                error_message: None,
            },
            Ok(None) => Self::invalid("Invalid XML - No root element"),
            Err(message) => Self::invalid(&format!("Malformed xml ({message})")),
        }
    }

    fn invalid(message: &str) -> Self {
        XmlDocument {
            root: None,
            validated: false,
            error_message: Some(message.to_string()),
        }
    }

    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    pub fn root_tag(&self) -> Option<&str> {
        self.root.as_ref().map(|r| r.tag.as_str())
    }

    /// First matching element under the root (or under `base`).
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.root.as_ref().and_then(|r| r.find(name))
    }

    pub fn element_in<'a>(&self, name: &str, base: &'a Element) -> Option<&'a Element> {
        base.find(name)
    }

    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.element(name).and_then(|e| e.text())
    }

    pub fn text_in<'a>(&self, name: &str, base: &'a Element) -> Option<&'a str> {
        base.find(name).and_then(|e| e.text())
    }

    pub fn elements(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.find_all(name, &mut out);
        }
        out
    }

    pub fn elements_in<'a>(&self, name: &str, base: &'a Element) -> Vec<&'a Element> {
        let mut out = Vec::new();
        base.find_all(name, &mut out);
        out
    }
}

/// Serializes a response tree as pretty-printed UTF-8 with an XML
/// declaration, the format the partner's test harness expects.
pub fn serialize(root: &Element) -> Vec<u8> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("writing to an in-memory buffer");
    write_element(&mut writer, root);
    writer.into_inner()
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) {
    let mut start = BytesStart::new(element.tag.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_none() {
        writer
            .write_event(Event::Empty(start))
            .expect("writing to an in-memory buffer");
        return;
    }

    writer
        .write_event(Event::Start(start))
        .expect("writing to an in-memory buffer");
    if let Some(text) = &element.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .expect("writing to an in-memory buffer");
    }
    for child in &element.children {
        write_element(writer, child);
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.tag.as_str())))
        .expect("writing to an in-memory buffer");
}

/// Collapses whitespace runs between a closing and an opening tag.
fn strip_spaces_between_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut pending = String::new();
    let mut between_tags = false;
    for ch in xml.chars() {
        if between_tags {
            if ch == '<' {
                pending.clear();
                out.push(ch);
                between_tags = false;
            } else if ch.is_whitespace() {
                pending.push(ch);
            } else {
                out.push_str(&pending);
                pending.clear();
                out.push(ch);
                between_tags = false;
            }
        } else {
            out.push(ch);
            if ch == '>' {
                between_tags = true;
            }
        }
    }
    out
}

fn local_name(qualified: &[u8]) -> String {
    let name = String::from_utf8_lossy(qualified);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn parse_tree(xml: &str) -> Result<Option<Element>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let mut element = Element::new(local_name(start.name().as_ref()));
                collect_attrs(&start, &mut element)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let mut element = Element::new(local_name(start.name().as_ref()));
                collect_attrs(&start, &mut element)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(|e| e.to_string())?;
                if let Some(open) = stack.last_mut() {
                    match &mut open.text {
                        Some(existing) => existing.push_str(&value),
                        None => open.text = Some(value.into_owned()),
                    }
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    if !stack.is_empty() {
        return Err("unclosed element".to_string());
    }
    Ok(root)
}

fn collect_attrs(start: &BytesStart<'_>, element: &mut Element) -> Result<(), String> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = local_name(attr.key.as_ref());
        // Namespace declarations are dropped along with the prefixes.
        if key == "xmlns" || String::from_utf8_lossy(attr.key.as_ref()).starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        element.attrs.push((key, value.into_owned()));
    }
    Ok(())
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_namespaces() {
        let raw = br#"<ns:BookingRequest xmlns:ns="http://toursgds.com/api/01">
            <ns:ApiKey>abc123</ns:ApiKey>
        </ns:BookingRequest>"#;
        let doc = XmlDocument::parse(raw);
        assert!(doc.validated);
        assert_eq!(doc.root_tag(), Some("BookingRequest"));
        assert_eq!(doc.text_of("ApiKey"), Some("abc123"));
    }

    #[test]
    fn test_parse_default_namespace() {
        let raw = br#"<BookingRequest xmlns="http://toursgds.com/api/01"><ApiKey>k</ApiKey></BookingRequest>"#;
        let doc = XmlDocument::parse(raw);
        assert!(doc.validated);
        assert_eq!(doc.text_of("ApiKey"), Some("k"));
    }

    #[test]
    fn test_parse_data_prefix() {
        let raw = b"data=<TourListRequest><ApiKey>k</ApiKey></TourListRequest>";
        let doc = XmlDocument::parse(raw);
        assert!(doc.validated);
        assert_eq!(doc.root_tag(), Some("TourListRequest"));
    }

    #[test]
    fn test_parse_empty_input() {
        let doc = XmlDocument::parse(b"   ");
        assert!(!doc.validated);
        assert_eq!(doc.error_message.as_deref(), Some("The content was empty"));
    }

    #[test]
    fn test_parse_not_xml() {
        let doc = XmlDocument::parse(b"hello world");
        assert!(!doc.validated);
        assert!(doc
            .error_message
            .as_deref()
            .unwrap()
            .contains("Missing starting tag"));
    }

    #[test]
    fn test_parse_malformed() {
        let doc = XmlDocument::parse(b"<BookingRequest><ApiKey>k</BookingRequest>");
        assert!(!doc.validated);
        assert!(doc.error_message.as_deref().unwrap().starts_with("Malformed xml"));
    }

    #[test]
    fn test_nested_lookup_and_lists() {
        let raw = br#"<BookingRequest>
            <Traveller><LeadTraveller>false</LeadTraveller><GivenName>Ann</GivenName></Traveller>
            <Traveller><LeadTraveller>true</LeadTraveller><GivenName>Bob</GivenName></Traveller>
        </BookingRequest>"#;
        let doc = XmlDocument::parse(raw);
        let travellers = doc.elements("Traveller");
        assert_eq!(travellers.len(), 2);
        assert_eq!(doc.text_in("GivenName", travellers[1]), Some("Bob"));
        assert_eq!(doc.elements_in("GivenName", travellers[0]).len(), 1);
        assert!(doc.element("Missing").is_none());
    }

    #[test]
    fn test_serialize_declaration_and_indent() {
        let mut root = Element::with_attr("BookingResponse", "xmlns", PARTNER_XMLNS);
        root.add_text_child("ApiKey", "k");
        root.add_text_child("SupplierConfirmationNumber", "");
        let bytes = serialize(&root);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<BookingResponse xmlns=\"http://toursgds.com/api/01\">"));
        assert!(text.contains("  <ApiKey>k</ApiKey>"));
        // empty text stays self-closing
        assert!(text.contains("<SupplierConfirmationNumber/>"));
    }

    #[test]
    fn test_serialize_escapes_text() {
        let mut root = Element::new("BookingResponse");
        root.add_text_child("RejectionReasonDetails", "a < b & c");
        let text = String::from_utf8(serialize(&root)).unwrap();
        assert!(text.contains("a &lt; b &amp; c"));
    }
}

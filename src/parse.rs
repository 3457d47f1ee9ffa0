//! Response body decoding.
//!
//! `json` bodies become a [`serde_json::Value`], `xml` bodies an [`XmlDocument`]. Every
//! other data type (and an unresolved one) passes the body through as text.
use crate::errors::ParseError;
use crate::negotiate::DataType;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    Json(serde_json::Value),
    Xml(XmlDocument),
    Text(String),
}

impl ResponseValue {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlDocument> {
        match self {
            ResponseValue::Xml(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Minimal XML document: one root element, elements, attributes and text.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => out.push_str(&e.text()),
            }
        }
        out
    }
}

/// Decodes `raw` according to `data_type`.
pub fn parse(raw: &str, data_type: Option<DataType>) -> Result<ResponseValue, ParseError> {
    match data_type {
        Some(DataType::Json) => Ok(ResponseValue::Json(serde_json::from_str(raw)?)),
        Some(DataType::Xml) => Ok(ResponseValue::Xml(parse_xml(raw)?)),
        _ => Ok(ResponseValue::Text(raw.to_string())),
    }
}

pub fn parse_xml(raw: &str) -> Result<XmlDocument, ParseError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                // end names are checked by the reader
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?.into_owned();
                push_text(&mut stack, text)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_text(&mut stack, text)?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml(format!("unclosed element <{}>", open.name)));
    }

    root.map(|root| XmlDocument { root })
        .ok_or_else(|| ParseError::Xml("no root element".into()))
}

fn xml_error(e: quick_xml::Error) -> ParseError {
    ParseError::Xml(e.to_string())
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), ParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::Xml(format!("second root element <{}>", element.name)));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: String) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Text(text));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ParseError::Xml("text outside of the root element".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_bodies_are_decoded() {
        let v = parse(r#"{"ok": true, "items": [1, 2]}"#, Some(DataType::Json)).unwrap();
        assert_eq!(v.as_json(), Some(&json!({"ok": true, "items": [1, 2]})));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse("not json", Some(DataType::Json)).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn other_types_pass_through() {
        for dt in [None, Some(DataType::Html), Some(DataType::Text), Some(DataType::Script)] {
            let v = parse("<b>not parsed</b>", dt).unwrap();
            assert_eq!(v.as_text(), Some("<b>not parsed</b>"));
        }
    }

    #[test]
    fn xml_bodies_become_a_tree() {
        let raw = r#"<?xml version="1.0"?>
            <users count="2">
                <!-- listing -->
                <user id="1">Denis &amp; co</user>
                <user id="2"><![CDATA[<raw>]]></user>
                <empty/>
            </users>"#;
        let doc = parse(raw, Some(DataType::Xml)).unwrap();
        let doc = doc.as_xml().unwrap();

        assert_eq!(doc.root.name, "users");
        assert_eq!(doc.root.attribute("count"), Some("2"));

        let users: Vec<_> = doc.root.elements().filter(|e| e.name == "user").collect();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].attribute("id"), Some("1"));
        assert_eq!(users[0].text(), "Denis & co");
        assert_eq!(users[1].text(), "<raw>");
        assert!(doc.root.find("empty").is_some());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        for raw in ["not xml", "<a><b></a>", "<a>", "<a/><b/>", ""] {
            let err = parse(raw, Some(DataType::Xml)).unwrap_err();
            assert!(matches!(err, ParseError::Xml(_)), "expected XML error for {raw:?}");
        }
    }
}

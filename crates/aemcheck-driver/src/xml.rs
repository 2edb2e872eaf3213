//! Minimal XML element tree over quick-xml, with `/a/b/@attr` path lookup.
//!
//! Element and attribute names are matched by local name; namespaces are
//! ignored.

use quick_xml::{events::BytesStart, events::Event as XmlEvent, Reader as XmlReader};

use crate::error::DriverError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated text content directly inside this element.
    pub text: String,
}

impl XmlElement {
    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, DriverError> {
        let mut reader = XmlReader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(XmlEvent::Start(e)) => stack.push(element_from(&e)?),
                Ok(XmlEvent::Empty(e)) => {
                    let el = element_from(&e)?;
                    attach(&mut stack, &mut root, el);
                }
                Ok(XmlEvent::End(_)) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| DriverError::Decode("xml: unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, el);
                }
                Ok(XmlEvent::Text(t)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| DriverError::Decode(format!("xml text: {}", e)))?;
                        top.text.push_str(&text);
                    }
                }
                Ok(XmlEvent::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(XmlEvent::Eof) => break,
                Err(e) => {
                    return Err(DriverError::Decode(format!(
                        "xml at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DriverError::Decode("xml: unclosed element".into()));
        }
        root.ok_or_else(|| DriverError::Decode("xml: empty document".into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of a direct child element.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Resolve an absolute element path such as `/WadCfg/DiagnosticMonitorConfiguration`.
    /// The first segment must name this (root) element.
    pub fn select(&self, path: &str) -> Option<&XmlElement> {
        let mut segments = path.trim_start_matches('/').split('/');
        if segments.next()? != self.name {
            return None;
        }
        segments.try_fold(self, |node, seg| node.child(seg))
    }

    /// Like [`select`](Self::select), but a final `@name` segment yields an
    /// attribute value and an element path yields the element text.
    pub fn select_value(&self, path: &str) -> Option<&str> {
        match path.rsplit_once("/@") {
            Some((element, attr)) => self.select(element)?.attr(attr),
            None => self.select(path).map(|e| e.text.as_str()),
        }
    }
}

fn element_from(e: &BytesStart<'_>) -> Result<XmlElement, DriverError> {
    let mut el = XmlElement {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| DriverError::Decode(format!("xml attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DriverError::Decode(format!("xml attribute value: {}", e)))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

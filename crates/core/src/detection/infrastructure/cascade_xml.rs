//! Minimal element tree for OpenCV `FileStorage` XML documents.
//!
//! Cascade files only use nested elements with whitespace-separated numeric
//! text, so attributes are ignored and mixed content is concatenated.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::haar_cascade::CascadeError;

#[derive(Debug, Default)]
pub(crate) struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&XmlElement, CascadeError> {
        self.child(name).ok_or_else(|| CascadeError::MissingElement {
            element: name.to_string(),
            parent: self.name.clone(),
        })
    }

    /// `<_>` items of an OpenCV sequence node.
    pub fn items(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(|c| c.name == "_")
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    pub fn parse_number<T: std::str::FromStr>(&self) -> Result<T, CascadeError> {
        self.trimmed_text()
            .parse::<T>()
            .map_err(|_| CascadeError::Invalid(format!("<{}> is not a number", self.name)))
    }

    pub fn numbers(&self) -> Result<Vec<f64>, CascadeError> {
        self.trimmed_text()
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    CascadeError::Invalid(format!("<{}> contains non-numeric '{tok}'", self.name))
                })
            })
            .collect()
    }
}

/// Parses a whole document into a synthetic `#document` root.
pub(crate) fn parse_document(xml: &str) -> Result<XmlElement, CascadeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![XmlElement::named(b"#document")];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlElement::named(e.name().as_ref())),
            Ok(Event::Empty(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlElement::named(e.name().as_ref()));
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| CascadeError::Xml(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CascadeError::Xml("unbalanced closing tag".to_string()))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| CascadeError::Xml("unbalanced closing tag".to_string()))?;
                parent.children.push(element);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CascadeError::Xml(e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(CascadeError::Xml("unexpected end of document".to_string()));
    }
    stack
        .pop()
        .ok_or_else(|| CascadeError::Xml("empty document".to_string()))
}

// Extracted SVG validation
//
// A sandbox can report success for a half-rendered or truncated document;
// nothing reaches the client without passing through here.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::constants::{SVG_NAMESPACE, XML_DECLARATION};

/// Why an extracted payload was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not well-formed markup: {0}")]
    NotWellFormed(String),

    #[error("payload has no root element")]
    MissingRoot,

    #[error("expected <svg> root element, found <{0}>")]
    UnexpectedRoot(String),

    #[error("root element has {found} children, at least {required} required")]
    TooFewChildren { found: usize, required: usize },
}

/// Shape of a payload that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgSummary {
    /// Element children directly under the root
    pub root_children: usize,
    /// All elements, root included
    pub element_count: usize,
}

/// Validates extracted SVG payloads
#[derive(Debug, Clone)]
pub struct SvgValidator {
    min_root_children: usize,
}

impl SvgValidator {
    pub fn new(min_root_children: usize) -> Self {
        Self { min_root_children }
    }

    /// Check that `payload` is a single well-formed `<svg>` document
    pub fn validate(&self, payload: &str) -> Result<SvgSummary, ValidationError> {
        if payload.trim().is_empty() {
            return Err(ValidationError::Empty);
        }

        let mut reader = Reader::from_str(payload);
        let mut depth: usize = 0;
        let mut root_seen = false;
        let mut root_children = 0;
        let mut element_count = 0;

        loop {
            let event = reader.read_event().map_err(|e| {
                ValidationError::NotWellFormed(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    for attr in e.attributes() {
                        attr.map_err(|err| ValidationError::NotWellFormed(err.to_string()))?;
                    }

                    if depth == 0 {
                        if root_seen {
                            return Err(ValidationError::NotWellFormed(
                                "content after the root element".to_string(),
                            ));
                        }
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        if name != "svg" {
                            return Err(ValidationError::UnexpectedRoot(name));
                        }
                        root_seen = true;
                    } else if depth == 1 {
                        root_children += 1;
                    }
                    element_count += 1;

                    if matches!(event, Event::Start(_)) {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                }
                Event::Text(ref t) if depth == 0 => {
                    if !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(ValidationError::NotWellFormed(
                            "text outside the root element".to_string(),
                        ));
                    }
                }
                Event::CData(_) if depth == 0 => {
                    return Err(ValidationError::NotWellFormed(
                        "CDATA outside the root element".to_string(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ValidationError::NotWellFormed(format!(
                "truncated document: {} unclosed element(s)",
                depth
            )));
        }
        if !root_seen {
            return Err(ValidationError::MissingRoot);
        }
        if root_children < self.min_root_children {
            return Err(ValidationError::TooFewChildren {
                found: root_children,
                required: self.min_root_children,
            });
        }

        Ok(SvgSummary {
            root_children,
            element_count,
        })
    }
}

/// Trim, bind the root to the SVG namespace and prepend the XML declaration
pub fn normalize_svg(payload: &str) -> String {
    let body = ensure_namespace(payload.trim());
    if body.starts_with("<?xml") {
        body
    } else {
        format!("{}\n{}", XML_DECLARATION, body)
    }
}

/// Add a default `xmlns` to the root element when it has none
fn ensure_namespace(svg: &str) -> String {
    let mut reader = Reader::from_str(svg);
    loop {
        let tag_start = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let bound = e
                    .attributes()
                    .flatten()
                    .any(|attr| attr.key.as_ref() == b"xmlns");
                if bound {
                    return svg.to_string();
                }
                let at = tag_start + 1 + e.name().as_ref().len();
                return format!("{} xmlns=\"{}\"{}", &svg[..at], SVG_NAMESPACE, &svg[at..]);
            }
            Ok(Event::Eof) | Err(_) => return svg.to_string(),
            Ok(_) => {}
        }
    }
}

//! Push-style markup event source for FB2 documents.
//!
//! quick-xml is a pull parser; this module drives it to completion and hands
//! every open tag, close tag and text run to a callback in document order.
//! Self-closing elements are reported as an open immediately followed by a
//! close. Text may arrive split into several events (entity references are
//! delivered separately), so consumers must not assume one event per node.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::error::Result;
use crate::util::{decode_text, extract_xml_encoding};

/// Element attributes, in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Look up an attribute by its exact (possibly prefixed) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Look up an attribute ignoring its namespace prefix, so `href`
    /// matches `l:href` and `xlink:href`.
    pub fn get_local(&self, local: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| local_name(key) == local)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One event from the markup source.
///
/// A well-formed stream ends with exactly one `Done`. Fatal parse errors are
/// returned from [`parse_markup`] instead, and no `Done` is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    Open { tag: String, attributes: Attributes },
    Close { tag: String },
    Text { value: String },
    Done,
}

/// Strip a namespace prefix (`fb:section` -> `section`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Read an FB2 file and stream its markup events to `on_event`.
pub fn read_fb2_file<F>(path: impl AsRef<Path>, on_event: F) -> Result<()>
where
    F: FnMut(MarkupEvent),
{
    let bytes = std::fs::read(path.as_ref())?;
    read_fb2_bytes(&bytes, on_event)
}

/// Decode raw FB2 bytes (UTF-8, or the encoding named by the XML
/// declaration) and stream their markup events.
pub fn read_fb2_bytes<F>(bytes: &[u8], on_event: F) -> Result<()>
where
    F: FnMut(MarkupEvent),
{
    let hint = extract_xml_encoding(bytes);
    let content = decode_text(bytes, hint);
    parse_markup(&content, on_event)
}

/// Stream the markup events of an already decoded document.
pub fn parse_markup<F>(content: &str, mut on_event: F) -> Result<()>
where
    F: FnMut(MarkupEvent),
{
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attributes = collect_attributes(&e);
                on_event(MarkupEvent::Open { tag, attributes });
            }
            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attributes = collect_attributes(&e);
                on_event(MarkupEvent::Open {
                    tag: tag.clone(),
                    attributes,
                });
                on_event(MarkupEvent::Close { tag });
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                on_event(MarkupEvent::Close { tag });
            }
            Event::Text(e) => {
                let value = String::from_utf8_lossy(e.as_ref()).into_owned();
                if !value.is_empty() {
                    on_event(MarkupEvent::Text { value });
                }
            }
            Event::CData(e) => {
                let value = String::from_utf8_lossy(e.as_ref()).into_owned();
                on_event(MarkupEvent::Text { value });
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(value) => on_event(MarkupEvent::Text { value }),
                    None => debug!("Dropping unknown entity &{entity};"),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    on_event(MarkupEvent::Done);
    Ok(())
}

fn collect_attributes(e: &quick_xml::events::BytesStart<'_>) -> Attributes {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value);
            (key, unescape_attribute(&raw))
        })
        .collect()
}

fn unescape_attribute(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';').and_then(|end| Some((end, resolve_entity(&after[..end])?))) {
            Some((end, resolved)) => {
                out.push_str(&resolved);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve XML entities plus the handful of HTML ones common in FB2 files.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        "mdash" => return Some("—".to_string()),
        "ndash" => return Some("–".to_string()),
        "laquo" => return Some("«".to_string()),
        "raquo" => return Some("»".to_string()),
        "hellip" => return Some("…".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::catalog::{CatalogItem, ClassUpdate};

/// Root element of every feed answer, found or not
const FEED_ROOT: &[u8] = b"wowhead";

/// Markers around the item name in the raw feed, used when the XML won't decode
const NAME_OPEN: &str = "<name><![CDATA[";
const NAME_CLOSE: &str = "]]></name>";

/// An item decoded from the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// Id echoed by the payload
    pub id: i64,
    pub name: String,
    pub quality: Option<String>,
    pub icon: Option<String>,
    pub class_id: Option<i64>,
    pub subclass_id: Option<i64>,
}

impl ParsedItem {
    pub fn into_catalog_item(self) -> CatalogItem {
        CatalogItem {
            id: self.id,
            name: self.name,
            quality: self.quality,
            icon: self.icon,
            item_class: self.class_id,
            item_subclass: self.subclass_id,
            locale_names: Default::default(),
        }
    }

    /// Classification to store over `current`; a field the payload omits keeps the stored value
    pub fn class_update(&self, current: &CatalogItem) -> ClassUpdate {
        ClassUpdate {
            id: current.id,
            item_class: self.class_id.or(current.item_class),
            item_subclass: self.subclass_id.or(current.item_subclass),
        }
    }
}

/// Result of decoding one feed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Item(ParsedItem),
    /// Well-formed answer without an item: the id is a gap in the catalog
    Absent,
    /// Structured decode failed; `name` holds whatever the marker scan recovered
    Malformed { name: Option<String>, reason: String },
}

impl ParseOutcome {
    /// Best name available, structured or recovered
    pub fn name(&self) -> Option<&str> {
        match self {
            ParseOutcome::Item(item) => Some(item.name.as_str()),
            ParseOutcome::Malformed { name, .. } => name.as_deref(),
            ParseOutcome::Absent => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    item: Option<XmlItem>,
}

#[derive(Debug, Deserialize)]
struct XmlItem {
    #[serde(rename = "@id")]
    id: i64,
    name: String,
    #[serde(default)]
    quality: Option<TextNode>,
    #[serde(default)]
    icon: Option<TextNode>,
    #[serde(default)]
    class: Option<IdNode>,
    #[serde(default)]
    subclass: Option<IdNode>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct IdNode {
    #[serde(rename = "@id")]
    id: i64,
}

impl From<XmlItem> for ParsedItem {
    fn from(item: XmlItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            quality: item.quality.map(|q| q.text),
            icon: item.icon.map(|i| i.text),
            class_id: item.class.map(|c| c.id),
            subclass_id: item.subclass.map(|s| s.id),
        }
    }
}

/// Decode a feed payload, falling back to a raw name scan when the XML is broken
pub fn parse_item(bytes: &[u8]) -> ParseOutcome {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let lossy = String::from_utf8_lossy(bytes);
            return ParseOutcome::Malformed {
                name: extract_name(&lossy),
                reason: format!("payload is not UTF-8: {}", err),
            };
        }
    };

    match root_element(text) {
        Ok(Some(root)) if root == FEED_ROOT => {}
        Ok(Some(root)) => {
            return ParseOutcome::Malformed {
                name: extract_name(text),
                reason: format!("unexpected root element <{}>", String::from_utf8_lossy(&root)),
            };
        }
        Ok(None) => {
            return ParseOutcome::Malformed {
                name: extract_name(text),
                reason: "payload has no root element".to_string(),
            };
        }
        Err(err) => {
            return ParseOutcome::Malformed {
                name: extract_name(text),
                reason: err.to_string(),
            };
        }
    }

    match quick_xml::de::from_str::<Envelope>(text) {
        Ok(Envelope { item: Some(item) }) => ParseOutcome::Item(item.into()),
        Ok(Envelope { item: None }) => ParseOutcome::Absent,
        Err(err) => ParseOutcome::Malformed {
            name: extract_name(text),
            reason: err.to_string(),
        },
    }
}

/// Name of the first element, skipping the prolog
fn root_element(text: &str) -> Result<Option<Vec<u8>>, quick_xml::Error> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event()? {
            Event::Start(tag) | Event::Empty(tag) => return Ok(Some(tag.name().as_ref().to_vec())),
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Pull the text between the name markers out of a raw payload
pub fn extract_name(text: &str) -> Option<String> {
    let start = text.find(NAME_OPEN)? + NAME_OPEN.len();
    let len = text[start..].find(NAME_CLOSE)?;
    let name = text[start..start + len].trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
